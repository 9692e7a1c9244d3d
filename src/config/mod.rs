//! Settings loading: `config/default.toml` (or an explicit file), then
//! `TXROUTE__*` environment variables, merged over built-in defaults.

mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{BrokerSettings, LoggingSettings, RouteSettings, Settings, TimeoutSettings};

/// Loads `config/default.toml` if present, then the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(None)
}

/// Like [`load_config`], but a given path must exist and replaces the
/// default file.
pub fn load_config_from(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("config/default").required(false),
    };

    let config = Config::builder()
        .add_source(file)
        .add_source(Environment::with_prefix("TXROUTE").separator("__"))
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    Ok(partial.merge())
}

//! CLI for txroute
//!
//! Subcommands:
//! - `run`: open the configured brokers and run every route until Ctrl-C
//! - `routes`: print the configured routes

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use txroute::App;
use txroute::config::{Settings, load_config_from};
use txroute::utils::logging;

#[derive(Parser)]
#[command(name = "txroute", version, about = "Transactional message routes")]
struct Cli {
    /// Configuration file, instead of `config/default.toml`
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start every configured route and run until interrupted
    Run,
    /// List the configured routes
    Routes,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = match load_config_from(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    let outcome = match cli.command {
        Command::Run => run(&settings).await,
        Command::Routes => {
            print_routes(&settings);
            Ok(())
        }
    };
    if let Err(e) = outcome {
        error!("txroute failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(settings: &Settings) -> txroute::Result<()> {
    let app = App::from_settings(settings)?;
    app.start_all().await?;
    info!(routes = ?app.controller().route_ids(), "all routes started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received. Stopping routes.");
    app.stop_all().await
}

fn print_routes(settings: &Settings) {
    for route in &settings.routes {
        let forward = route
            .forward_to
            .as_deref()
            .map(|topic| format!(" -> {topic}"))
            .unwrap_or_default();
        println!(
            "{}: {}/{}@{} consumers={} max_redeliveries={}{}",
            route.id,
            route.topic,
            route.subscription,
            route.connection_factory,
            route.consumers,
            route.max_redeliveries,
            forward
        );
    }
}

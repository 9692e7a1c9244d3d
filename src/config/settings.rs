use std::time::Duration;

use serde::Deserialize;

use crate::client::DEFAULT_MAX_TRANSACTIONS;
use crate::harness::Timeouts;

/// Top-level configuration.
///
/// Brokers are the named connection factories routes consume from.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub brokers: Vec<BrokerSettings>,
    pub routes: Vec<RouteSettings>,
    pub timeouts: TimeoutSettings,
    pub logging: LoggingSettings,
}

/// One named broker and its connection factory.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub name: String,
    /// Durable subscriptions are kept in memory when unset.
    pub data_dir: Option<String>,
    pub max_transactions: usize,
}

/// One route: where it consumes from and how it handles failures.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RouteSettings {
    pub id: String,
    pub connection_factory: String,
    pub topic: String,
    pub subscription: String,
    pub consumers: usize,
    pub max_redeliveries: u32,
    pub redelivery_delay_ms: u64,
    /// Topic each processed message is forwarded to on commit.
    pub forward_to: Option<String>,
}

/// Bounds in milliseconds for lifecycle waits, receives and drains.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSettings {
    pub lifecycle_ms: u64,
    pub receive_ms: u64,
    pub drain_ms: u64,
}

impl TimeoutSettings {
    /// Converts to the harness bounds.
    pub fn to_timeouts(self) -> Timeouts {
        Timeouts {
            lifecycle: Duration::from_millis(self.lifecycle_ms),
            receive: Duration::from_millis(self.receive_ms),
            drain: Duration::from_millis(self.drain_ms),
        }
    }
}

/// Log level name passed to the fmt subscriber (`error` to `trace`).
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Settings as found in files and the environment, before defaults apply.
///
/// A `brokers` or `routes` list replaces the default list as a whole; fields
/// missing inside an entry fall back to the defaults of a single entry.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub brokers: Option<Vec<PartialBrokerSettings>>,
    pub routes: Option<Vec<PartialRouteSettings>>,
    pub timeouts: Option<PartialTimeoutSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

/// Broker entry with optional values. The name is required.
#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub name: String,
    pub data_dir: Option<String>,
    pub max_transactions: Option<usize>,
}

/// Route entry with optional values. Id, topic and subscription are required.
#[derive(Debug, Deserialize)]
pub struct PartialRouteSettings {
    pub id: String,
    pub connection_factory: Option<String>,
    pub topic: String,
    pub subscription: String,
    pub consumers: Option<usize>,
    pub max_redeliveries: Option<u32>,
    pub redelivery_delay_ms: Option<u64>,
    pub forward_to: Option<String>,
}

/// Timeout settings with optional values.
#[derive(Debug, Deserialize)]
pub struct PartialTimeoutSettings {
    pub lifecycle_ms: Option<u64>,
    pub receive_ms: Option<u64>,
    pub drain_ms: Option<u64>,
}

/// Logging settings with optional values.
#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fills every missing value from `Settings::default()`.
    pub fn merge(self) -> Settings {
        let default = Settings::default();

        let brokers = match self.brokers {
            Some(brokers) => brokers
                .into_iter()
                .map(|b| BrokerSettings {
                    name: b.name,
                    data_dir: b.data_dir,
                    max_transactions: b.max_transactions.unwrap_or(DEFAULT_MAX_TRANSACTIONS),
                })
                .collect(),
            None => default.brokers,
        };

        let routes = match self.routes {
            Some(routes) => routes
                .into_iter()
                .map(|r| RouteSettings {
                    id: r.id,
                    connection_factory: r
                        .connection_factory
                        .unwrap_or_else(|| "default".to_string()),
                    topic: r.topic,
                    subscription: r.subscription,
                    consumers: r.consumers.unwrap_or(1),
                    max_redeliveries: r.max_redeliveries.unwrap_or(1),
                    redelivery_delay_ms: r.redelivery_delay_ms.unwrap_or(0),
                    forward_to: r.forward_to,
                })
                .collect(),
            None => default.routes,
        };

        Settings {
            brokers,
            routes,
            timeouts: TimeoutSettings {
                lifecycle_ms: self
                    .timeouts
                    .as_ref()
                    .and_then(|t| t.lifecycle_ms)
                    .unwrap_or(default.timeouts.lifecycle_ms),
                receive_ms: self
                    .timeouts
                    .as_ref()
                    .and_then(|t| t.receive_ms)
                    .unwrap_or(default.timeouts.receive_ms),
                drain_ms: self
                    .timeouts
                    .as_ref()
                    .and_then(|t| t.drain_ms)
                    .unwrap_or(default.timeouts.drain_ms),
            },
            logging: LoggingSettings {
                level: self
                    .logging
                    .and_then(|l| l.level)
                    .unwrap_or(default.logging.level),
            },
        }
    }
}

/// Two in-memory brokers, each with one route on a `first`/`second` topic.
impl Default for Settings {
    fn default() -> Self {
        Self {
            brokers: vec![
                BrokerSettings {
                    name: "default".to_string(),
                    data_dir: None,
                    max_transactions: DEFAULT_MAX_TRANSACTIONS,
                },
                BrokerSettings {
                    name: "second".to_string(),
                    data_dir: None,
                    max_transactions: DEFAULT_MAX_TRANSACTIONS,
                },
            ],
            routes: vec![
                RouteSettings {
                    id: "first-route".to_string(),
                    connection_factory: "default".to_string(),
                    topic: "first".to_string(),
                    subscription: "first-subscription".to_string(),
                    consumers: 9,
                    max_redeliveries: 1,
                    redelivery_delay_ms: 0,
                    forward_to: None,
                },
                RouteSettings {
                    id: "second-route".to_string(),
                    connection_factory: "second".to_string(),
                    topic: "second".to_string(),
                    subscription: "second-subscription".to_string(),
                    consumers: 10,
                    max_redeliveries: 1,
                    redelivery_delay_ms: 0,
                    forward_to: None,
                },
            ],
            timeouts: TimeoutSettings {
                lifecycle_ms: 5_000,
                receive_ms: 1_000,
                drain_ms: 1_000,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

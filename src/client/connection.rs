use std::fmt;

use crate::broker::engine::{self, Broker, SharedBroker};
use crate::broker::{Body, Message};
use crate::client::consumer::Consumer;
use crate::transaction::TransactionCoordinator;
use crate::utils::error::Result;

/// Default bound on concurrently open transactions per factory.
pub const DEFAULT_MAX_TRANSACTIONS: usize = 10;

/// Entry point to one logical broker.
///
/// Each factory carries its own transaction coordinator, so the number of
/// open transactions is bounded per broker.
#[derive(Clone)]
pub struct ConnectionFactory {
    name: String,
    broker: SharedBroker,
    coordinator: TransactionCoordinator,
}

impl ConnectionFactory {
    pub fn new(name: &str, broker: SharedBroker, max_transactions: usize) -> Self {
        Self {
            name: name.to_string(),
            broker,
            coordinator: TransactionCoordinator::new(max_transactions),
        }
    }

    /// A factory over a fresh in-memory broker.
    pub fn in_memory(name: &str) -> Self {
        Self::new(name, Broker::new().into_shared(), DEFAULT_MAX_TRANSACTIONS)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn broker(&self) -> &SharedBroker {
        &self.broker
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub fn producer(&self) -> Producer {
        Producer {
            broker: self.broker.clone(),
        }
    }

    /// Opens a consumer on a durable shared subscription, creating it if needed.
    pub fn shared_durable_consumer(&self, topic: &str, subscription: &str) -> Result<Consumer> {
        let key = engine::lock(&self.broker).subscribe_durable(topic, subscription)?;
        Ok(Consumer::new(self.broker.clone(), key))
    }
}

impl fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("name", &self.name)
            .field("max_transactions", &self.coordinator.capacity())
            .finish()
    }
}

/// Publishes messages to topics of one broker.
#[derive(Clone)]
pub struct Producer {
    broker: SharedBroker,
}

impl Producer {
    pub fn send(&self, topic: &str, body: impl Into<Body>) -> Result<Message> {
        engine::lock(&self.broker).publish(topic, body)
    }
}

//! Processing steps and the exchange they operate on.
//!
//! Steps are synchronous. A step that needs to write somewhere transactionally
//! does not write directly; it enlists a `TransactionalResource` on the
//! exchange and the write happens when the transaction commits.

use tracing::{debug, info};

use crate::broker::engine::{self, SharedBroker};
use crate::broker::{Body, Message};
use crate::client::ConnectionFactory;
use crate::transaction::TransactionalResource;
use crate::utils::error::ProcessingError;

/// One message travelling through a route's pipeline.
pub struct Exchange {
    route_id: String,
    message: Message,
    resources: Vec<Box<dyn TransactionalResource>>,
}

impl Exchange {
    pub fn new(route_id: &str, message: Message) -> Self {
        Self {
            route_id: route_id.to_string(),
            message,
            resources: Vec::new(),
        }
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Replaces the body seen by the following steps.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.message.body = body.into();
    }

    /// Adds a participant to the transaction this exchange runs in.
    pub fn enlist(&mut self, resource: Box<dyn TransactionalResource>) {
        self.resources.push(resource);
    }

    pub fn take_resources(&mut self) -> Vec<Box<dyn TransactionalResource>> {
        std::mem::take(&mut self.resources)
    }
}

pub trait Step: Send + Sync {
    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError>;
}

impl<F> Step for F
where
    F: Fn(&mut Exchange) -> Result<(), ProcessingError> + Send + Sync,
{
    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        self(exchange)
    }
}

/// Always fails. Used to inject failures into a route.
#[derive(Debug, Clone)]
pub struct ThrowException {
    reason: String,
}

impl ThrowException {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

impl Step for ThrowException {
    fn process(&self, _exchange: &mut Exchange) -> Result<(), ProcessingError> {
        Err(ProcessingError::new(self.reason.clone()))
    }
}

/// Logs every message at info level.
#[derive(Debug, Clone, Default)]
pub struct Log;

impl Step for Log {
    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        let message = exchange.message();
        info!(
            route_id = exchange.route_id(),
            message_id = %message.message_id,
            delivery_count = message.delivery_count,
            body = ?message.body,
            "received"
        );
        Ok(())
    }
}

/// Forwards the message body to another topic when the transaction commits.
#[derive(Clone)]
pub struct SendTo {
    broker: SharedBroker,
    topic: String,
}

impl SendTo {
    pub fn new(factory: &ConnectionFactory, topic: &str) -> Self {
        Self {
            broker: factory.broker().clone(),
            topic: topic.to_string(),
        }
    }
}

impl Step for SendTo {
    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        exchange.enlist(Box::new(StagedPublish {
            broker: self.broker.clone(),
            topic: self.topic.clone(),
            body: Some(exchange.message().body.clone()),
        }));
        Ok(())
    }
}

struct StagedPublish {
    broker: SharedBroker,
    topic: String,
    body: Option<Body>,
}

impl TransactionalResource for StagedPublish {
    fn describe(&self) -> String {
        format!("send {}", self.topic)
    }

    fn commit(&mut self) -> Result<(), String> {
        let Some(body) = self.body.take() else {
            return Ok(());
        };
        engine::lock(&self.broker)
            .publish(&self.topic, body)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn rollback(&mut self) {
        if self.body.take().is_some() {
            debug!(topic = %self.topic, "discarded staged publish");
        }
    }
}

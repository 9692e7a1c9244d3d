use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, warn};

use crate::broker::engine::{self, SharedBroker};
use crate::broker::topic::DeliveryTag;
use crate::broker::{Message, SubscriptionKey};
use crate::transaction::TransactionalResource;
use crate::utils::error::Result;

/// Receives from one durable shared subscription.
///
/// Several consumers on the same subscription compete for its messages;
/// each message is in flight to at most one of them.
pub struct Consumer {
    broker: SharedBroker,
    key: SubscriptionKey,
}

impl Consumer {
    pub(crate) fn new(broker: SharedBroker, key: SubscriptionKey) -> Self {
        Self { broker, key }
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Takes the next ready message without waiting.
    ///
    /// A message whose delivery cannot be recorded stays ready and is not
    /// returned.
    pub fn receive_no_wait(&self) -> Option<Delivery> {
        let taken = engine::lock(&self.broker).take(&self.key);
        let (tag, message) = match taken {
            Ok(taken) => taken?,
            Err(e) => {
                error!(subscription = %self.key, error = %e, "failed to record delivery");
                return None;
            }
        };
        Some(Delivery {
            message,
            receipt: Receipt {
                broker: self.broker.clone(),
                key: self.key.clone(),
                tag,
                settled: false,
            },
        })
    }

    /// Waits up to `timeout` for a message.
    ///
    /// Cancel safe: a message is only taken in the same poll that returns it.
    pub async fn receive(&self, timeout: Duration) -> Option<Delivery> {
        let deadline = Instant::now() + timeout;
        loop {
            let notify = engine::lock(&self.broker).notifier(&self.key)?;
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register before checking so a publish in between is not missed.
            notified.as_mut().enable();

            if let Some(delivery) = self.receive_no_wait() {
                return Some(delivery);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }
}

/// A message handed to a consumer together with the receipt that settles it.
pub struct Delivery {
    message: Message,
    receipt: Receipt,
}

impl Delivery {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_parts(self) -> (Message, Receipt) {
        (self.message, self.receipt)
    }

    /// Acknowledges outside of any transaction.
    pub fn ack(self) -> Result<Message> {
        let (message, receipt) = self.into_parts();
        receipt.acknowledge()?;
        Ok(message)
    }
}

/// Settles one in-flight delivery: acknowledge removes the message, release
/// returns it for redelivery. An unsettled receipt releases on drop, as a
/// disconnecting consumer would.
pub struct Receipt {
    broker: SharedBroker,
    key: SubscriptionKey,
    tag: DeliveryTag,
    settled: bool,
}

impl Receipt {
    pub fn acknowledge(mut self) -> Result<()> {
        self.settle(true)
    }

    pub fn release(mut self) -> Result<()> {
        self.settle(false)
    }

    /// A failed acknowledge leaves the receipt unsettled, so it can still
    /// be released.
    fn settle(&mut self, acknowledge: bool) -> Result<()> {
        if self.settled {
            return Ok(());
        }
        let mut broker = engine::lock(&self.broker);
        if acknowledge {
            broker.ack(&self.key, self.tag)?;
        } else {
            broker.requeue(&self.key, self.tag);
        }
        self.settled = true;
        Ok(())
    }
}

impl TransactionalResource for Receipt {
    fn describe(&self) -> String {
        format!("receive {}#{}", self.key, self.tag)
    }

    fn commit(&mut self) -> std::result::Result<(), String> {
        self.settle(true).map_err(|e| e.to_string())
    }

    fn rollback(&mut self) {
        if let Err(e) = self.settle(false) {
            warn!(subscription = %self.key, tag = self.tag, error = %e, "failed to release delivery");
        }
    }
}

impl Drop for Receipt {
    fn drop(&mut self) {
        if !self.settled {
            TransactionalResource::rollback(self);
        }
    }
}

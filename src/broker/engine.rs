//! Broker engine
//!
//! The in-memory topic broker responsible for:
//! - creating topics and durable shared subscriptions on first use
//! - fanning published messages out to every subscription of a topic
//! - handing ready messages to consumers and tracking them while in flight
//! - acknowledging or requeueing in-flight deliveries
//! - mirroring subscription contents into `Persistence` when one is attached
//!
//! Concurrency and usage notes:
//! - The API is synchronous and meant to sit behind `Arc<Mutex<Broker>>`
//!   ([`SharedBroker`]). Never hold the lock across an `.await`; consumers
//!   wait on the subscription's `Notify` instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::broker::message::{Body, Message};
use crate::broker::topic::{DeliveryTag, Subscription, Topic};
use crate::persistence::Persistence;
use crate::utils::error::Result;

pub type SharedBroker = Arc<Mutex<Broker>>;

/// Locks a shared broker, recovering the guard if a holder panicked.
pub fn lock(broker: &SharedBroker) -> MutexGuard<'_, Broker> {
    broker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Addresses one durable subscription on one topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub topic: String,
    pub subscription: String,
}

impl SubscriptionKey {
    pub fn new(topic: &str, subscription: &str) -> Self {
        Self {
            topic: topic.to_string(),
            subscription: subscription.to_string(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.subscription)
    }
}

#[derive(Debug, Default)]
pub struct Broker {
    topics: HashMap<String, Topic>,
    persistence: Option<Persistence>,
    next_seq: u64,
}

impl Broker {
    /// Creates a purely in-memory broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker that mirrors durable subscriptions into `persistence`.
    ///
    /// Every subscription registered in the store is recreated with its
    /// stored messages, so publishes after a restart still reach it.
    pub fn with_persistence(persistence: Persistence) -> Result<Self> {
        let registered = persistence.subscriptions()?;
        let mut broker = Self {
            persistence: Some(persistence),
            ..Self::default()
        };
        for key in registered {
            broker.subscribe_durable(&key.topic, &key.subscription)?;
        }
        Ok(broker)
    }

    pub fn into_shared(self) -> SharedBroker {
        Arc::new(Mutex::new(self))
    }

    /// Creates the durable subscription if it does not exist yet.
    ///
    /// Creating a subscription that has stored messages restores them into
    /// the ready queue.
    pub fn subscribe_durable(&mut self, topic: &str, subscription: &str) -> Result<SubscriptionKey> {
        let key = SubscriptionKey::new(topic, subscription);
        let topic_entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic));

        if topic_entry.subscriptions.contains_key(subscription) {
            return Ok(key);
        }

        let mut created = Subscription::new(topic, subscription);
        if let Some(persistence) = &self.persistence {
            persistence.register(&key)?;
            let stored = persistence.load(&key)?;
            if !stored.is_empty() {
                debug!(subscription = %key, restored = stored.len(), "restored durable subscription");
            }
            for (seq, message) in stored {
                created.enqueue(seq, message);
            }
        }
        topic_entry
            .subscriptions
            .insert(subscription.to_string(), created);
        debug!(subscription = %key, "created durable subscription");
        Ok(key)
    }

    /// Publishes a message to every durable subscription of `topic`.
    ///
    /// The topic is created if needed. Without subscriptions the message is
    /// discarded, as for any topic. With persistence attached, every copy is
    /// stored before any subscription sees the message, so a failed publish
    /// reaches none of them.
    pub fn publish(&mut self, topic: &str, body: impl Into<Body>) -> Result<Message> {
        let message = Message::new(topic, body);

        let topic_entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic));

        if topic_entry.subscriptions.is_empty() {
            debug!(topic, message_id = %message.message_id, "no durable subscriptions, message discarded");
            return Ok(message);
        }

        let names: Vec<String> = topic_entry.subscriptions.keys().cloned().collect();
        let mut seqs = Vec::with_capacity(names.len());
        match &self.persistence {
            Some(persistence) => {
                for name in &names {
                    let key = SubscriptionKey::new(topic, name);
                    let stored = persistence
                        .next_seq()
                        .and_then(|seq| persistence.store(&key, seq, &message).map(|()| seq));
                    match stored {
                        Ok(seq) => seqs.push(seq),
                        Err(e) => {
                            for (name, seq) in names.iter().zip(&seqs) {
                                let key = SubscriptionKey::new(topic, name);
                                if let Err(undo) = persistence.remove(&key, *seq) {
                                    warn!(subscription = %key, seq, error = %undo, "failed to remove partial publish");
                                }
                            }
                            return Err(e);
                        }
                    }
                }
            }
            None => {
                for _ in &names {
                    self.next_seq += 1;
                    seqs.push(self.next_seq);
                }
            }
        }

        for (name, seq) in names.iter().zip(seqs) {
            if let Some(subscription) = topic_entry.subscriptions.get_mut(name) {
                subscription.enqueue(seq, message.clone());
            }
        }

        debug!(topic, message_id = %message.message_id, "published");
        Ok(message)
    }

    /// Moves the next ready message of a subscription in flight.
    ///
    /// With persistence attached the bumped delivery count is stored before
    /// the message is handed out. If that fails the message stays ready.
    pub fn take(&mut self, key: &SubscriptionKey) -> Result<Option<(DeliveryTag, Message)>> {
        let persistence = self.persistence.clone();
        let Some(subscription) = self.subscription_mut(key) else {
            return Ok(None);
        };
        let Some((tag, message)) = subscription.take() else {
            return Ok(None);
        };

        if let Some(persistence) = persistence {
            let stored = match subscription.in_flight(tag) {
                Some(queued) => persistence.store(key, queued.seq, &queued.message),
                None => Ok(()),
            };
            if let Err(e) = stored {
                subscription.untake(tag);
                return Err(e);
            }
        }
        Ok(Some((tag, message)))
    }

    /// Permanently removes an in-flight message. Returns `false` for unknown tags.
    ///
    /// The stored copy is removed first; if that fails the message stays in
    /// flight.
    pub fn ack(&mut self, key: &SubscriptionKey, tag: DeliveryTag) -> Result<bool> {
        let Some(seq) = self
            .subscription(key)
            .and_then(|s| s.in_flight(tag))
            .map(|queued| queued.seq)
        else {
            warn!(subscription = %key, tag, "ack for unknown delivery");
            return Ok(false);
        };
        if let Some(persistence) = &self.persistence {
            persistence.remove(key, seq)?;
        }
        Ok(self
            .subscription_mut(key)
            .and_then(|s| s.ack(tag))
            .is_some())
    }

    /// Returns an in-flight message to its subscription for redelivery.
    /// Returns `false` for unknown tags.
    ///
    /// The stored copy already carries the count bumped by `take`, so
    /// nothing is written here.
    pub fn requeue(&mut self, key: &SubscriptionKey, tag: DeliveryTag) -> bool {
        let Some(queued) = self.subscription_mut(key).and_then(|s| s.requeue(tag)) else {
            warn!(subscription = %key, tag, "requeue for unknown delivery");
            return false;
        };
        debug!(
            subscription = %key,
            message_id = %queued.message.message_id,
            delivery_count = queued.message.delivery_count,
            "requeued for redelivery"
        );
        true
    }

    pub fn subscription(&self, key: &SubscriptionKey) -> Option<&Subscription> {
        self.topics.get(&key.topic)?.subscriptions.get(&key.subscription)
    }

    fn subscription_mut(&mut self, key: &SubscriptionKey) -> Option<&mut Subscription> {
        self.topics
            .get_mut(&key.topic)?
            .subscriptions
            .get_mut(&key.subscription)
    }

    pub fn notifier(&self, key: &SubscriptionKey) -> Option<Arc<Notify>> {
        self.subscription(key).map(Subscription::notifier)
    }

    /// Ready plus in-flight messages of a subscription.
    pub fn pending(&self, key: &SubscriptionKey) -> usize {
        self.subscription(key)
            .map(|s| s.ready_len() + s.in_flight_len())
            .unwrap_or(0)
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }
}

//! Topics and their durable shared subscriptions.
//!
//! A `Topic` owns one `Subscription` per subscription name. Every subscription
//! keeps its own copy of each message published after it was created.
//!
//! A subscription holds messages in two places: the ready queue (FIFO) and the
//! in-flight table keyed by delivery tag. A message is in exactly one of them.
//! Taking a message moves it to the in-flight table, acknowledging removes it,
//! and requeueing puts it back at the head of the ready queue.
//!
//! Callers synchronize access through the broker lock.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::broker::message::Message;

/// Identifies one delivery of a message to a consumer.
pub type DeliveryTag = u64;

#[derive(Debug)]
pub struct Topic {
    pub name: String,
    pub subscriptions: HashMap<String, Subscription>,
}

impl Topic {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscriptions: HashMap::new(),
        }
    }
}

/// A message held by a subscription together with its storage sequence number.
#[derive(Debug, Clone)]
pub(crate) struct Queued {
    pub(crate) seq: u64,
    pub(crate) message: Message,
}

#[derive(Debug)]
pub struct Subscription {
    pub name: String,
    pub topic: String,
    ready: VecDeque<Queued>,
    in_flight: HashMap<DeliveryTag, Queued>,
    next_tag: DeliveryTag,
    notify: Arc<Notify>,
}

impl Subscription {
    pub fn new(topic: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            topic: topic.to_string(),
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            next_tag: 1,
            notify: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn enqueue(&mut self, seq: u64, message: Message) {
        self.ready.push_back(Queued { seq, message });
        self.notify.notify_waiters();
    }

    /// Hands the next ready message out, bumping its delivery count.
    pub fn take(&mut self) -> Option<(DeliveryTag, Message)> {
        let mut queued = self.ready.pop_front()?;
        queued.message.delivery_count += 1;

        let tag = self.next_tag;
        self.next_tag += 1;

        let message = queued.message.clone();
        self.in_flight.insert(tag, queued);
        Some((tag, message))
    }

    /// Undoes a `take` whose delivery could not be recorded.
    pub(crate) fn untake(&mut self, tag: DeliveryTag) {
        if let Some(mut queued) = self.in_flight.remove(&tag) {
            queued.message.delivery_count = queued.message.delivery_count.saturating_sub(1);
            self.ready.push_front(queued);
        }
    }

    pub(crate) fn in_flight(&self, tag: DeliveryTag) -> Option<&Queued> {
        self.in_flight.get(&tag)
    }

    pub(crate) fn ack(&mut self, tag: DeliveryTag) -> Option<Queued> {
        self.in_flight.remove(&tag)
    }

    /// Returns an in-flight message to the head of the queue.
    pub(crate) fn requeue(&mut self, tag: DeliveryTag) -> Option<Queued> {
        let queued = self.in_flight.remove(&tag)?;
        self.ready.push_front(queued.clone());
        self.notify.notify_waiters();
        Some(queued)
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Woken whenever a message becomes ready.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}

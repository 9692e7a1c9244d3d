//! The `broker` module holds the topic broker: topics, durable shared
//! subscriptions and the bookkeeping behind acknowledgement and redelivery.

pub mod engine;
pub mod message;
pub mod topic;

pub use engine::{Broker, SharedBroker, SubscriptionKey};
pub use message::{Body, Message};

#[cfg(test)]
mod tests;

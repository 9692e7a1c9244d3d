//! The `persistence` module keeps durable subscriptions durable: messages
//! waiting on a subscription survive a broker restart when the broker is
//! opened on a `sled` database.

pub mod sled_store;

pub use sled_store::Persistence;

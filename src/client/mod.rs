//! The `client` module is how code talks to a broker: a named
//! `ConnectionFactory` hands out producers and durable shared consumers, and
//! every received message comes with a `Receipt` that must be settled.

pub mod connection;
pub mod consumer;

pub use connection::{ConnectionFactory, DEFAULT_MAX_TRANSACTIONS, Producer};
pub use consumer::{Consumer, Delivery, Receipt};

#[cfg(test)]
mod tests;

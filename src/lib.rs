//! # txroute
//!
//! `txroute` is a small transactional message-routing layer on top of an
//! in-process topic broker. Routes consume from durable shared subscriptions,
//! run an ordered pipeline of steps inside a transaction and either commit
//! (the message is consumed) or roll back (the message is redelivered).
//!
//! ## Core Modules
//!
//! - `broker`: topics, durable shared subscriptions and redelivery bookkeeping.
//! - `client`: connection factories, producers and subscription consumers.
//! - `transaction`: the transaction coordinator and the resource contract it drives.
//! - `route`: route definitions, step pipelines and the route status model.
//! - `controller`: route lifecycle and the per-consumer transactional loop.
//! - `harness`: bounded-wait operations used to drive routes from tests.
//! - `config`: loading settings from files and the environment.
//! - `persistence`: `sled`-backed storage for durable subscriptions.
//! - `utils`: error types and logging setup.

pub mod app;
pub mod broker;
pub mod client;
pub mod config;
pub mod controller;
pub mod harness;
pub mod persistence;
pub mod route;
pub mod transaction;
pub mod utils;

pub use app::App;
pub use utils::error::{DeliveryError, Error, ProcessingError, Result, TransactionError};

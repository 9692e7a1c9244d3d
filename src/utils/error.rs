//! Error types shared across the crate.
//!
//! Lifecycle, timeout and configuration failures surface to callers as
//! [`Error`]. A [`ProcessingError`] never leaves the consume loop: it is
//! turned into a transaction rollback. A [`DeliveryError`] means a message
//! body could not be read as the requested type.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::route::RouteStatus;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by broker, controller and harness operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A lifecycle transition was requested from an incompatible state.
    #[error("route `{route_id}` cannot {action} while {status}")]
    InvalidState {
        route_id: String,
        action: &'static str,
        status: RouteStatus,
    },

    /// A bounded wait ended before its condition held.
    #[error("timed out after {timeout:?} waiting for {waiting_for}")]
    Timeout {
        waiting_for: String,
        timeout: Duration,
    },

    #[error("route `{0}` does not exist")]
    RouteNotFound(String),

    #[error("route `{0}` is already registered")]
    DuplicateRoute(String),

    #[error("route `{route_id}` is invalid: {reason}")]
    InvalidRoute { route_id: String, reason: String },

    #[error("connection factory `{0}` is not configured")]
    UnknownConnectionFactory(String),

    /// An observation point saw a different number of messages than expected.
    #[error("expected {expected} deliveries but observed {actual}")]
    UnexpectedDeliveries { expected: usize, actual: usize },

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("persistence failure: {0}")]
    Persistence(#[from] sled::Error),

    #[error("failed to encode persisted message: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// A processing step failed. Triggers a rollback of the enclosing transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("step `{}` failed: {reason}", step.as_deref().unwrap_or("<unnamed>"))]
pub struct ProcessingError {
    pub step: Option<String>,
    pub reason: String,
}

impl ProcessingError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            step: None,
            reason: reason.into(),
        }
    }

    /// Attributes the failure to a pipeline step unless it already names one.
    pub fn at_step(mut self, step: &str) -> Self {
        if self.step.is_none() {
            self.step = Some(step.to_string());
        }
        self
    }
}

impl From<DeliveryError> for ProcessingError {
    fn from(err: DeliveryError) -> Self {
        Self::new(err.to_string())
    }
}

/// A message body could not be read as the requested type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("message {message_id} carries a {actual} body, expected {expected}")]
    UnexpectedBody {
        message_id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("message {message_id} body does not decode as JSON: {reason}")]
    Malformed { message_id: String, reason: String },
}

/// A participant refused or failed to complete a transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("resource `{resource}` voted to roll back transaction {xid}: {reason}")]
    PrepareFailed {
        xid: Uuid,
        resource: String,
        reason: String,
    },

    #[error("resource `{resource}` failed to commit transaction {xid}: {reason}")]
    CommitFailed {
        xid: Uuid,
        resource: String,
        reason: String,
        /// Set when other participants had already committed.
        heuristic: bool,
    },
}

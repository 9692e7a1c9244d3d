//! The `transaction` module coordinates commit and rollback across every
//! resource a route touches while processing one message.

pub mod coordinator;
pub mod resource;

pub use coordinator::{Transaction, TransactionCoordinator, TransactionState};
pub use resource::TransactionalResource;

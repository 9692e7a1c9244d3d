//! XA-style transaction coordinator.
//!
//! A `TransactionCoordinator` hands out `Transaction`s and bounds how many
//! may be open at once, like a pooled XA connection factory. A transaction
//! enlists any number of `TransactionalResource`s and settles them together:
//! a single participant commits in one phase, several participants go through
//! prepare first. Any failure rolls back every participant that has not
//! committed yet.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::transaction::resource::TransactionalResource;
use crate::utils::error::TransactionError;

#[derive(Debug, Clone)]
pub struct TransactionCoordinator {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl TransactionCoordinator {
    /// `max_concurrent` is clamped to at least one.
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Begins a transaction, waiting for a free slot.
    pub async fn begin(&self) -> Transaction {
        // The semaphore is never closed, so acquiring only fails in theory.
        let permit = self.permits.clone().acquire_owned().await.ok();
        Transaction::new(permit)
    }

    /// Begins a transaction if a slot is free right now.
    pub fn try_begin(&self) -> Option<Transaction> {
        let permit = self.permits.clone().try_acquire_owned().ok()?;
        Some(Transaction::new(Some(permit)))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

pub struct Transaction {
    xid: Uuid,
    resources: Vec<Box<dyn TransactionalResource>>,
    state: TransactionState,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Transaction {
    fn new(permit: Option<OwnedSemaphorePermit>) -> Self {
        Self {
            xid: Uuid::new_v4(),
            resources: Vec::new(),
            state: TransactionState::Active,
            _permit: permit,
        }
    }

    pub fn xid(&self) -> Uuid {
        self.xid
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn participants(&self) -> usize {
        self.resources.len()
    }

    pub fn enlist(&mut self, resource: Box<dyn TransactionalResource>) {
        debug!(xid = %self.xid, resource = %resource.describe(), "enlisted");
        self.resources.push(resource);
    }

    /// Commits every participant or none.
    ///
    /// On error the transaction has been rolled back, including the
    /// participant that failed, except for participants reported as already
    /// committed (`heuristic`).
    pub fn commit(mut self) -> Result<(), TransactionError> {
        if self.resources.len() > 1 {
            for index in 0..self.resources.len() {
                if let Err(reason) = self.resources[index].prepare() {
                    let resource = self.resources[index].describe();
                    warn!(xid = %self.xid, %resource, %reason, "prepare failed, rolling back");
                    self.rollback_from(self.resources.len());
                    return Err(TransactionError::PrepareFailed {
                        xid: self.xid,
                        resource,
                        reason,
                    });
                }
            }
        }

        // Last enlisted commits first, so the receive that opened the
        // transaction is acknowledged only after everything else committed.
        let count = self.resources.len();
        for index in (0..count).rev() {
            if let Err(reason) = self.resources[index].commit() {
                let resource = self.resources[index].describe();
                let heuristic = index + 1 < count;
                error!(xid = %self.xid, %resource, %reason, heuristic, "commit failed");
                self.rollback_from(index + 1);
                return Err(TransactionError::CommitFailed {
                    xid: self.xid,
                    resource,
                    reason,
                    heuristic,
                });
            }
        }

        self.state = TransactionState::Committed;
        debug!(xid = %self.xid, participants = count, "committed");
        Ok(())
    }

    pub fn rollback(mut self) {
        self.rollback_from(self.resources.len());
    }

    /// Rolls back participants `[0, end)`, last enlisted first.
    fn rollback_from(&mut self, end: usize) {
        for resource in self.resources[..end].iter_mut().rev() {
            resource.rollback();
        }
        self.state = TransactionState::RolledBack;
        debug!(xid = %self.xid, "rolled back");
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active && !self.resources.is_empty() {
            warn!(xid = %self.xid, "transaction dropped while active, rolling back");
            self.rollback_from(self.resources.len());
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("xid", &self.xid)
            .field("participants", &self.resources.len())
            .field("state", &self.state)
            .finish()
    }
}

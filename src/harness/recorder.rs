use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::broker::Message;
use crate::route::{Exchange, Step};
use crate::utils::error::{Error, ProcessingError, Result};

#[derive(Debug, Default)]
struct RecorderState {
    received: Vec<Message>,
    expected: Option<usize>,
}

/// An observation point that records every message reaching it.
///
/// Recording happens during processing, before the transaction settles.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    state: Arc<Mutex<RecorderState>>,
    arrived: Arc<Notify>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn expect_count(&self, count: usize) {
        self.state().expected = Some(count);
    }

    /// Forgets recorded messages and expectations.
    pub fn reset(&self) {
        let mut state = self.state();
        state.received.clear();
        state.expected = None;
    }

    pub fn received(&self) -> Vec<Message> {
        self.state().received.clone()
    }

    pub fn count(&self) -> usize {
        self.state().received.len()
    }

    /// Waits until the expected number of messages arrived, then checks no
    /// more than that were recorded. Without an expectation, checks that
    /// nothing arrived.
    pub async fn assert_is_satisfied(&self, timeout: Duration) -> Result<()> {
        let expected = self.state().expected.unwrap_or(0);
        let reached = tokio::time::timeout(timeout, async {
            loop {
                let arrived = self.arrived.notified();
                tokio::pin!(arrived);
                arrived.as_mut().enable();
                if self.count() >= expected {
                    return;
                }
                arrived.await;
            }
        })
        .await;

        let actual = self.count();
        if reached.is_err() {
            return Err(Error::Timeout {
                waiting_for: format!("{expected} deliveries, observed {actual}"),
                timeout,
            });
        }
        if actual != expected {
            return Err(Error::UnexpectedDeliveries { expected, actual });
        }
        Ok(())
    }
}

impl Step for Recorder {
    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        self.state().received.push(exchange.message().clone());
        self.arrived.notify_waiters();
        Ok(())
    }
}

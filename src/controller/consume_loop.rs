//! The transactional consume-process-commit loop run by each route consumer.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::client::{Consumer, Delivery};
use crate::controller::route_controller::RouteController;
use crate::route::{Exchange, Pipeline, RedeliveryPolicy};
use crate::transaction::{Transaction, TransactionCoordinator};

enum Settlement {
    Committed,
    RolledBack { delivery_count: u32 },
}

pub(crate) struct ConsumeLoop {
    pub(crate) controller: RouteController,
    pub(crate) route_id: String,
    pub(crate) index: usize,
    pub(crate) consumer: Consumer,
    pub(crate) coordinator: TransactionCoordinator,
    pub(crate) pipeline: Arc<RwLock<Pipeline>>,
    pub(crate) redelivery: RedeliveryPolicy,
    pub(crate) receive_timeout: Duration,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl ConsumeLoop {
    /// Runs until shutdown is signalled or a message exhausts its redeliveries.
    ///
    /// Shutdown is only observed while waiting for a transaction slot, a
    /// message or a redelivery delay. A message that has been received is
    /// always committed or rolled back before the loop exits.
    pub(crate) async fn run(mut self) {
        debug!(route_id = %self.route_id, consumer = self.index, "consumer started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let transaction = tokio::select! {
                _ = self.shutdown.changed() => break,
                transaction = self.coordinator.begin() => transaction,
            };

            let delivery = tokio::select! {
                _ = self.shutdown.changed() => break,
                delivery = self.consumer.receive(self.receive_timeout) => delivery,
            };
            let Some(delivery) = delivery else {
                continue;
            };

            match self.process(transaction, delivery) {
                Settlement::Committed => {}
                Settlement::RolledBack { delivery_count } => {
                    if self.redelivery.is_exhausted(delivery_count) {
                        warn!(
                            route_id = %self.route_id,
                            consumer = self.index,
                            delivery_count,
                            "redeliveries exhausted, stopping route"
                        );
                        if let Err(e) = self.controller.stop(&self.route_id) {
                            debug!(route_id = %self.route_id, error = %e, "route already stopping");
                        }
                        break;
                    }

                    let delay = self.redelivery.redelivery_delay;
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = self.shutdown.changed() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        debug!(route_id = %self.route_id, consumer = self.index, "consumer stopped");
    }

    fn process(&self, mut transaction: Transaction, delivery: Delivery) -> Settlement {
        let (message, receipt) = delivery.into_parts();
        let delivery_count = message.delivery_count;
        let message_id = message.message_id.clone();
        transaction.enlist(Box::new(receipt));

        let pipeline = self
            .pipeline
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut exchange = Exchange::new(&self.route_id, message);
        let outcome = pipeline.process(&mut exchange);
        for resource in exchange.take_resources() {
            transaction.enlist(resource);
        }

        let xid = transaction.xid();
        match outcome {
            Ok(()) => match transaction.commit() {
                Ok(()) => {
                    debug!(route_id = %self.route_id, %xid, %message_id, "message consumed");
                    Settlement::Committed
                }
                Err(e) => {
                    warn!(route_id = %self.route_id, %xid, %message_id, error = %e, "commit failed");
                    Settlement::RolledBack { delivery_count }
                }
            },
            Err(e) => {
                warn!(
                    route_id = %self.route_id,
                    %xid,
                    %message_id,
                    delivery_count,
                    error = %e,
                    "processing failed, rolling back"
                );
                transaction.rollback();
                Settlement::RolledBack { delivery_count }
            }
        }
    }
}

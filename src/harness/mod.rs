//! The `harness` module drives routes from the outside the way an
//! integration test does: publish, drain and read subscriptions, and move
//! routes through their lifecycle with bounded waits.

pub mod recorder;

use std::time::Duration;

use tracing::debug;

use crate::broker::{Body, Message};
use crate::client::ConnectionFactory;
use crate::controller::RouteController;
use crate::route::RouteStatus;
use crate::utils::error::Result;

pub use recorder::Recorder;

/// Bounds for every wait the harness performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Reaching a route's target status after start or stop.
    pub lifecycle: Duration,
    /// A single `receive_one`.
    pub receive: Duration,
    /// Silence that ends a drain.
    pub drain: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            lifecycle: Duration::from_secs(5),
            receive: Duration::from_secs(1),
            drain: Duration::from_secs(1),
        }
    }
}

#[derive(Clone)]
pub struct Harness {
    controller: RouteController,
    timeouts: Timeouts,
}

impl Harness {
    pub fn new(controller: RouteController, timeouts: Timeouts) -> Self {
        Self {
            controller,
            timeouts,
        }
    }

    pub fn controller(&self) -> &RouteController {
        &self.controller
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn send(
        &self,
        factory: &ConnectionFactory,
        topic: &str,
        payload: impl Into<Body>,
    ) -> Result<Message> {
        factory.producer().send(topic, payload)
    }

    /// Acknowledges everything queued on a subscription until it stays quiet
    /// for the drain timeout. Returns how many messages were removed.
    pub async fn drain_subscription(
        &self,
        factory: &ConnectionFactory,
        topic: &str,
        subscription: &str,
    ) -> Result<usize> {
        let consumer = factory.shared_durable_consumer(topic, subscription)?;
        let mut drained = 0;
        while let Some(delivery) = consumer.receive(self.timeouts.drain).await {
            delivery.ack()?;
            drained += 1;
        }
        debug!(topic, subscription, drained, "drained subscription");
        Ok(drained)
    }

    /// Receives and acknowledges at most one message.
    pub async fn receive_one(
        &self,
        factory: &ConnectionFactory,
        topic: &str,
        subscription: &str,
    ) -> Result<Option<Message>> {
        let consumer = factory.shared_durable_consumer(topic, subscription)?;
        match consumer.receive(self.timeouts.receive).await {
            Some(delivery) => Ok(Some(delivery.ack()?)),
            None => Ok(None),
        }
    }

    pub fn route_status(&self, route_id: &str) -> Result<RouteStatus> {
        self.controller.status(route_id)
    }

    pub async fn await_route_status(&self, route_id: &str, status: RouteStatus) -> Result<()> {
        self.controller
            .wait_for_status(route_id, status, self.timeouts.lifecycle)
            .await
    }

    /// Brings a route to `Started`, whatever state it is in.
    pub async fn start_route(&self, route_id: &str) -> Result<()> {
        match self.route_status(route_id)? {
            RouteStatus::Started => return Ok(()),
            RouteStatus::Starting => {}
            RouteStatus::Stopping => {
                self.await_route_status(route_id, RouteStatus::Stopped)
                    .await?;
                self.controller.start(route_id)?;
            }
            RouteStatus::Stopped => self.controller.start(route_id)?,
        }
        self.await_route_status(route_id, RouteStatus::Started).await
    }

    /// Brings a route to `Stopped`, whatever state it is in.
    pub async fn stop_route(&self, route_id: &str) -> Result<()> {
        match self.route_status(route_id)? {
            RouteStatus::Stopped => return Ok(()),
            RouteStatus::Stopping => {}
            RouteStatus::Starting => {
                self.await_route_status(route_id, RouteStatus::Started)
                    .await?;
                self.controller.stop(route_id)?;
            }
            RouteStatus::Started => self.controller.stop(route_id)?,
        }
        self.await_route_status(route_id, RouteStatus::Stopped).await
    }
}

#[cfg(test)]
mod tests;

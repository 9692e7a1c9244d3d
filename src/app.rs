//! Wires configured brokers and routes together.

use std::collections::HashMap;
use std::time::Duration;

use config::ConfigError;
use tracing::info;

use crate::broker::Broker;
use crate::client::ConnectionFactory;
use crate::config::{RouteSettings, Settings};
use crate::controller::RouteController;
use crate::harness::{Harness, Timeouts};
use crate::persistence::Persistence;
use crate::route::{Log, RedeliveryPolicy, RouteBuilder, RouteDefinition, SendTo};
use crate::utils::error::{Error, Result};

/// Connection factories and routes built from [`Settings`].
pub struct App {
    factories: HashMap<String, ConnectionFactory>,
    controller: RouteController,
    timeouts: Timeouts,
}

impl App {
    /// Opens every broker and registers every route, all routes `Stopped`.
    ///
    /// Route subscriptions are created here, so messages published before a
    /// route starts are kept for it.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let timeouts = settings.timeouts.to_timeouts();

        let mut factories = HashMap::new();
        for broker in &settings.brokers {
            if factories.contains_key(&broker.name) {
                return Err(ConfigError::Message(format!(
                    "broker `{}` is configured twice",
                    broker.name
                ))
                .into());
            }
            let engine = match &broker.data_dir {
                Some(dir) => Broker::with_persistence(Persistence::open(dir)?)?,
                None => Broker::new(),
            };
            info!(name = %broker.name, data_dir = ?broker.data_dir, "broker opened");
            factories.insert(
                broker.name.clone(),
                ConnectionFactory::new(&broker.name, engine.into_shared(), broker.max_transactions),
            );
        }

        let app = Self {
            factories,
            controller: RouteController::new(timeouts.receive),
            timeouts,
        };
        for route in &settings.routes {
            let definition = app.route_definition(route)?;
            app.controller.add_route(definition)?;
        }
        Ok(app)
    }

    fn route_definition(&self, route: &RouteSettings) -> Result<RouteDefinition> {
        let factory = self.factory(&route.connection_factory)?;
        factory.shared_durable_consumer(&route.topic, &route.subscription)?;

        let mut builder = RouteBuilder::new(&route.id)
            .from(factory, &route.topic, &route.subscription)
            .consumers(route.consumers)
            .redelivery(RedeliveryPolicy {
                max_redeliveries: route.max_redeliveries,
                redelivery_delay: Duration::from_millis(route.redelivery_delay_ms),
            })
            .step("log", Log);
        if let Some(target) = &route.forward_to {
            builder = builder.step("forward", SendTo::new(factory, target));
        }
        builder.build()
    }

    pub fn factory(&self, name: &str) -> Result<&ConnectionFactory> {
        self.factories
            .get(name)
            .ok_or_else(|| Error::UnknownConnectionFactory(name.to_string()))
    }

    pub fn controller(&self) -> &RouteController {
        &self.controller
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn harness(&self) -> Harness {
        Harness::new(self.controller.clone(), self.timeouts)
    }

    /// Starts every route and waits until each is `Started`.
    pub async fn start_all(&self) -> Result<()> {
        let harness = self.harness();
        for route_id in self.controller.route_ids() {
            harness.start_route(&route_id).await?;
        }
        Ok(())
    }

    pub async fn stop_all(&self) -> Result<()> {
        self.controller.stop_all(self.timeouts.lifecycle).await
    }
}

//! Route lifecycle management.
//!
//! `start` and `stop` only perform the first half of a transition
//! (`Starting`/`Stopping`) and return; a spawned task completes it. Callers
//! observe completion through `status` or `wait_for_status`. Both need to run
//! inside a Tokio runtime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::controller::consume_loop::ConsumeLoop;
use crate::route::{Pipeline, RouteDefinition, RouteStatus};
use crate::utils::error::{Error, Result};

/// Receive timeout of route consumers unless configured otherwise.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

struct RouteEntry {
    definition: RouteDefinition,
    pipeline: Arc<RwLock<Pipeline>>,
    status: Arc<watch::Sender<RouteStatus>>,
    shutdown: Option<watch::Sender<bool>>,
    consumers: Vec<JoinHandle<()>>,
}

impl RouteEntry {
    fn status(&self) -> RouteStatus {
        *self.status.borrow()
    }
}

struct ControllerInner {
    routes: Mutex<HashMap<String, RouteEntry>>,
    receive_timeout: Duration,
}

/// Owns every registered route and drives its lifecycle.
#[derive(Clone)]
pub struct RouteController {
    inner: Arc<ControllerInner>,
}

impl Default for RouteController {
    fn default() -> Self {
        Self::new(DEFAULT_RECEIVE_TIMEOUT)
    }
}

impl RouteController {
    pub fn new(receive_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                routes: Mutex::new(HashMap::new()),
                receive_timeout,
            }),
        }
    }

    fn routes(&self) -> MutexGuard<'_, HashMap<String, RouteEntry>> {
        self.inner
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a route in the `Stopped` state.
    pub fn add_route(&self, definition: RouteDefinition) -> Result<()> {
        let mut routes = self.routes();
        if routes.contains_key(&definition.id) {
            return Err(Error::DuplicateRoute(definition.id));
        }
        let (status, _) = watch::channel(RouteStatus::Stopped);
        let pipeline = Arc::new(RwLock::new(definition.pipeline.clone()));
        debug!(route_id = %definition.id, steps = ?definition.pipeline, "route registered");
        routes.insert(
            definition.id.clone(),
            RouteEntry {
                definition,
                pipeline,
                status: Arc::new(status),
                shutdown: None,
                consumers: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn route_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.routes().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn status(&self, route_id: &str) -> Result<RouteStatus> {
        self.routes()
            .get(route_id)
            .map(RouteEntry::status)
            .ok_or_else(|| Error::RouteNotFound(route_id.to_string()))
    }

    /// Begins starting a stopped route. Starting a started route is a no-op.
    pub fn start(&self, route_id: &str) -> Result<()> {
        let mut routes = self.routes();
        let entry = routes
            .get_mut(route_id)
            .ok_or_else(|| Error::RouteNotFound(route_id.to_string()))?;

        match entry.status() {
            RouteStatus::Stopped => {}
            RouteStatus::Started => return Ok(()),
            status => {
                return Err(Error::InvalidState {
                    route_id: route_id.to_string(),
                    action: "start",
                    status,
                });
            }
        }

        entry.status.send_replace(RouteStatus::Starting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        entry.shutdown = Some(shutdown_tx);
        info!(route_id, "starting route");

        let controller = self.clone();
        let route_id = route_id.to_string();
        tokio::spawn(async move { controller.complete_start(&route_id, shutdown_rx) });
        Ok(())
    }

    fn complete_start(&self, route_id: &str, shutdown: watch::Receiver<bool>) {
        let mut routes = self.routes();
        let Some(entry) = routes.get_mut(route_id) else {
            return;
        };
        let definition = &entry.definition;
        let factory = &definition.connection_factory;

        let mut consumers = Vec::with_capacity(definition.consumers);
        for _ in 0..definition.consumers {
            match factory.shared_durable_consumer(&definition.topic, &definition.subscription) {
                Ok(consumer) => consumers.push(consumer),
                Err(e) => {
                    error!(route_id, error = %e, "failed to open consumer, route stays stopped");
                    entry.shutdown = None;
                    entry.status.send_replace(RouteStatus::Stopped);
                    return;
                }
            }
        }

        entry.consumers = consumers
            .into_iter()
            .enumerate()
            .map(|(index, consumer)| {
                let worker = ConsumeLoop {
                    controller: self.clone(),
                    route_id: route_id.to_string(),
                    index,
                    consumer,
                    coordinator: factory.coordinator().clone(),
                    pipeline: entry.pipeline.clone(),
                    redelivery: definition.redelivery,
                    receive_timeout: self.inner.receive_timeout,
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        entry.status.send_replace(RouteStatus::Started);
        info!(
            route_id,
            consumers = definition.consumers,
            subscription = %format!("{}/{}", definition.topic, definition.subscription),
            "route started"
        );
    }

    /// Begins stopping a started route.
    ///
    /// The route reports `Stopped` once every consumer has settled its
    /// current transaction and exited.
    pub fn stop(&self, route_id: &str) -> Result<()> {
        let mut routes = self.routes();
        let entry = routes
            .get_mut(route_id)
            .ok_or_else(|| Error::RouteNotFound(route_id.to_string()))?;

        let status = entry.status();
        if !status.is_started() {
            return Err(Error::InvalidState {
                route_id: route_id.to_string(),
                action: "stop",
                status,
            });
        }

        entry.status.send_replace(RouteStatus::Stopping);
        if let Some(shutdown) = entry.shutdown.take() {
            shutdown.send_replace(true);
        }
        info!(route_id, "stopping route");

        let consumers = std::mem::take(&mut entry.consumers);
        let status = entry.status.clone();
        let route_id = route_id.to_string();
        tokio::spawn(async move {
            for joined in join_all(consumers).await {
                if let Err(e) = joined {
                    warn!(route_id, error = %e, "consumer task ended abnormally");
                }
            }
            status.send_replace(RouteStatus::Stopped);
            info!(route_id, "route stopped");
        });
        Ok(())
    }

    /// Waits until the route reaches `target`, at most `timeout`.
    pub async fn wait_for_status(
        &self,
        route_id: &str,
        target: RouteStatus,
        timeout: Duration,
    ) -> Result<()> {
        let mut status = self
            .routes()
            .get(route_id)
            .map(|entry| entry.status.subscribe())
            .ok_or_else(|| Error::RouteNotFound(route_id.to_string()))?;

        match tokio::time::timeout(timeout, status.wait_for(|s| *s == target)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::RouteNotFound(route_id.to_string())),
            Err(_) => Err(Error::Timeout {
                waiting_for: format!("route `{route_id}` to be {target}"),
                timeout,
            }),
        }
    }

    /// Edits a route's pipeline. Consumers pick the change up with their next message.
    pub fn advise<F>(&self, route_id: &str, advice: F) -> Result<()>
    where
        F: FnOnce(&mut Pipeline),
    {
        let pipeline = self
            .routes()
            .get(route_id)
            .map(|entry| entry.pipeline.clone())
            .ok_or_else(|| Error::RouteNotFound(route_id.to_string()))?;

        let mut pipeline = pipeline.write().unwrap_or_else(PoisonError::into_inner);
        advice(&mut pipeline);
        debug!(route_id, steps = ?*pipeline, "route advised");
        Ok(())
    }

    /// Stops every started route and waits for each to report `Stopped`.
    pub async fn stop_all(&self, timeout: Duration) -> Result<()> {
        let mut stopping = Vec::new();
        for route_id in self.route_ids() {
            match self.status(&route_id)? {
                RouteStatus::Started => {
                    self.stop(&route_id)?;
                    stopping.push(route_id);
                }
                RouteStatus::Stopping => stopping.push(route_id),
                _ => {}
            }
        }
        for route_id in stopping {
            self.wait_for_status(&route_id, RouteStatus::Stopped, timeout)
                .await?;
        }
        Ok(())
    }
}

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::client::ConnectionFactory;
use crate::route::step::{Exchange, Step};
use crate::utils::error::{Error, ProcessingError, Result};

/// Consumers per route when the builder is not told otherwise.
pub const DEFAULT_CONSUMERS: usize = 1;

#[derive(Clone)]
struct NamedStep {
    id: String,
    step: Arc<dyn Step>,
}

/// Ordered list of named steps.
///
/// Steps can be inserted at either end, removed, or replaced by id while the
/// route runs. Ids are not required to be unique; `remove` drops every match.
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<NamedStep>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_first(&mut self, id: &str, step: impl Step + 'static) -> &mut Self {
        self.steps.insert(
            0,
            NamedStep {
                id: id.to_string(),
                step: Arc::new(step),
            },
        );
        self
    }

    pub fn add_last(&mut self, id: &str, step: impl Step + 'static) -> &mut Self {
        self.steps.push(NamedStep {
            id: id.to_string(),
            step: Arc::new(step),
        });
        self
    }

    /// Returns `true` if a step was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.steps.len();
        self.steps.retain(|s| s.id != id);
        self.steps.len() != before
    }

    /// Replaces the first step with `id`. Returns `false` if there is none.
    pub fn replace(&mut self, id: &str, step: impl Step + 'static) -> bool {
        match self.steps.iter_mut().find(|s| s.id == id) {
            Some(named) => {
                named.step = Arc::new(step);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.steps.iter().any(|s| s.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order, stopping at the first failure.
    pub fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        for named in &self.steps {
            named
                .step
                .process(exchange)
                .map_err(|e| e.at_step(&named.id))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

/// How often a failing message is redelivered before the route gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    /// Redeliveries allowed after the first delivery.
    pub max_redeliveries: u32,
    /// Pause of the failing consumer before it receives again.
    pub redelivery_delay: Duration,
}

impl RedeliveryPolicy {
    /// A delivery that fails with this count leaves no redelivery attempt.
    pub fn is_exhausted(&self, delivery_count: u32) -> bool {
        delivery_count > self.max_redeliveries
    }
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_redeliveries: 1,
            redelivery_delay: Duration::ZERO,
        }
    }
}

/// Everything needed to run a route.
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    pub id: String,
    pub connection_factory: ConnectionFactory,
    pub topic: String,
    pub subscription: String,
    pub consumers: usize,
    pub redelivery: RedeliveryPolicy,
    pub pipeline: Pipeline,
}

/// Builds a [`RouteDefinition`].
///
/// ```ignore
/// let route = RouteBuilder::new("first-route")
///     .from(&factory, "first", "first-subscription")
///     .consumers(9)
///     .step("log", Log)
///     .build()?;
/// ```
pub struct RouteBuilder {
    id: String,
    source: Option<(ConnectionFactory, String, String)>,
    consumers: usize,
    redelivery: RedeliveryPolicy,
    pipeline: Pipeline,
}

impl RouteBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            source: None,
            consumers: DEFAULT_CONSUMERS,
            redelivery: RedeliveryPolicy::default(),
            pipeline: Pipeline::new(),
        }
    }

    pub fn from(mut self, factory: &ConnectionFactory, topic: &str, subscription: &str) -> Self {
        self.source = Some((factory.clone(), topic.to_string(), subscription.to_string()));
        self
    }

    pub fn consumers(mut self, consumers: usize) -> Self {
        self.consumers = consumers;
        self
    }

    pub fn redelivery(mut self, policy: RedeliveryPolicy) -> Self {
        self.redelivery = policy;
        self
    }

    pub fn step(mut self, id: &str, step: impl Step + 'static) -> Self {
        self.pipeline.add_last(id, step);
        self
    }

    pub fn build(self) -> Result<RouteDefinition> {
        let invalid = |reason: &str| Error::InvalidRoute {
            route_id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("route id must not be empty"));
        }
        if self.consumers == 0 {
            return Err(invalid("a route needs at least one consumer"));
        }
        let Some((connection_factory, topic, subscription)) = self.source.clone() else {
            return Err(invalid("no source subscription, call `from` first"));
        };
        if topic.is_empty() || subscription.is_empty() {
            return Err(invalid("topic and subscription names must not be empty"));
        }

        Ok(RouteDefinition {
            id: self.id,
            connection_factory,
            topic,
            subscription,
            consumers: self.consumers,
            redelivery: self.redelivery,
            pipeline: self.pipeline,
        })
    }
}

use std::sync::Arc;

use crate::{
    config::Config,
    events::Bus,
    persistence::TaskRegistry,
    subscribers::{Subscribe, SubscriberSet},
};

use super::host::ExecutorHost;

/// Builder for constructing an [`ExecutorHost`].
pub struct HostBuilder {
    cfg: Config,
    registry: TaskRegistry,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl HostBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            registry: TaskRegistry::new(),
            subscribers: Vec::new(),
        }
    }

    /// Sets the registry used to rebuild restored tasks and resolve `submit_named`.
    ///
    /// Register every persistable task type before the first reference
    /// request; records of unknown types are skipped on restore.
    pub fn with_registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive executor events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the host.
    ///
    /// Spawns subscriber workers; must be called within a tokio runtime.
    /// The executor itself is created on the first reference request.
    pub fn build(self) -> Arc<ExecutorHost> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        ExecutorHost::new_internal(self.cfg, bus, subs, Arc::new(self.registry))
    }
}

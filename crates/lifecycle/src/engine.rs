//! Shared collaborators of every resource in a run

use crate::config::EngineConfig;
use crate::context::{EventSink, LogEvents};
use crate::registry::TypeRegistry;
use crate::retry::{BackoffStrategy, ExponentialBackoff, LogCallback, RetryCallback, RetryPolicy};
use crate::store::ResourceStore;
use std::sync::Arc;

/// Registry, store, configuration and injectable strategies.
///
/// Cheap to clone; every resource keeps its own handle.
#[derive(Clone)]
pub struct Engine {
    pub registry: Arc<TypeRegistry>,
    pub store: Arc<dyn ResourceStore>,
    pub config: EngineConfig,
    pub backoff: Arc<dyn BackoffStrategy>,
    pub events: Arc<dyn EventSink>,
    pub retry_callback: Arc<dyn RetryCallback>,
}

impl Engine {
    /// Default configuration, exponential backoff, events and retries
    /// reported through the log.
    pub fn new(registry: Arc<TypeRegistry>, store: Arc<dyn ResourceStore>) -> Self {
        let config = EngineConfig::default();
        Self {
            registry,
            store,
            backoff: Arc::new(ExponentialBackoff {
                scale: config.backoff_scale,
            }),
            config,
            events: Arc::new(LogEvents),
            retry_callback: Arc::new(LogCallback),
        }
    }

    /// Replace the configuration. Also resets the backoff to an exponential
    /// one using the configured scale, so call `with_backoff` afterwards.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.backoff = Arc::new(ExponentialBackoff {
            scale: config.backoff_scale,
        });
        self.config = config;
        self
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffStrategy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_retry_callback(mut self, callback: Arc<dyn RetryCallback>) -> Self {
        self.retry_callback = callback;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.action_retry_limit, self.config.jitter_max)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

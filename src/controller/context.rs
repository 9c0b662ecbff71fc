use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::cache::PolicyCache;
use crate::client::ClusterClient;
use crate::clock::Clock;
use crate::config::OperatorConfig;
use crate::controller::error::{BackoffConfig, Error, ErrorContext};
use crate::controller::events::EventPublisher;
use crate::health::Metrics;
use crate::policy::{DecisionEngine, ObjectKey};

/// Handle for enqueueing workload reconciliations from outside the
/// workload controller's own watches
///
/// The controller's scheduler collapses repeated keys, so enqueueing a
/// workload that is already pending is cheap.
#[derive(Clone, Debug)]
pub struct WorkloadQueue {
    tx: mpsc::UnboundedSender<ObjectKey>,
}

impl WorkloadQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ObjectKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the workload controller has stopped
    pub fn enqueue(&self, key: ObjectKey) -> bool {
        self.tx.send(key).is_ok()
    }
}

/// Shared context for both controllers
pub struct Context {
    pub client: Arc<dyn ClusterClient>,
    pub cache: Arc<PolicyCache>,
    pub engine: DecisionEngine,
    pub events: Arc<dyn EventPublisher>,
    pub clock: Arc<dyn Clock>,
    pub config: OperatorConfig,
    pub metrics: Arc<Metrics>,
    pub backoff: BackoffConfig,
    pub queue: WorkloadQueue,
    /// Consecutive failures per controller and object
    retries: Mutex<HashMap<(&'static str, ObjectKey), ErrorContext>>,
    /// Foreign PDB resourceVersion already reported per workload
    conflicts: Mutex<HashMap<ObjectKey, String>>,
}

impl Context {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        cache: Arc<PolicyCache>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: OperatorConfig,
        metrics: Arc<Metrics>,
        queue: WorkloadQueue,
    ) -> Self {
        Self {
            client,
            cache,
            engine: DecisionEngine::new(config.default_enforcement_mode),
            events,
            clock,
            config,
            metrics,
            backoff: BackoffConfig::default(),
            queue,
            retries: Mutex::new(HashMap::new()),
            conflicts: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure of `controller` on `key` and return the requeue delay
    pub fn record_error(&self, controller: &'static str, key: &ObjectKey, error: &Error) -> Duration {
        let mut retries = self.retries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = retries.entry((controller, key.clone())).or_default();
        let attempt = entry.consecutive_errors;
        entry.record_error(error);
        self.backoff.delay_for_error(error, attempt)
    }

    pub fn reset_errors(&self, controller: &'static str, key: &ObjectKey) {
        let mut retries = self.retries.lock().unwrap_or_else(PoisonError::into_inner);
        retries.remove(&(controller, key.clone()));
    }

    pub fn consecutive_errors(&self, controller: &'static str, key: &ObjectKey) -> u32 {
        let retries = self.retries.lock().unwrap_or_else(PoisonError::into_inner);
        retries
            .get(&(controller, key.clone()))
            .map_or(0, |c| c.consecutive_errors)
    }

    /// Remember a foreign PDB version; true when it was not reported yet
    pub fn note_conflict(&self, workload: &ObjectKey, resource_version: &str) -> bool {
        let mut conflicts = self.conflicts.lock().unwrap_or_else(PoisonError::into_inner);
        match conflicts.get(workload) {
            Some(seen) if seen == resource_version => false,
            _ => {
                conflicts.insert(workload.clone(), resource_version.to_string());
                true
            }
        }
    }

    pub fn clear_conflict(&self, workload: &ObjectKey) {
        let mut conflicts = self.conflicts.lock().unwrap_or_else(PoisonError::into_inner);
        conflicts.remove(workload);
    }
}

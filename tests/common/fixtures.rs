//! Test fixtures and builders for workloads, policies and controller contexts
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let workload = create_test_workload("ns1", "api", 5, &[("tier", "frontend")]);
//! let policy = PolicyBuilder::new("ns1", "p1")
//!     .class(AvailabilityClass::HighAvailability)
//!     .select("tier", "frontend")
//!     .build();
//! let harness = TestHarness::new();
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, Time};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::ObjectMeta;
use tokio::sync::mpsc;

use availability_operator::cache::PolicyCache;
use availability_operator::clock::ManualClock;
use availability_operator::config::OperatorConfig;
use availability_operator::controller::{Context, WorkloadQueue};
use availability_operator::crd::{
    AvailabilityClass, AvailabilityPolicy, AvailabilityPolicySpec, ComponentSelector,
    DisruptionOverrides, EnforcementMode, MaintenanceWindow, Recurrence,
};
use availability_operator::health::Metrics;
use availability_operator::policy::{ObjectKey, WorkloadSnapshot};

use super::fake::{FakeClient, RecordingEventPublisher};

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// 2024-05-01 12:00 UTC, a Wednesday
pub fn test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

// =============================================================================
// Workloads
// =============================================================================

/// Deployment whose pod selector equals its labels
pub fn create_test_workload(
    namespace: &str,
    name: &str,
    replicas: i32,
    label_pairs: &[(&str, &str)],
) -> Deployment {
    let labels = labels(label_pairs);
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{}-{}", namespace, name)),
            generation: Some(1),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }),
        status: None,
    }
}

pub fn with_annotations(mut workload: Deployment, pairs: &[(&str, &str)]) -> Deployment {
    workload
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .extend(labels(pairs));
    workload
}

/// Engine input without going through a Deployment
pub fn snapshot(
    namespace: &str,
    name: &str,
    replicas: i32,
    label_pairs: &[(&str, &str)],
    annotation_pairs: &[(&str, &str)],
) -> WorkloadSnapshot {
    WorkloadSnapshot {
        key: ObjectKey::new(namespace, name),
        replicas,
        generation: Some(1),
        labels: labels(label_pairs),
        annotations: labels(annotation_pairs),
    }
}

// =============================================================================
// Policies
// =============================================================================

/// Builder for AvailabilityPolicy test objects
pub struct PolicyBuilder {
    policy: AvailabilityPolicy,
}

impl PolicyBuilder {
    /// High-availability, strict, selecting nothing in particular
    pub fn new(namespace: &str, name: &str) -> Self {
        let mut policy = AvailabilityPolicy::new(
            name,
            AvailabilityPolicySpec {
                availability_class: AvailabilityClass::HighAvailability,
                component_selector: ComponentSelector::default(),
                enforcement_mode: Some(EnforcementMode::Strict),
                overrides: None,
                maintenance_windows: Vec::new(),
            },
        );
        policy.metadata.namespace = Some(namespace.to_string());
        policy.metadata.uid = Some(format!("uid-policy-{}-{}", namespace, name));
        policy.metadata.generation = Some(1);
        Self { policy }
    }

    pub fn class(mut self, class: AvailabilityClass) -> Self {
        self.policy.spec.availability_class = class;
        self
    }

    pub fn mode(mut self, mode: EnforcementMode) -> Self {
        self.policy.spec.enforcement_mode = Some(mode);
        self
    }

    pub fn default_mode(mut self) -> Self {
        self.policy.spec.enforcement_mode = None;
        self
    }

    pub fn select(mut self, key: &str, value: &str) -> Self {
        self.policy
            .spec
            .component_selector
            .match_labels
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn min_available(mut self, value: IntOrString) -> Self {
        self.policy.spec.overrides = Some(DisruptionOverrides {
            min_available: Some(value),
            max_unavailable: None,
        });
        self
    }

    pub fn max_unavailable(mut self, value: IntOrString) -> Self {
        self.policy.spec.overrides = Some(DisruptionOverrides {
            min_available: None,
            max_unavailable: Some(value),
        });
        self
    }

    pub fn window(mut self, window: MaintenanceWindow) -> Self {
        self.policy.spec.maintenance_windows.push(window);
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.policy
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(
                "availability.example.com/priority".to_string(),
                priority.to_string(),
            );
        self
    }

    pub fn generation(mut self, generation: i64) -> Self {
        self.policy.metadata.generation = Some(generation);
        self
    }

    pub fn deleting(mut self) -> Self {
        self.policy.metadata.deletion_timestamp = Some(Time(test_start()));
        self
    }

    pub fn build(self) -> AvailabilityPolicy {
        self.policy
    }
}

/// A window relaxing to `maxUnavailable` = `max_unavailable`
pub fn relaxing_window(
    name: &str,
    start: &str,
    duration: &str,
    recurrence: Recurrence,
    timezone: &str,
    max_unavailable: &str,
) -> MaintenanceWindow {
    MaintenanceWindow {
        name: Some(name.to_string()),
        start: start.to_string(),
        duration: duration.to_string(),
        recurrence,
        timezone: timezone.to_string(),
        min_available: None,
        max_unavailable: Some(IntOrString::String(max_unavailable.to_string())),
    }
}

// =============================================================================
// PDBs
// =============================================================================

/// A PDB nobody told the operator about
pub fn create_foreign_pdb(namespace: &str, name: &str) -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(&[("app.kubernetes.io/managed-by", "helm")])),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(1)),
            ..Default::default()
        }),
        status: None,
    }
}

// =============================================================================
// Controller context
// =============================================================================

/// A controller context wired to in-memory collaborators
pub struct TestHarness {
    pub client: Arc<FakeClient>,
    pub events: Arc<RecordingEventPublisher>,
    pub clock: Arc<ManualClock>,
    pub metrics: Arc<Metrics>,
    pub cache: Arc<PolicyCache>,
    pub ctx: Arc<Context>,
    pub queue: mpsc::UnboundedReceiver<ObjectKey>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(OperatorConfig::default())
    }

    pub fn with_config(config: OperatorConfig) -> Self {
        let client = Arc::new(FakeClient::new());
        let events = Arc::new(RecordingEventPublisher::new());
        let clock = Arc::new(ManualClock::new(test_start()));
        let metrics = Arc::new(Metrics::new());
        let cache = Arc::new(PolicyCache::new(config.cache_config(), clock.clone()));
        let (queue, queue_rx) = WorkloadQueue::channel();
        let ctx = Arc::new(Context::new(
            client.clone(),
            cache.clone(),
            events.clone(),
            clock.clone(),
            config,
            metrics.clone(),
            queue,
        ));
        Self {
            client,
            events,
            clock,
            metrics,
            cache,
            ctx,
            queue: queue_rx,
        }
    }

    /// Keys enqueued by the policy reconciler so far
    pub fn drain_queue(&mut self) -> Vec<ObjectKey> {
        let mut keys = Vec::new();
        while let Ok(key) = self.queue.try_recv() {
            keys.push(key);
        }
        keys
    }
}

//! Health server for Kubernetes probes and Prometheus metrics
//!
//! Provides HTTP endpoints for:
//! - `/healthz` - Liveness probe (is the process alive?)
//! - `/readyz` - Readiness probe (is the operator ready to serve?)
//! - `/metrics` - Prometheus metrics

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::cache::CacheStats;
use crate::client::BreakerState;

/// Labels for per-object metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ObjectLabels {
    pub namespace: String,
    pub name: String,
}

impl EncodeLabelSet for ObjectLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for metrics keyed by a single string value
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct SingleLabel {
    pub key: &'static str,
    pub value: String,
}

impl EncodeLabelSet for SingleLabel {
    fn encode(&self, encoder: &mut LabelSetEncoder) -> Result<(), std::fmt::Error> {
        (self.key, self.value.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for decisions by class and mode
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DecisionLabels {
    pub class: String,
    pub mode: String,
}

impl EncodeLabelSet for DecisionLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder) -> Result<(), std::fmt::Error> {
        ("class", self.class.as_str()).encode(encoder.encode_label())?;
        ("mode", self.mode.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for class downgrades
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DowngradeLabels {
    pub from: String,
    pub to: String,
}

impl EncodeLabelSet for DowngradeLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder) -> Result<(), std::fmt::Error> {
        ("from", self.from.as_str()).encode(encoder.encode_label())?;
        ("to", self.to.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

fn single(key: &'static str, value: &str) -> SingleLabel {
    SingleLabel {
        key,
        value: value.to_string(),
    }
}

fn object(namespace: &str, name: &str) -> ObjectLabels {
    ObjectLabels {
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

/// Shared metrics state
///
/// Owned by the caller rather than registered globally, so every test can
/// start from a fresh registry.
pub struct Metrics {
    /// Total reconciliations counter
    pub reconciliations_total: Family<SingleLabel, Counter>,
    /// Failed reconciliations counter
    pub reconciliation_errors_total: Family<SingleLabel, Counter>,
    /// Reconciliation duration histogram
    pub reconcile_duration_seconds: Family<SingleLabel, Histogram>,

    pub pdb_operations_total: Family<SingleLabel, Counter>,
    pub decisions_total: Family<DecisionLabels, Counter>,
    pub override_rejections_total: Family<SingleLabel, Counter>,
    pub class_downgrades_total: Family<DowngradeLabels, Counter>,
    pub pdb_conflicts_total: Family<SingleLabel, Counter>,
    /// 1 when the workload's PDB reflects its decision
    pub workload_compliance: Family<ObjectLabels, Gauge>,
    /// 1 while a maintenance window relaxes the workload's PDB
    pub maintenance_active: Family<ObjectLabels, Gauge>,
    /// 0 closed, 1 half-open, 2 open
    pub breaker_state: Family<SingleLabel, Gauge>,

    pub cache_hits: Gauge,
    pub cache_misses: Gauge,
    pub cache_evictions: Gauge,

    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("availability_operator");

        let reconciliations_total = Family::<SingleLabel, Counter>::default();
        registry.register(
            "reconciliations",
            "Total number of reconciliations",
            reconciliations_total.clone(),
        );

        let reconciliation_errors_total = Family::<SingleLabel, Counter>::default();
        registry.register(
            "reconciliation_errors",
            "Total number of reconciliation errors",
            reconciliation_errors_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<SingleLabel, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "reconcile_duration_seconds",
            "Duration of reconciliation in seconds",
            reconcile_duration_seconds.clone(),
        );

        let pdb_operations_total = Family::<SingleLabel, Counter>::default();
        registry.register(
            "pdb_operations",
            "PodDisruptionBudget writes by operation",
            pdb_operations_total.clone(),
        );

        let decisions_total = Family::<DecisionLabels, Counter>::default();
        registry.register(
            "decisions",
            "Protective decisions by availability class and enforcement mode",
            decisions_total.clone(),
        );

        let override_rejections_total = Family::<SingleLabel, Counter>::default();
        registry.register(
            "override_rejections",
            "Annotation overrides rejected by enforcement mode",
            override_rejections_total.clone(),
        );

        let class_downgrades_total = Family::<DowngradeLabels, Counter>::default();
        registry.register(
            "class_downgrades",
            "Availability classes downgraded for lack of replicas",
            class_downgrades_total.clone(),
        );

        let pdb_conflicts_total = Family::<SingleLabel, Counter>::default();
        registry.register(
            "pdb_conflicts",
            "PodDisruptionBudgets found without the ownership marker",
            pdb_conflicts_total.clone(),
        );

        let workload_compliance = Family::<ObjectLabels, Gauge>::default();
        registry.register(
            "workload_compliance",
            "Whether the workload's PodDisruptionBudget reflects its decision",
            workload_compliance.clone(),
        );

        let maintenance_active = Family::<ObjectLabels, Gauge>::default();
        registry.register(
            "maintenance_active",
            "Whether a maintenance window currently relaxes the workload",
            maintenance_active.clone(),
        );

        let breaker_state = Family::<SingleLabel, Gauge>::default();
        registry.register(
            "breaker_state",
            "Circuit breaker state per operation (0 closed, 1 half-open, 2 open)",
            breaker_state.clone(),
        );

        let cache_hits = Gauge::default();
        registry.register("cache_hits", "Policy cache hits", cache_hits.clone());
        let cache_misses = Gauge::default();
        registry.register("cache_misses", "Policy cache misses", cache_misses.clone());
        let cache_evictions = Gauge::default();
        registry.register(
            "cache_evictions",
            "Policy cache evictions",
            cache_evictions.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            reconcile_duration_seconds,
            pdb_operations_total,
            decisions_total,
            override_rejections_total,
            class_downgrades_total,
            pdb_conflicts_total,
            workload_compliance,
            maintenance_active,
            breaker_state,
            cache_hits,
            cache_misses,
            cache_evictions,
            registry,
        }
    }

    /// Record a successful reconciliation of `controller`
    pub fn record_reconcile(&self, controller: &str, duration_secs: f64) {
        let labels = single("controller", controller);
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a failed reconciliation of `controller`
    pub fn record_error(&self, controller: &str) {
        self.reconciliation_errors_total
            .get_or_create(&single("controller", controller))
            .inc();
    }

    pub fn record_pdb_operation(&self, operation: &str) {
        self.pdb_operations_total
            .get_or_create(&single("operation", operation))
            .inc();
    }

    pub fn record_decision(&self, class: &str, mode: &str) {
        let labels = DecisionLabels {
            class: class.to_string(),
            mode: mode.to_string(),
        };
        self.decisions_total.get_or_create(&labels).inc();
    }

    pub fn record_override_rejection(&self, mode: &str) {
        self.override_rejections_total
            .get_or_create(&single("mode", mode))
            .inc();
    }

    pub fn record_class_downgrade(&self, from: &str, to: &str) {
        let labels = DowngradeLabels {
            from: from.to_string(),
            to: to.to_string(),
        };
        self.class_downgrades_total.get_or_create(&labels).inc();
    }

    pub fn record_conflict(&self, namespace: &str) {
        self.pdb_conflicts_total
            .get_or_create(&single("namespace", namespace))
            .inc();
    }

    pub fn set_compliance(&self, namespace: &str, name: &str, compliant: bool) {
        self.workload_compliance
            .get_or_create(&object(namespace, name))
            .set(i64::from(compliant));
    }

    pub fn compliance(&self, namespace: &str, name: &str) -> Option<i64> {
        let labels = object(namespace, name);
        self.workload_compliance.get(&labels).map(|g| g.get())
    }

    pub fn set_maintenance_active(&self, namespace: &str, name: &str, active: bool) {
        self.maintenance_active
            .get_or_create(&object(namespace, name))
            .set(i64::from(active));
    }

    /// Drop per-workload series once the workload is gone
    pub fn forget_workload(&self, namespace: &str, name: &str) {
        let labels = object(namespace, name);
        self.workload_compliance.remove(&labels);
        self.maintenance_active.remove(&labels);
    }

    pub fn set_breaker_state(&self, operation: &str, state: BreakerState) {
        self.breaker_state
            .get_or_create(&single("operation", operation))
            .set(state.gauge_value());
    }

    pub fn set_cache_stats(&self, stats: &CacheStats) {
        self.cache_hits.set(stats.hits as i64);
        self.cache_misses.set(stats.misses as i64);
        self.cache_evictions.set(stats.evictions as i64);
    }

    /// Encode metrics to Prometheus text format
    ///
    /// Returns an empty string if encoding fails (should never happen with valid metrics).
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the operator is ready (connected to K8s API)
    pub ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Arc<Metrics>,
    /// Last successful reconcile, unix seconds
    pub last_reconcile: AtomicU64,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new(Arc::new(Metrics::new()))
    }
}

impl HealthState {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            ready: RwLock::new(false),
            metrics,
            last_reconcile: AtomicU64::new(0),
        }
    }

    /// Mark the operator as ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the operator is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }

    pub fn touch(&self, unix_secs: u64) {
        self.last_reconcile.store(unix_secs, Ordering::Relaxed);
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the controllers are running.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the health server on `addr`
pub async fn run_health_server(
    state: Arc<HealthState>,
    addr: SocketAddr,
) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Health server listening on {}", addr);

    axum::serve(listener, app).await
}

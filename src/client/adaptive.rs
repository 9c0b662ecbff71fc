//! Adaptive circuit-breaking decorator
//!
//! [`AdaptiveClient`] forwards every [`ClusterClient`] call through the
//! breaker of its [`Operation`], bounds it by the breaker timeout and
//! records a [`Sample`]. Two background tasks turn samples into cluster
//! metrics and periodically retune the breakers from them.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::breaker::{BreakerSettings, CircuitBreaker};
use crate::client::telemetry::{ClusterMetrics, MetricsCalculator, Sample, SampleBuffer};
use crate::client::{ClusterClient, Operation};
use crate::clock::{Clock, elapsed_between};
use crate::controller::{Error, Result};
use crate::crd::{AvailabilityPolicy, AvailabilityPolicyStatus};
use crate::health::Metrics;
use crate::policy::ObjectKey;

/// Queue depth between callers and the metrics calculator
const SAMPLE_CHANNEL_CAPACITY: usize = 4096;

#[derive(Clone, Debug, PartialEq)]
pub struct AdaptiveConfig {
    pub base_timeout: Duration,
    pub min_timeout_multiplier: f64,
    pub max_timeout_multiplier: f64,
    pub learning_period: Duration,
    pub adjustment_interval: Duration,
    pub metrics_interval: Duration,
    pub sample_retention: Duration,
    pub max_samples: usize,
    /// Minimum time between two changes of one breaker
    pub cooldown: Duration,
    pub probe_rounds: u32,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(30),
            min_timeout_multiplier: 0.5,
            max_timeout_multiplier: 3.0,
            learning_period: Duration::from_secs(120),
            adjustment_interval: Duration::from_secs(30),
            metrics_interval: Duration::from_secs(10),
            sample_retention: Duration::from_secs(300),
            max_samples: 10_000,
            cooldown: Duration::from_secs(60),
            probe_rounds: 3,
        }
    }
}

impl AdaptiveConfig {
    /// Starting settings for an operation before any adaptation
    pub fn initial_settings(&self, operation: Operation) -> BreakerSettings {
        BreakerSettings {
            timeout: self.base_timeout.mul_f64(operation.timeout_bias()),
            ..BreakerSettings::default()
        }
    }
}

/// Breaker settings the current cluster metrics call for
pub fn recommended_settings(
    metrics: &ClusterMetrics,
    operation: Operation,
    config: &AdaptiveConfig,
) -> BreakerSettings {
    let bias = operation.timeout_bias();
    let base = config.base_timeout.as_secs_f64() * bias;
    let multiplier = if metrics.error_rate > 0.10 { 3.0 } else { 2.5 };
    let timeout = (metrics.p99.as_secs_f64() * multiplier * bias).clamp(
        base * config.min_timeout_multiplier,
        base * config.max_timeout_multiplier,
    );

    let failure_ratio = if metrics.error_rate < 0.05 {
        0.5
    } else if metrics.error_rate < 0.10 {
        0.6
    } else {
        0.7
    };

    let max_requests = if metrics.throughput > 50.0 {
        20
    } else if metrics.throughput > 20.0 {
        10
    } else {
        5
    };

    let consecutive_failures =
        if metrics.error_rate < 0.02 && metrics.p95 < Duration::from_millis(200) {
            3
        } else if metrics.error_rate < 0.05 {
            5
        } else {
            10
        };

    BreakerSettings {
        timeout: Duration::from_secs_f64(timeout),
        failure_ratio,
        max_requests,
        consecutive_failures,
        interval: BreakerSettings::default().interval,
    }
}

/// Timeout moved by more than 20% or the failure ratio by more than 0.1
pub fn is_significant(current: &BreakerSettings, proposed: &BreakerSettings) -> bool {
    let current_timeout = current.timeout.as_secs_f64();
    let timeout_delta = if current_timeout > 0.0 {
        (proposed.timeout.as_secs_f64() - current_timeout).abs() / current_timeout
    } else {
        f64::INFINITY
    };
    timeout_delta > 0.2 || (proposed.failure_ratio - current.failure_ratio).abs() > 0.1
}

/// Whether a proposal may replace the current settings at `now`
pub fn should_apply(
    current: &BreakerSettings,
    proposed: &BreakerSettings,
    last_adjusted: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> bool {
    is_significant(current, proposed)
        && last_adjusted.is_none_or(|at| elapsed_between(at, now) >= cooldown)
}

/// Circuit-breaking [`ClusterClient`] decorator
pub struct AdaptiveClient<C> {
    inner: C,
    config: AdaptiveConfig,
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
    breakers: RwLock<HashMap<Operation, Arc<CircuitBreaker>>>,
    samples: mpsc::Sender<Sample>,
    cluster_metrics: watch::Receiver<ClusterMetrics>,
    calculator: Mutex<Option<MetricsCalculator>>,
    metrics: Option<Arc<Metrics>>,
}

impl<C: ClusterClient> AdaptiveClient<C> {
    pub fn new(inner: C, config: AdaptiveConfig, clock: Arc<dyn Clock>) -> Self {
        let (sample_tx, sample_rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        let (metrics_tx, metrics_rx) = watch::channel(ClusterMetrics::default());
        let calculator = MetricsCalculator {
            buffer: SampleBuffer::new(config.max_samples, config.sample_retention),
            samples: sample_rx,
            output: metrics_tx,
            interval: config.metrics_interval,
            clock: clock.clone(),
        };

        Self {
            inner,
            started_at: clock.now(),
            config,
            clock,
            breakers: RwLock::new(HashMap::new()),
            samples: sample_tx,
            cluster_metrics: metrics_rx,
            calculator: Mutex::new(Some(calculator)),
            metrics: None,
        }
    }

    /// Publish breaker states to the metrics plane
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Breaker of `operation`, created on first use
    pub fn breaker(&self, operation: Operation) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(breaker) = breakers.get(&operation) {
                return breaker.clone();
            }
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(operation)
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    operation,
                    self.config.initial_settings(operation),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    /// Settings of every breaker created so far
    pub fn snapshot(&self) -> BTreeMap<Operation, BreakerSettings> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        breakers
            .iter()
            .map(|(op, breaker)| (*op, breaker.settings()))
            .collect()
    }

    pub fn cluster_metrics(&self) -> ClusterMetrics {
        *self.cluster_metrics.borrow()
    }

    async fn call<T, F>(&self, operation: Operation, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        let breaker = self.breaker(operation);
        let permit = match breaker.before_request() {
            Ok(permit) => permit,
            Err(state) => {
                self.publish_state(&breaker);
                return Err(Error::CircuitOpen { operation, state });
            }
        };

        let timeout = breaker.settings().timeout;
        let started = tokio::time::Instant::now();
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation,
                after: timeout,
            }),
        };
        let duration = started.elapsed();

        let success = match &result {
            Ok(_) => true,
            Err(e) => e.is_not_found() || e.is_conflict(),
        };
        breaker.after_request(permit, success);
        self.publish_state(&breaker);

        let sample = Sample {
            at: self.clock.now(),
            duration,
            success,
            operation,
        };
        // A full queue only costs the calculator one data point
        if self.samples.try_send(sample).is_err() {
            debug!(operation = %operation, "Dropped operation sample");
        }

        result
    }

    fn publish_state(&self, breaker: &CircuitBreaker) {
        if let Some(metrics) = &self.metrics {
            metrics.set_breaker_state(breaker.operation().as_str(), breaker.state());
        }
    }

    /// Retune breakers from `metrics`; returns the operations that changed
    pub fn adjust_with(&self, metrics: &ClusterMetrics, now: DateTime<Utc>) -> Vec<Operation> {
        if elapsed_between(self.started_at, now) < self.config.learning_period {
            return Vec::new();
        }
        if metrics.sample_count == 0 {
            return Vec::new();
        }

        let breakers: Vec<Arc<CircuitBreaker>> = {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            breakers.values().cloned().collect()
        };

        let mut changed = Vec::new();
        for breaker in breakers {
            let operation = breaker.operation();
            let current = breaker.settings();
            let proposed = recommended_settings(metrics, operation, &self.config);
            if !should_apply(
                &current,
                &proposed,
                breaker.last_adjusted(),
                now,
                self.config.cooldown,
            ) {
                continue;
            }
            info!(
                operation = %operation,
                timeout = ?proposed.timeout,
                failure_ratio = proposed.failure_ratio,
                max_requests = proposed.max_requests,
                consecutive_failures = proposed.consecutive_failures,
                "Adjusted circuit breaker settings"
            );
            breaker.apply_settings(proposed, now);
            changed.push(operation);
        }
        changed.sort();
        changed
    }

    /// Retune breakers from the latest calculated metrics
    pub fn adjust(&self, now: DateTime<Utc>) -> Vec<Operation> {
        let metrics = self.cluster_metrics();
        self.adjust_with(&metrics, now)
    }

    /// Seed the sample buffer with a few cheap reads
    pub async fn probe(&self) {
        for _ in 0..self.config.probe_rounds {
            if let Err(e) = self.list_namespaces(Some(1)).await {
                debug!(error = %e, "Probe list of namespaces failed");
            }
            if let Err(e) = self.list_workloads(None, Some(1)).await {
                debug!(error = %e, "Probe list of workloads failed");
            }
            if let Err(e) = self.list_policies(None, Some(1)).await {
                debug!(error = %e, "Probe list of policies failed");
            }
        }
    }
}

impl<C: ClusterClient + 'static> AdaptiveClient<C> {
    /// Start the metrics calculator and the settings adjuster
    pub fn spawn_background(self: &Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let calculator = self
            .calculator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(calculator) = calculator {
            handles.push(tokio::spawn(calculator.run(shutdown.clone())));
        }

        let client = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(client.config.adjustment_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        client.adjust(client.clock.now());
                    }
                }
            }
            debug!("Circuit breaker adjuster stopped");
        }));

        handles
    }
}

#[async_trait]
impl<C: ClusterClient> ClusterClient for AdaptiveClient<C> {
    async fn get_workload(&self, key: &ObjectKey) -> Result<Option<Deployment>> {
        self.call(Operation::Get, self.inner.get_workload(key)).await
    }

    async fn list_workloads(
        &self,
        namespace: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Deployment>> {
        self.call(Operation::List, self.inner.list_workloads(namespace, limit))
            .await
    }

    async fn patch_workload_annotations(
        &self,
        key: &ObjectKey,
        annotations: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.call(
            Operation::Patch,
            self.inner.patch_workload_annotations(key, annotations),
        )
        .await
    }

    async fn get_policy(&self, key: &ObjectKey) -> Result<Option<AvailabilityPolicy>> {
        self.call(Operation::Get, self.inner.get_policy(key)).await
    }

    async fn list_policies(
        &self,
        namespace: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<AvailabilityPolicy>> {
        self.call(Operation::List, self.inner.list_policies(namespace, limit))
            .await
    }

    async fn patch_policy_status(
        &self,
        key: &ObjectKey,
        status: &AvailabilityPolicyStatus,
    ) -> Result<()> {
        self.call(
            Operation::StatusPatch,
            self.inner.patch_policy_status(key, status),
        )
        .await
    }

    async fn set_policy_finalizers(&self, key: &ObjectKey, finalizers: &[String]) -> Result<()> {
        self.call(
            Operation::Patch,
            self.inner.set_policy_finalizers(key, finalizers),
        )
        .await
    }

    async fn get_pdb(&self, key: &ObjectKey) -> Result<Option<PodDisruptionBudget>> {
        self.call(Operation::Get, self.inner.get_pdb(key)).await
    }

    async fn create_pdb(&self, pdb: &PodDisruptionBudget) -> Result<PodDisruptionBudget> {
        self.call(Operation::Create, self.inner.create_pdb(pdb)).await
    }

    async fn update_pdb(&self, pdb: &PodDisruptionBudget) -> Result<PodDisruptionBudget> {
        self.call(Operation::Update, self.inner.update_pdb(pdb)).await
    }

    async fn delete_pdb(&self, key: &ObjectKey) -> Result<()> {
        self.call(Operation::Delete, self.inner.delete_pdb(key)).await
    }

    async fn list_namespaces(&self, limit: Option<u32>) -> Result<Vec<String>> {
        self.call(Operation::List, self.inner.list_namespaces(limit))
            .await
    }
}

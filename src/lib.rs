pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod policy;
pub mod resources;

pub use cache::{CacheConfig, PolicyCache};
pub use client::{AdaptiveClient, AdaptiveConfig, ClusterClient, KubeClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::OperatorConfig;
pub use controller::{
    Context, Error, KubeEventPublisher, Result, WorkloadQueue, error_policy, policy_error_policy,
    reconcile, reconcile_policy,
};
pub use crd::AvailabilityPolicy;
pub use health::{HealthState, Metrics};
pub use policy::{Decision, DecisionEngine, ObjectKey};

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::runtime::Controller;
use kube::runtime::controller::{Action, Config as ControllerConfig, Error as ControllerError};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn log_result<K, E>(
    controller_name: &str,
    result: std::result::Result<(ObjectRef<K>, Action), ControllerError<Error, E>>,
)
where
    K: Resource,
    E: std::error::Error,
{
    match result {
        Ok((obj, _action)) => {
            tracing::debug!("Reconciled {}: {}", controller_name, obj.name);
        }
        Err(e) => {
            // Watch events for objects deleted a moment ago land here
            let is_not_found = matches!(
                &e,
                ControllerError::ReconcilerFailed(err, _) if err.is_not_found()
            );
            if is_not_found {
                tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
            } else {
                tracing::error!("{} reconciliation error: {:?}", controller_name, e);
            }
        }
    }
}

/// Run the workload controller until `shutdown` is cancelled.
///
/// Watches Deployments and their owned PodDisruptionBudgets. Keys sent
/// through the [`WorkloadQueue`] paired with `queue` (policy fan-out) are
/// reconciled alongside watch events.
pub async fn run_workload_controller(
    client: Client,
    ctx: Arc<Context>,
    queue: mpsc::UnboundedReceiver<ObjectKey>,
    shutdown: CancellationToken,
) {
    let namespace = ctx.config.watch_namespace.clone();
    let scope_msg = namespace.as_deref().unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for Deployment resources (scope: {})",
        scope_msg
    );

    let workloads: Api<Deployment> = scoped_api(client.clone(), namespace.as_deref());
    let pdbs: Api<PodDisruptionBudget> = scoped_api(client, namespace.as_deref());
    let watcher_config = WatcherConfig::default().any_semantic();
    let concurrency = ctx.config.max_concurrent_reconciles;

    let fan_out = futures::stream::unfold(queue, |mut rx| async move {
        rx.recv()
            .await
            .map(|key| (ObjectRef::<Deployment>::new(&key.name).within(&key.namespace), rx))
    });

    Controller::new(workloads, watcher_config.clone())
        .owns(pdbs, watcher_config)
        .reconcile_on(fan_out)
        .with_config(ControllerConfig::default().concurrency(concurrency))
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move { log_result("workload", result) })
        .await;

    tracing::info!("Workload controller stopped");
}

/// Run the AvailabilityPolicy controller until `shutdown` is cancelled.
pub async fn run_policy_controller(client: Client, ctx: Arc<Context>, shutdown: CancellationToken) {
    let namespace = ctx.config.watch_namespace.clone();
    let scope_msg = namespace.as_deref().unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for AvailabilityPolicy resources (scope: {})",
        scope_msg
    );

    let policies: Api<AvailabilityPolicy> = scoped_api(client, namespace.as_deref());
    let watcher_config = WatcherConfig::default().any_semantic();
    let concurrency = ctx.config.max_concurrent_reconciles;

    Controller::new(policies, watcher_config)
        .with_config(ControllerConfig::default().concurrency(concurrency))
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile_policy, policy_error_policy, ctx)
        .for_each(|result| async move { log_result("policy", result) })
        .await;

    tracing::info!("Policy controller stopped");
}

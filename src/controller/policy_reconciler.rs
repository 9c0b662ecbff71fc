//! Policy reconciler
//!
//! Never writes PDBs. A policy change is translated into workload
//! reconciliations for every workload whose outcome may have moved, plus
//! cache invalidation and the policy's own status.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use crate::controller::Context;
use crate::controller::error::{Error, Result};
use crate::controller::status::{PolicyStatusBuilder, policy_status_changed, spec_changed};
use crate::controller::workload_reconciler::namespace_policies;
use crate::crd::AvailabilityPolicy;
use crate::policy::{LabelIndex, ObjectKey, WorkloadSnapshot};

/// Keeps deleted policies around until their workloads were enqueued
pub const POLICY_FINALIZER: &str = "availability.example.com/policy-fanout";

/// Controller name used in metrics
pub const POLICY_CONTROLLER: &str = "policy";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicySyncReport {
    /// Workloads matched by the policy now
    pub matched: BTreeSet<ObjectKey>,
    /// Workloads handed to the workload reconciler
    pub enqueued: BTreeSet<ObjectKey>,
    pub cache_invalidated: bool,
    /// The policy finished deleting and its finalizer was released
    pub released: bool,
}

fn has_finalizer(policy: &AvailabilityPolicy) -> bool {
    policy.finalizers().iter().any(|f| f == POLICY_FINALIZER)
}

/// Workloads recorded as matched at the last evaluation
fn previous_matches(policy: &AvailabilityPolicy, namespace: &str) -> BTreeSet<ObjectKey> {
    policy
        .status
        .as_ref()
        .map(|s| {
            s.matched_workloads
                .iter()
                .map(|name| ObjectKey::new(namespace, name.as_str()))
                .collect()
        })
        .unwrap_or_default()
}

/// Workloads of the policy's namespace currently selected by it
async fn current_matches(
    ctx: &Context,
    policy: &AvailabilityPolicy,
    namespace: &str,
) -> Result<(BTreeSet<ObjectKey>, Vec<WorkloadSnapshot>)> {
    let workloads = ctx.client.list_workloads(Some(namespace), None).await?;
    let snapshots: Vec<WorkloadSnapshot> = workloads
        .iter()
        .filter_map(WorkloadSnapshot::from_deployment)
        .collect();
    let index = LabelIndex::build(
        snapshots
            .iter()
            .map(|s| (s.key.clone(), s.labels.clone())),
    );
    let matched = index.select(&policy.spec.component_selector);
    let snapshots = snapshots
        .into_iter()
        .filter(|s| matched.contains(&s.key))
        .collect();
    Ok((matched, snapshots))
}

fn enqueue_all(ctx: &Context, keys: &BTreeSet<ObjectKey>) {
    for key in keys {
        if !ctx.queue.enqueue(key.clone()) {
            warn!(workload = %key, "Workload queue closed, dropping fan-out");
            return;
        }
    }
}

/// One pass over a policy: finalizer, fan-out, cache and status
#[instrument(skip(ctx, policy), fields(namespace = policy.namespace().unwrap_or_default(), name = %policy.name_any()))]
pub async fn sync_policy(ctx: &Context, policy: &AvailabilityPolicy) -> Result<PolicySyncReport> {
    let key = ObjectKey::of(policy).ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let namespace = key.namespace.clone();
    let previous = previous_matches(policy, &namespace);

    if policy.meta().deletion_timestamp.is_some() {
        if !has_finalizer(policy) {
            return Ok(PolicySyncReport::default());
        }
        let (current, _) = current_matches(ctx, policy, &namespace).await?;
        let targets: BTreeSet<ObjectKey> = previous.union(&current).cloned().collect();

        ctx.cache.invalidate_policy(&key).await;
        enqueue_all(ctx, &targets);
        info!(workloads = targets.len(), "Policy deleted, re-evaluating its workloads");

        let remaining: Vec<String> = policy
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != POLICY_FINALIZER)
            .cloned()
            .collect();
        match ctx.client.set_policy_finalizers(&key, &remaining).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        return Ok(PolicySyncReport {
            matched: current,
            enqueued: targets,
            cache_invalidated: true,
            released: true,
        });
    }

    if !has_finalizer(policy) {
        let mut finalizers = policy.finalizers().to_vec();
        finalizers.push(POLICY_FINALIZER.to_string());
        ctx.client.set_policy_finalizers(&key, &finalizers).await?;
        debug!("Added finalizer");
    }

    let (current, snapshots) = current_matches(ctx, policy, &namespace).await?;
    let changed_spec = spec_changed(policy);
    let mut targets: BTreeSet<ObjectKey> =
        previous.symmetric_difference(&current).cloned().collect();
    if changed_spec {
        targets.extend(current.iter().cloned());
    }

    let cache_invalidated = changed_spec || previous != current;
    if cache_invalidated {
        ctx.cache.invalidate_policy(&key).await;
        info!(
            matched = current.len(),
            enqueued = targets.len(),
            "Policy changed, fanning out"
        );
    }
    enqueue_all(ctx, &targets);

    let policies = namespace_policies(ctx, &namespace).await?;
    let now = ctx.clock.now();
    let decisions: Vec<_> = snapshots
        .iter()
        .map(|snapshot| ctx.engine.decide(snapshot, &policies, now))
        .collect();
    let status = PolicyStatusBuilder::new(policy.metadata.generation, now)
        .matched(current.iter().map(|k| k.name.clone()))
        .summary(&decisions)
        .build();
    if policy_status_changed(policy.status.as_ref(), &status) {
        match ctx.client.patch_policy_status(&key, &status).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() || e.is_conflict() => {
                debug!(error = %e, "Skipping policy status");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(PolicySyncReport {
        matched: current,
        enqueued: targets,
        cache_invalidated,
        released: false,
    })
}

/// Controller entry point for AvailabilityPolicies
pub async fn reconcile_policy(policy: Arc<AvailabilityPolicy>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let report = sync_policy(&ctx, &policy).await?;
    if let Some(key) = ObjectKey::of(policy.as_ref()) {
        ctx.reset_errors(POLICY_CONTROLLER, &key);
    }
    ctx.metrics
        .record_reconcile(POLICY_CONTROLLER, start.elapsed().as_secs_f64());
    if report.released {
        return Ok(Action::await_change());
    }
    Ok(Action::requeue(ctx.config.resync_interval))
}

pub fn policy_error_policy(
    policy: Arc<AvailabilityPolicy>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    ctx.metrics.record_error(POLICY_CONTROLLER);
    let Some(key) = ObjectKey::of(policy.as_ref()) else {
        return Action::requeue(ctx.backoff.max_delay);
    };
    let delay = ctx.record_error(POLICY_CONTROLLER, &key, error);
    warn!(policy = %key, error = %error, "Policy reconciliation failed, requeuing in {:?}", delay);
    Action::requeue(delay)
}

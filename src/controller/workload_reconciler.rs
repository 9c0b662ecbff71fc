//! Workload reconciler
//!
//! Drives one workload's PodDisruptionBudget towards the decision engine's
//! output. The reconciler is the only writer of PDBs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use crate::cache::ListScope;
use crate::controller::Context;
use crate::controller::error::{Error, Result};
use crate::controller::events::{DecisionEvent, EventReason, decision_events};
use crate::controller::status::WorkloadStatus;
use crate::crd::AvailabilityPolicy;
use crate::policy::{Decision, Diagnostic, MaintenanceGate, ObjectKey, WorkloadSnapshot};
use crate::resources::common::{is_owned, pdb_name};
use crate::resources::pdb::{desired_pdb, merge_update, needs_update};

/// Controller name used in metrics
pub const WORKLOAD_CONTROLLER: &str = "workload";

/// What a reconciliation did to the workload's PDB
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PdbAction {
    Created,
    Updated,
    Deleted,
    Unchanged,
    /// A PDB of the same name lacks the ownership marker
    Conflict,
    /// The write lost an optimistic-concurrency race or its target vanished;
    /// the watch event that caused it triggers the next pass
    Deferred,
}

impl PdbAction {
    fn operation(&self) -> Option<&'static str> {
        match self {
            PdbAction::Created => Some("create"),
            PdbAction::Updated => Some("update"),
            PdbAction::Deleted => Some("delete"),
            _ => None,
        }
    }

    fn event_reason(&self) -> Option<EventReason> {
        match self {
            PdbAction::Created => Some(EventReason::PdbCreated),
            PdbAction::Updated => Some(EventReason::PdbUpdated),
            PdbAction::Deleted => Some(EventReason::PdbDeleted),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReconcileReport {
    pub action: PdbAction,
    /// `None` when the workload no longer exists
    pub decision: Option<Decision>,
    pub requeue_after: Duration,
}

/// Policies of `namespace`, through the cache
pub async fn namespace_policies(ctx: &Context, namespace: &str) -> Result<Vec<AvailabilityPolicy>> {
    let scope = ListScope::Namespace(namespace.to_string());
    if let Some(policies) = ctx.cache.get_list(&scope).await {
        return Ok(policies);
    }
    // An invalidation during the fetch means the list may predate it
    let epoch = ctx.cache.epoch();
    let policies = ctx.client.list_policies(Some(namespace), None).await?;
    ctx.cache
        .set_list_if_current(scope, policies.clone(), epoch)
        .await;
    Ok(policies)
}

/// One reconciliation pass for the workload at `key`
#[instrument(skip(ctx), fields(namespace = %key.namespace, name = %key.name))]
pub async fn reconcile_workload(ctx: &Context, key: &ObjectKey) -> Result<ReconcileReport> {
    let Some(workload) = ctx.client.get_workload(key).await? else {
        return cleanup_deleted(ctx, key).await;
    };
    if workload.meta().deletion_timestamp.is_some() {
        // The PDB is garbage collected with its owner
        debug!("Workload is being deleted, skipping");
        return Ok(ReconcileReport {
            action: PdbAction::Unchanged,
            decision: None,
            requeue_after: ctx.config.resync_interval,
        });
    }

    let snapshot = WorkloadSnapshot::from_deployment(&workload)
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let policies = namespace_policies(ctx, &key.namespace).await?;

    let gate = match ctx.cache.get_maintenance(key).await {
        Some(false) => MaintenanceGate::KnownInactive,
        _ => MaintenanceGate::Evaluate,
    };
    let now = ctx.clock.now();
    let decision = ctx.engine.decide_with(&snapshot, &policies, now, gate);
    if gate == MaintenanceGate::Evaluate {
        ctx.cache
            .set_maintenance(key.clone(), decision.is_relaxed())
            .await;
    }

    let previous = WorkloadStatus::from_annotations(workload.annotations());
    let fingerprint = decision.fingerprint();
    let decision_changed = previous.decision_hash.as_deref() != Some(fingerprint.as_str());
    if decision_changed {
        info!(decision = %decision.summary(), hash = %fingerprint, "Decision changed");
    }

    let desired = desired_pdb(&workload, &decision)?;
    let pdb_key = ObjectKey::new(&key.namespace, pdb_name(&key.name));
    let existing = ctx.client.get_pdb(&pdb_key).await?;

    let action = apply_pdb(ctx, &workload, key, &pdb_key, desired, existing).await?;
    if let Some(operation) = action.operation() {
        ctx.metrics.record_pdb_operation(operation);
    }
    if let Some(reason) = action.event_reason() {
        let note = format!("{} for {}: {}", pdb_key.name, key.name, decision.summary());
        publish(ctx, &workload, DecisionEvent::new(reason, note)).await;
    }

    let compliant = action != PdbAction::Conflict;
    ctx.metrics
        .set_compliance(&key.namespace, &key.name, compliant);
    ctx.metrics
        .set_maintenance_active(&key.namespace, &key.name, decision.is_relaxed());

    if action != PdbAction::Deferred {
        let next = WorkloadStatus::for_decision(&decision, workload.metadata.generation, compliant, now);
        let noteworthy = decision.protection().is_some() || !decision.diagnostics.is_empty();
        write_status(ctx, key, &previous, &next, noteworthy).await?;
        // A failed or deferred pass keeps the old hash, so the retry reports
        if decision_changed {
            record_decision(ctx, &workload, &decision).await;
        }
    }

    let requeue_after = if decision.has_windows {
        ctx.config.maintenance_ttl
    } else {
        ctx.config.resync_interval
    };
    Ok(ReconcileReport {
        action,
        decision: Some(decision),
        requeue_after,
    })
}

/// Walk the branch table between desired and existing PDB
async fn apply_pdb(
    ctx: &Context,
    owner: &Deployment,
    workload: &ObjectKey,
    pdb_key: &ObjectKey,
    desired: Option<PodDisruptionBudget>,
    existing: Option<PodDisruptionBudget>,
) -> Result<PdbAction> {
    match (desired, existing) {
        (None, None) => Ok(PdbAction::Unchanged),
        (Some(desired), None) => match ctx.client.create_pdb(&desired).await {
            Ok(_) => {
                info!(pdb = %pdb_key, "Created PodDisruptionBudget");
                Ok(PdbAction::Created)
            }
            Err(e) if e.is_already_exists() => {
                debug!(pdb = %pdb_key, "PodDisruptionBudget appeared concurrently");
                Ok(PdbAction::Deferred)
            }
            Err(e) => Err(e),
        },
        (None, Some(existing)) if is_owned(&existing) => {
            match ctx.client.delete_pdb(pdb_key).await {
                Ok(()) => {
                    info!(pdb = %pdb_key, "Deleted PodDisruptionBudget");
                    Ok(PdbAction::Deleted)
                }
                Err(e) if e.is_not_found() => Ok(PdbAction::Unchanged),
                Err(e) => Err(e),
            }
        }
        // Someone else's PDB and nothing to protect: not ours to judge
        (None, Some(_)) => Ok(PdbAction::Unchanged),
        (Some(_), Some(existing)) if !is_owned(&existing) => {
            let version = existing.resource_version().unwrap_or_default();
            // Reported once per foreign resourceVersion
            if ctx.note_conflict(workload, &version) {
                warn!(pdb = %pdb_key, resource_version = %version, "PodDisruptionBudget is not owned by the operator");
                ctx.metrics.record_conflict(&workload.namespace);
                let note = format!(
                    "PodDisruptionBudget {} exists without the operator's ownership marker; leaving it untouched",
                    pdb_key.name
                );
                publish(ctx, owner, DecisionEvent::new(EventReason::PdbConflict, note)).await;
            }
            Ok(PdbAction::Conflict)
        }
        (Some(desired), Some(existing)) => {
            ctx.clear_conflict(workload);
            if !needs_update(&existing, &desired) {
                return Ok(PdbAction::Unchanged);
            }
            let updated = merge_update(&existing, &desired);
            match ctx.client.update_pdb(&updated).await {
                Ok(_) => {
                    info!(pdb = %pdb_key, "Updated PodDisruptionBudget");
                    Ok(PdbAction::Updated)
                }
                Err(e) if e.is_conflict() || e.is_not_found() => {
                    debug!(pdb = %pdb_key, error = %e, "PodDisruptionBudget changed underneath, deferring");
                    Ok(PdbAction::Deferred)
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Cleanup path for a workload that is gone
async fn cleanup_deleted(ctx: &Context, key: &ObjectKey) -> Result<ReconcileReport> {
    let pdb_key = ObjectKey::new(&key.namespace, pdb_name(&key.name));
    let mut action = PdbAction::Unchanged;
    if let Some(existing) = ctx.client.get_pdb(&pdb_key).await? {
        if is_owned(&existing) {
            match ctx.client.delete_pdb(&pdb_key).await {
                Ok(()) => {
                    info!(pdb = %pdb_key, "Deleted PodDisruptionBudget of removed workload");
                    ctx.metrics.record_pdb_operation("delete");
                    action = PdbAction::Deleted;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
    }

    ctx.cache.invalidate_workload(key).await;
    ctx.clear_conflict(key);
    ctx.metrics.forget_workload(&key.namespace, &key.name);
    Ok(ReconcileReport {
        action,
        decision: None,
        requeue_after: ctx.config.resync_interval,
    })
}

/// Metrics and events derived from a changed decision
async fn record_decision(ctx: &Context, workload: &Deployment, decision: &Decision) {
    if let Some(protection) = decision.protection() {
        ctx.metrics
            .record_decision(protection.class.as_str(), protection.mode.as_str());
    }
    for diagnostic in &decision.diagnostics {
        match diagnostic {
            Diagnostic::OverrideRejected { mode, .. } => {
                ctx.metrics.record_override_rejection(mode.as_str());
            }
            Diagnostic::ClassDowngraded { from, to, .. } => {
                ctx.metrics.record_class_downgrade(from.as_str(), to.as_str());
            }
            Diagnostic::InvalidOverride { .. } | Diagnostic::InvalidWindow { .. } => {}
        }
        warn!(diagnostic = %diagnostic.message(), "Decision diagnostic");
    }
    for event in decision_events(decision) {
        publish(ctx, workload, event).await;
    }
}

async fn publish(ctx: &Context, workload: &Deployment, event: DecisionEvent) {
    let reference = workload.object_ref(&());
    ctx.events.publish(&reference, event).await;
}

/// Patch the status annotations when they changed
///
/// Workloads that never had a protective or diagnosed decision are left
/// unannotated.
async fn write_status(
    ctx: &Context,
    key: &ObjectKey,
    previous: &WorkloadStatus,
    next: &WorkloadStatus,
    noteworthy: bool,
) -> Result<()> {
    if !(noteworthy || previous.is_recorded()) || !previous.needs_patch(next) {
        return Ok(());
    }
    match ctx
        .client
        .patch_workload_annotations(key, &next.to_annotations())
        .await
    {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() || e.is_conflict() => {
            debug!(error = %e, "Skipping status annotations");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Controller entry point for Deployments
pub async fn reconcile(workload: Arc<Deployment>, ctx: Arc<Context>) -> Result<Action> {
    let key = ObjectKey::of(workload.as_ref()).ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let start = Instant::now();
    let report = reconcile_workload(&ctx, &key).await?;
    ctx.reset_errors(WORKLOAD_CONTROLLER, &key);
    ctx.metrics
        .record_reconcile(WORKLOAD_CONTROLLER, start.elapsed().as_secs_f64());
    debug!(workload = %key, action = ?report.action, requeue_after = ?report.requeue_after, "Reconciled workload");
    Ok(Action::requeue(report.requeue_after))
}

/// Requeue failed workloads with exponential backoff
pub fn error_policy(workload: Arc<Deployment>, error: &Error, ctx: Arc<Context>) -> Action {
    ctx.metrics.record_error(WORKLOAD_CONTROLLER);
    let Some(key) = ObjectKey::of(workload.as_ref()) else {
        return Action::requeue(ctx.backoff.max_delay);
    };
    let delay = ctx.record_error(WORKLOAD_CONTROLLER, &key, error);
    if error.is_retryable() {
        warn!(workload = %key, error = %error, "Retryable error, requeuing in {:?}", delay);
    } else {
        tracing::error!(workload = %key, error = %error, "Non-retryable error, requeuing in {:?}", delay);
    }
    Action::requeue(delay)
}

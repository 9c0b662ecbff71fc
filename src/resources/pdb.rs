//! PodDisruptionBudget generation from decisions
//!
//! The desired PDB mirrors the workload's pod selector and carries exactly
//! one disruption parameter. Decision metadata is recorded as annotations so
//! the PDB alone tells which decision produced it.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::controller::{Error, Result};
use crate::policy::Decision;
use crate::resources::common::{owner_reference, pdb_name, standard_labels};

pub const DECISION_HASH_ANNOTATION: &str = "availability.example.com/decision-hash";
pub const CLASS_ANNOTATION: &str = "availability.example.com/class";
pub const ENFORCEMENT_MODE_ANNOTATION: &str = "availability.example.com/enforcement-mode";
pub const SOURCES_ANNOTATION: &str = "availability.example.com/sources";
pub const RELAXED_ANNOTATION: &str = "availability.example.com/relaxed";
pub const ACTIVE_WINDOW_ANNOTATION: &str = "availability.example.com/active-window";

/// Annotations owned by the operator on its PDBs
const DECISION_ANNOTATIONS: [&str; 6] = [
    DECISION_HASH_ANNOTATION,
    CLASS_ANNOTATION,
    ENFORCEMENT_MODE_ANNOTATION,
    SOURCES_ANNOTATION,
    RELAXED_ANNOTATION,
    ACTIVE_WINDOW_ANNOTATION,
];

/// The PDB a decision calls for, `None` when the workload gets none
pub fn desired_pdb(workload: &Deployment, decision: &Decision) -> Result<Option<PodDisruptionBudget>> {
    let Some(protection) = decision.protection() else {
        return Ok(None);
    };

    let name = workload.name_any();
    let namespace = workload
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let selector = workload
        .spec
        .as_ref()
        .map(|spec| spec.selector.clone())
        .ok_or(Error::MissingObjectKey(".spec.selector"))?;

    let mut annotations = BTreeMap::from([
        (DECISION_HASH_ANNOTATION.to_string(), decision.fingerprint()),
        (CLASS_ANNOTATION.to_string(), protection.class.to_string()),
        (
            ENFORCEMENT_MODE_ANNOTATION.to_string(),
            protection.mode.to_string(),
        ),
        (
            SOURCES_ANNOTATION.to_string(),
            protection
                .sources
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        ),
        (RELAXED_ANNOTATION.to_string(), protection.relaxed.to_string()),
    ]);
    if let Some(window) = &protection.active_window {
        annotations.insert(ACTIVE_WINDOW_ANNOTATION.to_string(), window.clone());
    }

    let (min_available, max_unavailable) = protection.parameter.to_pdb_fields();

    Ok(Some(PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(pdb_name(&name)),
            namespace: Some(namespace),
            labels: Some(standard_labels(&name)),
            annotations: Some(annotations),
            owner_references: Some(vec![owner_reference(workload)]),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            min_available,
            max_unavailable,
            selector: Some(selector),
            // Use IfHealthyBudget to allow eviction if pod is unhealthy
            unhealthy_pod_eviction_policy: Some("IfHealthyBudget".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }))
}

fn annotation<'a>(pdb: &'a PodDisruptionBudget, key: &str) -> Option<&'a str> {
    pdb.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

/// Whether the semantic content of `existing` diverges from `desired`
///
/// Compares the selector, the disruption parameter, the class marker and
/// the relaxed flag. Bookkeeping annotations alone never force a write.
pub fn needs_update(existing: &PodDisruptionBudget, desired: &PodDisruptionBudget) -> bool {
    let spec_of = |pdb: &PodDisruptionBudget| {
        pdb.spec
            .as_ref()
            .map(|s| (s.selector.clone(), s.min_available.clone(), s.max_unavailable.clone()))
    };

    spec_of(existing) != spec_of(desired)
        || annotation(existing, CLASS_ANNOTATION) != annotation(desired, CLASS_ANNOTATION)
        || annotation(existing, RELAXED_ANNOTATION) != annotation(desired, RELAXED_ANNOTATION)
}

/// `existing` rewritten to the desired content
///
/// Keeps the existing metadata (resourceVersion, foreign labels and
/// annotations) so the replace is guarded by optimistic concurrency.
pub fn merge_update(existing: &PodDisruptionBudget, desired: &PodDisruptionBudget) -> PodDisruptionBudget {
    let mut updated = existing.clone();

    let labels = updated.metadata.labels.get_or_insert_with(BTreeMap::new);
    labels.extend(desired.labels().clone());

    let annotations = updated.metadata.annotations.get_or_insert_with(BTreeMap::new);
    for key in DECISION_ANNOTATIONS {
        annotations.remove(key);
    }
    annotations.extend(desired.annotations().clone());

    updated.metadata.owner_references = desired.metadata.owner_references.clone();

    let spec = updated.spec.get_or_insert_with(PodDisruptionBudgetSpec::default);
    if let Some(desired_spec) = &desired.spec {
        spec.selector = desired_spec.selector.clone();
        spec.min_available = desired_spec.min_available.clone();
        spec.max_unavailable = desired_spec.max_unavailable.clone();
        spec.unhealthy_pod_eviction_policy = desired_spec.unhealthy_pod_eviction_policy.clone();
    }

    updated.status = None;
    updated
}

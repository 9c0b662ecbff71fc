//! Status bookkeeping for workloads and AvailabilityPolicies
//!
//! Workloads have no status subresource the operator may write, so the last
//! decision is summarised in annotations. Policies carry a regular status.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::crd::{AvailabilityPolicy, AvailabilityPolicyStatus};
use crate::policy::{Decision, Outcome};

/// Workload status annotation keys
pub mod annotation_keys {
    pub const OBSERVED_GENERATION: &str = "availability.example.com/observed-generation";
    pub const DECISION_HASH: &str = "availability.example.com/decision-hash";
    pub const LAST_DECISION: &str = "availability.example.com/last-decision";
    pub const LAST_DECISION_TIME: &str = "availability.example.com/last-decision-time";
    pub const COMPLIANT: &str = "availability.example.com/compliant";
}

use annotation_keys::*;

/// Last decision recorded on a workload
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkloadStatus {
    pub observed_generation: Option<i64>,
    pub decision_hash: Option<String>,
    pub last_decision: Option<String>,
    pub last_decision_time: Option<String>,
    pub compliant: Option<bool>,
}

impl WorkloadStatus {
    /// Read the recorded status; unparsable values read as absent
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        Self {
            observed_generation: annotations
                .get(OBSERVED_GENERATION)
                .and_then(|v| v.parse().ok()),
            decision_hash: annotations.get(DECISION_HASH).cloned(),
            last_decision: annotations.get(LAST_DECISION).cloned(),
            last_decision_time: annotations.get(LAST_DECISION_TIME).cloned(),
            compliant: annotations.get(COMPLIANT).and_then(|v| v.parse().ok()),
        }
    }

    pub fn for_decision(
        decision: &Decision,
        generation: Option<i64>,
        compliant: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            observed_generation: generation,
            decision_hash: Some(decision.fingerprint()),
            last_decision: Some(decision.summary()),
            last_decision_time: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
            compliant: Some(compliant),
        }
    }

    pub fn to_annotations(&self) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::new();
        if let Some(generation) = self.observed_generation {
            annotations.insert(OBSERVED_GENERATION.to_string(), generation.to_string());
        }
        let strings = [
            (DECISION_HASH, &self.decision_hash),
            (LAST_DECISION, &self.last_decision),
            (LAST_DECISION_TIME, &self.last_decision_time),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                annotations.insert(key.to_string(), value.clone());
            }
        }
        if let Some(compliant) = self.compliant {
            annotations.insert(COMPLIANT.to_string(), compliant.to_string());
        }
        annotations
    }

    /// Whether a status was ever written to the workload
    pub fn is_recorded(&self) -> bool {
        self.decision_hash.is_some()
    }

    /// Whether `next` must be written over `self`
    ///
    /// The timestamp and summary follow the hash and never force a write.
    pub fn needs_patch(&self, next: &WorkloadStatus) -> bool {
        self.decision_hash != next.decision_hash
            || self.observed_generation != next.observed_generation
            || self.compliant != next.compliant
    }
}

/// Check if the policy spec has changed since it was last evaluated
pub fn spec_changed(policy: &AvailabilityPolicy) -> bool {
    let current_generation = policy.metadata.generation;
    let observed_generation = policy.status.as_ref().and_then(|s| s.observed_generation);

    match (current_generation, observed_generation) {
        (Some(current), Some(observed)) => current != observed,
        (Some(_), None) => true, // Never observed
        _ => true,
    }
}

/// One-line summary over the decisions of a policy's matched workloads
pub fn decision_summary(decisions: &[Decision]) -> String {
    if decisions.is_empty() {
        return "no matching workloads".to_string();
    }
    let mut protected = 0;
    let mut relaxed = 0;
    let mut skipped = 0;
    for decision in decisions {
        match &decision.outcome {
            Outcome::Protect(p) if p.relaxed => relaxed += 1,
            Outcome::Protect(_) => protected += 1,
            Outcome::NoPdb { .. } => skipped += 1,
        }
    }
    format!(
        "{} matched: {} protected, {} relaxed, {} without PDB",
        decisions.len(),
        protected,
        relaxed,
        skipped
    )
}

/// Builder for the AvailabilityPolicy status
pub struct PolicyStatusBuilder {
    status: AvailabilityPolicyStatus,
}

impl PolicyStatusBuilder {
    pub fn new(generation: Option<i64>, now: DateTime<Utc>) -> Self {
        Self {
            status: AvailabilityPolicyStatus {
                observed_generation: generation,
                last_evaluation: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ..Default::default()
            },
        }
    }

    /// Matched workload names, stored sorted
    pub fn matched<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        self.status.matched_workloads = names;
        self
    }

    pub fn summary(mut self, decisions: &[Decision]) -> Self {
        self.status.last_decision = Some(decision_summary(decisions));
        self
    }

    pub fn build(self) -> AvailabilityPolicyStatus {
        self.status
    }
}

/// Whether `next` differs from `current` in anything but the evaluation time
pub fn policy_status_changed(
    current: Option<&AvailabilityPolicyStatus>,
    next: &AvailabilityPolicyStatus,
) -> bool {
    let Some(current) = current else {
        return true;
    };
    current.observed_generation != next.observed_generation
        || current.last_decision != next.last_decision
        || current.matched_workloads != next.matched_workloads
}

//! Decision engine
//!
//! Resolves the availability class and the single disruption parameter for
//! one workload from its annotations and the AvailabilityPolicies of its
//! namespace. The engine never fails: policy absence yields a "no PDB"
//! decision and malformed input is reported as a [`Diagnostic`] while the
//! decision falls back to class defaults.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::crd::{AvailabilityClass, AvailabilityPolicy, EnforcementMode, MaintenanceWindow};
use crate::policy::ObjectKey;
use crate::policy::annotations::{self, WorkloadAnnotations, short_key};
use crate::policy::disruption::{
    DisruptionParameter, DisruptionValue, InvalidDisruptionValue, class_default,
    class_min_replicas,
};
use crate::policy::window::{self, window_label};

/// The parts of a workload the engine looks at
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadSnapshot {
    pub key: ObjectKey,
    pub replicas: i32,
    pub generation: Option<i64>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl WorkloadSnapshot {
    /// Snapshot a Deployment; `None` when it has no namespace
    pub fn from_deployment(deployment: &Deployment) -> Option<Self> {
        Some(Self {
            key: ObjectKey::of(deployment)?,
            // The API server defaults an unset replica count to 1
            replicas: deployment
                .spec
                .as_ref()
                .and_then(|s| s.replicas)
                .unwrap_or(1),
            generation: deployment.metadata.generation,
            labels: deployment.labels().clone(),
            annotations: deployment.annotations().clone(),
        })
    }
}

/// Where a part of the decision came from
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DecisionSource {
    Policy { namespace: String, name: String },
    Annotation { key: String },
    ClassDefault { class: AvailabilityClass },
    MaintenanceWindow { window: String },
}

impl DecisionSource {
    fn policy(key: &ObjectKey) -> Self {
        DecisionSource::Policy {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
        }
    }
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionSource::Policy { namespace, name } => write!(f, "policy:{}/{}", namespace, name),
            DecisionSource::Annotation { key } => write!(f, "annotation:{}", key),
            DecisionSource::ClassDefault { class } => write!(f, "default:{}", class),
            DecisionSource::MaintenanceWindow { window } => write!(f, "window:{}", window),
        }
    }
}

/// Non-fatal findings recorded while deciding
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Diagnostic {
    OverrideRejected {
        annotation: String,
        mode: EnforcementMode,
        reason: String,
    },
    ClassDowngraded {
        from: AvailabilityClass,
        to: AvailabilityClass,
        replicas: i32,
    },
    InvalidOverride {
        source: String,
        value: String,
        reason: String,
    },
    InvalidWindow {
        window: String,
        reason: String,
    },
}

impl Diagnostic {
    pub fn message(&self) -> String {
        match self {
            Diagnostic::OverrideRejected {
                annotation,
                mode,
                reason,
            } => format!("annotation {} rejected under {} enforcement: {}", annotation, mode, reason),
            Diagnostic::ClassDowngraded { from, to, replicas } => format!(
                "class {} downgraded to {}: workload has {} replica(s)",
                from, to, replicas
            ),
            Diagnostic::InvalidOverride {
                source,
                value,
                reason,
            } => format!("invalid override '{}' from {}: {}", value, source, reason),
            Diagnostic::InvalidWindow { window, reason } => {
                format!("maintenance window {} ignored: {}", window, reason)
            }
        }
    }
}

/// Why a workload gets no PDB
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum SkipReason {
    OptedOut,
    ZeroReplicas,
    NoMatchingPolicy,
    BelowMinimumReplicas {
        class: AvailabilityClass,
        replicas: i32,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OptedOut => f.write_str("opted out"),
            SkipReason::ZeroReplicas => f.write_str("zero replicas"),
            SkipReason::NoMatchingPolicy => f.write_str("no matching policy"),
            SkipReason::BelowMinimumReplicas { class, replicas } => write!(
                f,
                "{} needs at least {} replicas, have {}",
                class,
                class_min_replicas(*class),
                replicas
            ),
        }
    }
}

/// Protection the workload should get
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Protection {
    pub class: AvailabilityClass,
    pub parameter: DisruptionParameter,
    pub mode: EnforcementMode,
    pub sources: Vec<DecisionSource>,
    pub relaxed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_window: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Outcome {
    NoPdb { reason: SkipReason },
    Protect(Protection),
}

/// The engine's output for one workload at one instant
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub workload: ObjectKey,
    pub outcome: Outcome,
    pub diagnostics: Vec<Diagnostic>,
    /// Valid maintenance windows apply to the workload, active or not
    #[serde(skip)]
    pub has_windows: bool,
}

impl Decision {
    fn skip(workload: &WorkloadSnapshot, reason: SkipReason, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            workload: workload.key.clone(),
            outcome: Outcome::NoPdb { reason },
            diagnostics,
            has_windows: false,
        }
    }

    pub fn protection(&self) -> Option<&Protection> {
        match &self.outcome {
            Outcome::Protect(protection) => Some(protection),
            Outcome::NoPdb { .. } => None,
        }
    }

    pub fn is_relaxed(&self) -> bool {
        self.protection().is_some_and(|p| p.relaxed)
    }

    /// Stable short hash of the whole decision
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        let hex = format!("{:x}", digest);
        hex[..16].to_string()
    }

    /// One-line description used in status fields and events
    pub fn summary(&self) -> String {
        match &self.outcome {
            Outcome::Protect(p) => match &p.active_window {
                Some(window) => format!(
                    "{} {} ({}, relaxed by window {})",
                    p.class, p.parameter, p.mode, window
                ),
                None => format!("{} {} ({})", p.class, p.parameter, p.mode),
            },
            Outcome::NoPdb { reason } => format!("no PDB ({})", reason),
        }
    }
}

/// Whether window evaluation can be skipped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaintenanceGate {
    Evaluate,
    /// A fresh evaluation already found no active window
    KnownInactive,
}

/// Intermediate result of resolving one source
struct Resolution {
    class: AvailabilityClass,
    parameter: DisruptionParameter,
    /// Explicit overrides bypass class replica thresholds
    explicit: bool,
    sources: Vec<DecisionSource>,
    diagnostics: Vec<Diagnostic>,
}

#[derive(Default)]
struct AnnotationRequest {
    class: Option<AvailabilityClass>,
    parameter: Option<DisruptionParameter>,
    keys: Vec<&'static str>,
}

#[derive(Clone, Debug, Default)]
pub struct DecisionEngine {
    default_mode: EnforcementMode,
}

impl DecisionEngine {
    /// `default_mode` applies to policies without an explicit mode and to
    /// workloads protected by annotations alone
    pub fn new(default_mode: EnforcementMode) -> Self {
        Self { default_mode }
    }

    pub fn default_mode(&self) -> EnforcementMode {
        self.default_mode
    }

    pub fn decide(
        &self,
        workload: &WorkloadSnapshot,
        policies: &[AvailabilityPolicy],
        now: DateTime<Utc>,
    ) -> Decision {
        self.decide_with(workload, policies, now, MaintenanceGate::Evaluate)
    }

    pub fn decide_with(
        &self,
        workload: &WorkloadSnapshot,
        policies: &[AvailabilityPolicy],
        now: DateTime<Utc>,
        gate: MaintenanceGate,
    ) -> Decision {
        let mut diagnostics = Vec::new();
        let annotations = WorkloadAnnotations::from_map(&workload.annotations);

        if annotations.opted_out() {
            return Decision::skip(workload, SkipReason::OptedOut, diagnostics);
        }
        if workload.replicas <= 0 {
            return Decision::skip(workload, SkipReason::ZeroReplicas, diagnostics);
        }

        let matching = matching_policies(workload, policies);
        let primary = matching.first().copied();
        if primary.is_none() && !annotations.requests_availability() {
            return Decision::skip(workload, SkipReason::NoMatchingPolicy, diagnostics);
        }

        let replicas = workload.replicas;
        let request = parse_request(&annotations, &mut diagnostics);
        let mode = primary
            .and_then(|p| p.spec.enforcement_mode)
            .unwrap_or(self.default_mode);
        let fallback_class = primary
            .map(|p| p.spec.availability_class)
            .unwrap_or(AvailabilityClass::Standard);

        let from_policy = primary.map(|p| resolve_policy(p, replicas, &mut diagnostics));
        let from_annotations = resolve_annotations(&request, fallback_class, replicas);

        let chosen = match (from_policy, from_annotations) {
            (Some(policy), Some(annotation)) => {
                arbitrate(policy, annotation, &request, mode, replicas, &mut diagnostics)
            }
            (Some(policy), None) => policy,
            (None, Some(annotation)) => annotation,
            // Only malformed availability annotations and no policy
            (None, None) => resolve_class(fallback_class, replicas, Vec::new()),
        };
        diagnostics.extend(chosen.diagnostics);

        if !chosen.explicit && replicas < class_min_replicas(chosen.class) {
            return Decision::skip(
                workload,
                SkipReason::BelowMinimumReplicas {
                    class: chosen.class,
                    replicas,
                },
                diagnostics,
            );
        }

        let mut protection = Protection {
            class: chosen.class,
            parameter: chosen.parameter,
            mode,
            sources: chosen.sources,
            relaxed: false,
            active_window: None,
        };

        let windows = collect_windows(workload, primary, policies, &annotations, &mut diagnostics);
        let windows = usable_windows(windows, &mut diagnostics);
        if gate == MaintenanceGate::Evaluate {
            apply_most_relaxed_window(&mut protection, &windows, now, replicas);
        }

        Decision {
            workload: workload.key.clone(),
            outcome: Outcome::Protect(protection),
            diagnostics,
            has_windows: !windows.is_empty(),
        }
    }
}

/// Policies of the workload's namespace selecting it, primary first
///
/// Ordered by the priority annotation (higher first, unannotated last),
/// then lexically by namespace/name.
pub fn matching_policies<'a>(
    workload: &WorkloadSnapshot,
    policies: &'a [AvailabilityPolicy],
) -> Vec<&'a AvailabilityPolicy> {
    let mut matching: Vec<&AvailabilityPolicy> = policies
        .iter()
        .filter(|p| p.metadata.deletion_timestamp.is_none())
        .filter(|p| p.namespace().as_deref() == Some(workload.key.namespace.as_str()))
        .filter(|p| p.spec.component_selector.matches(&workload.labels))
        .collect();

    matching.sort_by(|a, b| {
        policy_priority(b)
            .cmp(&policy_priority(a))
            .then_with(|| policy_sort_key(a).cmp(&policy_sort_key(b)))
    });
    matching
}

fn policy_priority(policy: &AvailabilityPolicy) -> Option<i64> {
    policy
        .annotations()
        .get(annotations::POLICY_PRIORITY)
        .and_then(|v| v.trim().parse().ok())
}

fn policy_sort_key(policy: &AvailabilityPolicy) -> (String, String) {
    (policy.namespace().unwrap_or_default(), policy.name_any())
}

fn policy_key(policy: &AvailabilityPolicy) -> ObjectKey {
    ObjectKey::new(policy.namespace().unwrap_or_default(), policy.name_any())
}

fn int_or_string_text(value: &IntOrString) -> String {
    match value {
        IntOrString::Int(n) => n.to_string(),
        IntOrString::String(s) => s.clone(),
    }
}

fn pair_text(min: Option<&IntOrString>, max: Option<&IntOrString>) -> String {
    let mut parts = Vec::new();
    if let Some(min) = min {
        parts.push(format!("minAvailable={}", int_or_string_text(min)));
    }
    if let Some(max) = max {
        parts.push(format!("maxUnavailable={}", int_or_string_text(max)));
    }
    parts.join(",")
}

fn parse_request(
    annotations: &WorkloadAnnotations,
    diagnostics: &mut Vec<Diagnostic>,
) -> AnnotationRequest {
    let mut request = AnnotationRequest::default();

    if let Some(raw) = &annotations.availability_class {
        match AvailabilityClass::parse(raw) {
            Some(class) => {
                request.class = Some(class);
                request.keys.push(annotations::AVAILABILITY_CLASS);
            }
            None => diagnostics.push(Diagnostic::InvalidOverride {
                source: format!("annotation:{}", short_key(annotations::AVAILABILITY_CLASS)),
                value: raw.clone(),
                reason: "unknown availability class".to_string(),
            }),
        }
    }

    let invalid = |key: &str, value: &str, err: InvalidDisruptionValue| Diagnostic::InvalidOverride {
        source: format!("annotation:{}", short_key(key)),
        value: value.to_string(),
        reason: err.to_string(),
    };

    match (&annotations.min_available, &annotations.max_unavailable) {
        (Some(min), Some(max)) => diagnostics.push(Diagnostic::InvalidOverride {
            source: format!(
                "annotation:{},{}",
                short_key(annotations::MIN_AVAILABLE),
                short_key(annotations::MAX_UNAVAILABLE)
            ),
            value: format!("minAvailable={},maxUnavailable={}", min, max),
            reason: InvalidDisruptionValue::Contradictory.to_string(),
        }),
        (Some(min), None) => match DisruptionValue::parse(min) {
            Ok(value) => {
                request.parameter = Some(DisruptionParameter::MinAvailable(value));
                request.keys.push(annotations::MIN_AVAILABLE);
            }
            Err(err) => diagnostics.push(invalid(annotations::MIN_AVAILABLE, min, err)),
        },
        (None, Some(max)) => match DisruptionValue::parse(max) {
            Ok(value) => {
                request.parameter = Some(DisruptionParameter::MaxUnavailable(value));
                request.keys.push(annotations::MAX_UNAVAILABLE);
            }
            Err(err) => diagnostics.push(invalid(annotations::MAX_UNAVAILABLE, max, err)),
        },
        (None, None) => {}
    }

    request
}

/// Class defaults with the replica-driven downgrades
fn resolve_class(
    requested: AvailabilityClass,
    replicas: i32,
    mut sources: Vec<DecisionSource>,
) -> Resolution {
    let mut diagnostics = Vec::new();
    let mut class = requested;

    if class == AvailabilityClass::MissionCritical
        && replicas < class_min_replicas(AvailabilityClass::MissionCritical)
    {
        diagnostics.push(Diagnostic::ClassDowngraded {
            from: AvailabilityClass::MissionCritical,
            to: AvailabilityClass::HighAvailability,
            replicas,
        });
        class = AvailabilityClass::HighAvailability;
    }
    if class == AvailabilityClass::HighAvailability
        && replicas < class_min_replicas(AvailabilityClass::HighAvailability)
    {
        diagnostics.push(Diagnostic::ClassDowngraded {
            from: AvailabilityClass::HighAvailability,
            to: AvailabilityClass::Standard,
            replicas,
        });
        class = AvailabilityClass::Standard;
    }

    sources.push(DecisionSource::ClassDefault { class });
    Resolution {
        class,
        parameter: class_default(class, replicas),
        explicit: false,
        sources,
        diagnostics,
    }
}

fn resolve_policy(
    policy: &AvailabilityPolicy,
    replicas: i32,
    diagnostics: &mut Vec<Diagnostic>,
) -> Resolution {
    let key = policy_key(policy);
    let sources = vec![DecisionSource::policy(&key)];

    if let Some(overrides) = &policy.spec.overrides {
        match DisruptionParameter::from_overrides(overrides) {
            Ok(Some(parameter)) => {
                return Resolution {
                    class: policy.spec.availability_class,
                    parameter,
                    explicit: true,
                    sources,
                    diagnostics: Vec::new(),
                };
            }
            Ok(None) => {}
            Err(err) => diagnostics.push(Diagnostic::InvalidOverride {
                source: format!("policy:{}", key),
                value: pair_text(
                    overrides.min_available.as_ref(),
                    overrides.max_unavailable.as_ref(),
                ),
                reason: err.to_string(),
            }),
        }
    }

    resolve_class(policy.spec.availability_class, replicas, sources)
}

fn resolve_annotations(
    request: &AnnotationRequest,
    fallback_class: AvailabilityClass,
    replicas: i32,
) -> Option<Resolution> {
    let sources: Vec<DecisionSource> = request
        .keys
        .iter()
        .map(|key| DecisionSource::Annotation {
            key: short_key(key).to_string(),
        })
        .collect();

    if let Some(parameter) = request.parameter {
        return Some(Resolution {
            class: request.class.unwrap_or(fallback_class),
            parameter,
            explicit: true,
            sources,
            diagnostics: Vec::new(),
        });
    }

    request
        .class
        .map(|class| resolve_class(class, replicas, sources))
}

/// Apply the enforcement mode to a policy/annotation conflict
fn arbitrate(
    policy: Resolution,
    annotation: Resolution,
    request: &AnnotationRequest,
    mode: EnforcementMode,
    replicas: i32,
    diagnostics: &mut Vec<Diagnostic>,
) -> Resolution {
    let mut reject = |reason: String| {
        for key in &request.keys {
            diagnostics.push(Diagnostic::OverrideRejected {
                annotation: short_key(key).to_string(),
                mode,
                reason: reason.clone(),
            });
        }
    };

    // An annotation whose class would drop the PDB never displaces a policy
    // result that protects the workload
    if mode != EnforcementMode::Strict
        && materialises(&policy, replicas)
        && !materialises(&annotation, replicas)
    {
        reject(format!(
            "{} needs at least {} replicas, workload has {}",
            annotation.class,
            class_min_replicas(annotation.class),
            replicas
        ));
        return policy;
    }

    match mode {
        EnforcementMode::Strict => {
            reject("policy takes precedence".to_string());
            policy
        }
        EnforcementMode::Flexible => {
            if annotation
                .parameter
                .is_more_restrictive_than(&policy.parameter, replicas)
            {
                with_policy_source(policy, annotation)
            } else if policy
                .parameter
                .is_more_restrictive_than(&annotation.parameter, replicas)
            {
                reject(format!(
                    "{} is less restrictive than policy {}",
                    annotation.parameter, policy.parameter
                ));
                policy
            } else {
                policy
            }
        }
        EnforcementMode::Advisory => with_policy_source(policy, annotation),
    }
}

/// Whether a resolution survives its class replica threshold
fn materialises(resolution: &Resolution, replicas: i32) -> bool {
    resolution.explicit || replicas >= class_min_replicas(resolution.class)
}

/// Annotation result that still credits the governing policy
fn with_policy_source(policy: Resolution, annotation: Resolution) -> Resolution {
    let mut sources: Vec<DecisionSource> = policy
        .sources
        .into_iter()
        .filter(|s| matches!(s, DecisionSource::Policy { .. }))
        .collect();
    sources.extend(annotation.sources);
    Resolution {
        sources,
        ..annotation
    }
}

/// Windows of the primary policy plus the annotation-sourced ones
fn collect_windows(
    workload: &WorkloadSnapshot,
    primary: Option<&AvailabilityPolicy>,
    policies: &[AvailabilityPolicy],
    annotations: &WorkloadAnnotations,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<(String, MaintenanceWindow)> {
    let mut windows = Vec::new();
    if let Some(policy) = primary {
        windows.extend(policy_windows(policy));
    }

    let Some(raw) = annotations.maintenance_window.as_deref().map(str::trim) else {
        return windows;
    };

    if raw.starts_with('{') {
        match serde_json::from_str::<MaintenanceWindow>(raw) {
            Ok(window) => {
                let label = format!("annotation#{}", window_label(&window, 0));
                windows.push((label, window));
            }
            Err(err) => diagnostics.push(Diagnostic::InvalidWindow {
                window: "annotation".to_string(),
                reason: err.to_string(),
            }),
        }
        return windows;
    }

    let referenced = match raw.split_once('/') {
        Some((namespace, name)) => ObjectKey::new(namespace, name),
        None => ObjectKey::new(workload.key.namespace.clone(), raw),
    };
    if primary.is_some_and(|p| policy_key(p) == referenced) {
        return windows;
    }
    match policies
        .iter()
        .filter(|p| p.metadata.deletion_timestamp.is_none())
        .find(|p| policy_key(p) == referenced)
    {
        Some(policy) => windows.extend(policy_windows(policy)),
        None => diagnostics.push(Diagnostic::InvalidWindow {
            window: "annotation".to_string(),
            reason: format!("referenced policy {} not found", referenced),
        }),
    }

    windows
}

fn policy_windows(policy: &AvailabilityPolicy) -> Vec<(String, MaintenanceWindow)> {
    let key = policy_key(policy);
    policy
        .spec
        .maintenance_windows
        .iter()
        .enumerate()
        .map(|(i, w)| (format!("{}#{}", key, window_label(w, i)), w.clone()))
        .collect()
}

/// Validate windows independently of the clock so the diagnostics do not
/// depend on whether evaluation was skipped
fn usable_windows(
    windows: Vec<(String, MaintenanceWindow)>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<(String, MaintenanceWindow, DisruptionParameter)> {
    let mut usable = Vec::with_capacity(windows.len());
    for (label, window) in windows {
        if let Err(err) = window::validate(&window) {
            diagnostics.push(Diagnostic::InvalidWindow {
                window: label,
                reason: err.to_string(),
            });
            continue;
        }
        match DisruptionParameter::from_pair(
            window.min_available.as_ref(),
            window.max_unavailable.as_ref(),
        ) {
            Ok(Some(parameter)) => usable.push((label, window, parameter)),
            Ok(None) => diagnostics.push(Diagnostic::InvalidWindow {
                window: label,
                reason: "defines neither minAvailable nor maxUnavailable".to_string(),
            }),
            Err(err) => diagnostics.push(Diagnostic::InvalidOverride {
                source: format!("window:{}", label),
                value: pair_text(
                    window.min_available.as_ref(),
                    window.max_unavailable.as_ref(),
                ),
                reason: err.to_string(),
            }),
        }
    }
    usable
}

fn truncate_to_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    let seconds = now.timestamp();
    DateTime::from_timestamp(seconds - seconds.rem_euclid(60), 0).unwrap_or(now)
}

fn apply_most_relaxed_window(
    protection: &mut Protection,
    windows: &[(String, MaintenanceWindow, DisruptionParameter)],
    now: DateTime<Utc>,
    replicas: i32,
) {
    let now = truncate_to_minute(now);
    let mut most_relaxed: Option<(&String, &DisruptionParameter)> = None;

    for (label, window, parameter) in windows {
        if !window::is_active(window, now).unwrap_or(false) {
            continue;
        }
        let relaxes_further = most_relaxed
            .is_none_or(|(_, current)| current.is_more_restrictive_than(parameter, replicas));
        if relaxes_further {
            most_relaxed = Some((label, parameter));
        }
    }

    if let Some((label, parameter)) = most_relaxed {
        protection.parameter = *parameter;
        protection.relaxed = true;
        protection.active_window = Some(label.clone());
        protection.sources.push(DecisionSource::MaintenanceWindow {
            window: label.clone(),
        });
    }
}

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// AvailabilityPolicy binds an availability class to a label-selected set of workloads
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "availability.example.com",
    version = "v1alpha1",
    kind = "AvailabilityPolicy",
    plural = "availabilitypolicies",
    shortname = "ap",
    namespaced,
    status = "AvailabilityPolicyStatus",
    printcolumn = r#"{"name":"Class", "type":"string", "jsonPath":".spec.availabilityClass"}"#,
    printcolumn = r#"{"name":"Mode", "type":"string", "jsonPath":".spec.enforcementMode"}"#,
    printcolumn = r#"{"name":"Decision", "type":"string", "jsonPath":".status.lastDecision"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityPolicySpec {
    /// Availability tier applied to matching workloads
    pub availability_class: AvailabilityClass,

    /// Selects workloads in the policy's namespace
    #[serde(default)]
    pub component_selector: ComponentSelector,

    /// Conflict rule between this policy and workload annotations.
    /// Falls back to the operator default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement_mode: Option<EnforcementMode>,

    /// Explicit disruption parameters taking precedence over the class default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<DisruptionOverrides>,

    /// Windows during which relaxed disruption parameters apply
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintenance_windows: Vec<MaintenanceWindow>,
}

/// Availability tiers, ordered from least to most protective
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "kebab-case")]
pub enum AvailabilityClass {
    NonCritical,
    Standard,
    HighAvailability,
    MissionCritical,
}

impl AvailabilityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityClass::NonCritical => "non-critical",
            AvailabilityClass::Standard => "standard",
            AvailabilityClass::HighAvailability => "high-availability",
            AvailabilityClass::MissionCritical => "mission-critical",
        }
    }

    /// Parse the annotation/CRD spelling of a class
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "non-critical" => Some(AvailabilityClass::NonCritical),
            "standard" => Some(AvailabilityClass::Standard),
            "high-availability" => Some(AvailabilityClass::HighAvailability),
            "mission-critical" => Some(AvailabilityClass::MissionCritical),
            _ => None,
        }
    }
}

impl fmt::Display for AvailabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How policy and workload annotations are reconciled
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    /// Policy wins; annotation overrides are rejected
    #[default]
    Strict,
    /// Annotations may only tighten the policy
    Flexible,
    /// Annotations win; the policy only supplies defaults
    Advisory,
}

impl EnforcementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementMode::Strict => "strict",
            EnforcementMode::Flexible => "flexible",
            EnforcementMode::Advisory => "advisory",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(EnforcementMode::Strict),
            "flexible" => Some(EnforcementMode::Flexible),
            "advisory" => Some(EnforcementMode::Advisory),
            _ => None,
        }
    }
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label selector restricted to the policy's namespace
///
/// An empty selector matches every workload in the namespace.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<SelectorRequirement>,
}

/// A single set-based selector requirement
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Explicit disruption parameters (count or percentage)
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<IntOrString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,
}

/// Recurring or one-off interval with relaxed disruption parameters
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceWindow {
    /// Optional name used in events and PDB annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// First occurrence as wall time in `timezone` (e.g. "2024-03-01T01:00:00")
    pub start: String,

    /// Length of each occurrence (e.g. "2h", "90m")
    pub duration: String,

    #[serde(default)]
    pub recurrence: Recurrence,

    /// IANA zone the start time is expressed in
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<IntOrString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

/// Status of an AvailabilityPolicy
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityPolicyStatus {
    /// Generation of the spec that was last evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// RFC3339 timestamp of the last evaluation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluation: Option<String>,

    /// Summary of decisions for matched workloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decision: Option<String>,

    /// Workload names matched at the last evaluation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_workloads: Vec<String>,
}

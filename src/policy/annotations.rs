//! Workload annotation protocol
//!
//! Workloads steer the engine through a handful of annotations under the
//! operator's prefix. The operator also writes its own status annotations
//! under the same prefix.

use std::collections::BTreeMap;

/// Prefix shared by every annotation the operator reads or writes
pub const ANNOTATION_PREFIX: &str = "availability.example.com/";

pub const AVAILABILITY_CLASS: &str = "availability.example.com/availability-class";
pub const MIN_AVAILABLE: &str = "availability.example.com/min-available";
pub const MAX_UNAVAILABLE: &str = "availability.example.com/max-unavailable";
pub const MAINTENANCE_WINDOW: &str = "availability.example.com/maintenance-window";
pub const MANAGED: &str = "availability.example.com/managed";

/// Ordering hint on AvailabilityPolicy objects (higher first)
pub const POLICY_PRIORITY: &str = "availability.example.com/priority";

/// Annotation key without the operator prefix, used in decision sources
pub fn short_key(key: &str) -> &str {
    key.strip_prefix(ANNOTATION_PREFIX).unwrap_or(key)
}

/// Raw availability annotations of one workload
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkloadAnnotations {
    pub managed: Option<String>,
    pub availability_class: Option<String>,
    pub min_available: Option<String>,
    pub max_unavailable: Option<String>,
    pub maintenance_window: Option<String>,
}

impl WorkloadAnnotations {
    pub fn from_map(annotations: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| annotations.get(key).cloned();
        Self {
            managed: get(MANAGED),
            availability_class: get(AVAILABILITY_CLASS),
            min_available: get(MIN_AVAILABLE),
            max_unavailable: get(MAX_UNAVAILABLE),
            maintenance_window: get(MAINTENANCE_WINDOW),
        }
    }

    /// `managed: "false"` opts the workload out entirely
    pub fn opted_out(&self) -> bool {
        self.managed
            .as_deref()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("false"))
    }

    /// Whether the workload asks for protection on its own
    pub fn requests_availability(&self) -> bool {
        self.availability_class.is_some()
            || self.min_available.is_some()
            || self.max_unavailable.is_some()
    }
}

//! Policy resolution
//!
//! Everything in this module is pure: no I/O, no clocks read implicitly,
//! no metrics. The reconcilers feed it snapshots and act on its output.

pub mod annotations;
pub mod disruption;
pub mod engine;
pub mod selector;
pub mod window;

use std::fmt;

use kube::ResourceExt;
use serde::Serialize;

pub use annotations::WorkloadAnnotations;
pub use disruption::{DisruptionParameter, DisruptionValue, InvalidDisruptionValue};
pub use engine::{
    Decision, DecisionEngine, DecisionSource, Diagnostic, MaintenanceGate, Outcome, Protection,
    SkipReason, WorkloadSnapshot,
};
pub use selector::LabelIndex;
pub use window::{WindowError, WindowStatus};

/// Namespaced object identity
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced resource, `None` for objects without a namespace
    pub fn of<K: ResourceExt>(resource: &K) -> Option<Self> {
        Some(Self::new(resource.namespace()?, resource.name_any()))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

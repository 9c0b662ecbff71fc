pub mod context;
pub mod error;
pub mod events;
pub mod policy_reconciler;
pub mod status;
pub mod workload_reconciler;

pub use context::{Context, WorkloadQueue};
pub use error::{BackoffConfig, Error, ErrorContext, Result};
pub use events::{DecisionEvent, EventPublisher, EventReason, KubeEventPublisher, decision_events};
pub use policy_reconciler::{
    POLICY_CONTROLLER, POLICY_FINALIZER, PolicySyncReport, policy_error_policy, reconcile_policy,
    sync_policy,
};
pub use status::{PolicyStatusBuilder, WorkloadStatus, spec_changed};
pub use workload_reconciler::{
    PdbAction, ReconcileReport, WORKLOAD_CONTROLLER, error_policy, reconcile, reconcile_workload,
};

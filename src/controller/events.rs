//! Kubernetes events for decisions and PDB writes

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};

use crate::policy::{Decision, Diagnostic};
use crate::resources::common::OPERATOR_NAME;

/// Longest note the events API accepts
const MAX_NOTE_LEN: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventReason {
    PdbCreated,
    PdbUpdated,
    PdbDeleted,
    PdbConflict,
    OverrideRejected,
    ClassDowngraded,
    MaintenanceWindowActive,
    InvalidOverride,
    InvalidWindow,
}

impl EventReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventReason::PdbCreated => "PDBCreated",
            EventReason::PdbUpdated => "PDBUpdated",
            EventReason::PdbDeleted => "PDBDeleted",
            EventReason::PdbConflict => "PDBConflict",
            EventReason::OverrideRejected => "OverrideRejected",
            EventReason::ClassDowngraded => "ClassDowngraded",
            EventReason::MaintenanceWindowActive => "MaintenanceWindowActive",
            EventReason::InvalidOverride => "InvalidOverride",
            EventReason::InvalidWindow => "InvalidWindow",
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            EventReason::PdbConflict
                | EventReason::OverrideRejected
                | EventReason::ClassDowngraded
                | EventReason::InvalidOverride
                | EventReason::InvalidWindow
        )
    }

    fn action(&self) -> &'static str {
        match self {
            EventReason::PdbCreated => "Create",
            EventReason::PdbUpdated => "Update",
            EventReason::PdbDeleted => "Delete",
            _ => "Decide",
        }
    }
}

impl fmt::Display for EventReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionEvent {
    pub reason: EventReason,
    pub note: String,
}

impl DecisionEvent {
    pub fn new(reason: EventReason, note: impl Into<String>) -> Self {
        Self {
            reason,
            note: note.into(),
        }
    }
}

/// Sink for events about workloads and policies
///
/// Publishing is best effort: implementations log failures and never
/// surface them to the reconcilers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, reference: &ObjectReference, event: DecisionEvent);
}

/// [`EventPublisher`] backed by the events API
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: OPERATOR_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, reference: &ObjectReference, event: DecisionEvent) {
        let mut note = event.note;
        truncate(&mut note, MAX_NOTE_LEN);
        let type_ = if event.reason.is_warning() {
            EventType::Warning
        } else {
            EventType::Normal
        };
        let kube_event = Event {
            type_,
            reason: event.reason.as_str().to_string(),
            note: Some(note),
            action: event.reason.action().to_string(),
            secondary: None,
        };
        if let Err(err) = self.recorder.publish(&kube_event, reference).await {
            tracing::warn!(
                reason = event.reason.as_str(),
                object = ?reference.name,
                error = %err,
                "Failed to publish event"
            );
        }
    }
}

fn truncate(msg: &mut String, max_len: usize) {
    if msg.len() <= max_len {
        return;
    }
    let mut end = max_len;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    msg.truncate(end);
}

/// Events describing a decision's diagnostics and window state
pub fn decision_events(decision: &Decision) -> Vec<DecisionEvent> {
    let mut events: Vec<DecisionEvent> = decision
        .diagnostics
        .iter()
        .map(|diagnostic| {
            let reason = match diagnostic {
                Diagnostic::OverrideRejected { .. } => EventReason::OverrideRejected,
                Diagnostic::ClassDowngraded { .. } => EventReason::ClassDowngraded,
                Diagnostic::InvalidOverride { .. } => EventReason::InvalidOverride,
                Diagnostic::InvalidWindow { .. } => EventReason::InvalidWindow,
            };
            DecisionEvent::new(reason, diagnostic.message())
        })
        .collect();

    if let Some(protection) = decision.protection().filter(|p| p.relaxed) {
        let window = protection.active_window.as_deref().unwrap_or("unnamed");
        events.push(DecisionEvent::new(
            EventReason::MaintenanceWindowActive,
            format!(
                "maintenance window {} active, PDB relaxed to {}",
                window, protection.parameter
            ),
        ));
    }
    events
}

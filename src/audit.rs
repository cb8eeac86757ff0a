//! Write-only audit sink used by the confirmation workflow.
//!
//! The gate never reads audit records back; it only hands them to whatever sink
//! the host application provides.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Kind of record written to an [`AuditSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    ConfirmationRequested,
    ConfirmationResponded,
    EscalationAttempt,
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditEventKind::ConfirmationRequested => "confirmation_requested",
            AuditEventKind::ConfirmationResponded => "confirmation_responded",
            AuditEventKind::EscalationAttempt => "escalation_attempt",
        };
        write!(f, "{}", name)
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, kind: AuditEventKind, payload: Value);
}

/// Emits every record as a structured `tracing` event on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, kind: AuditEventKind, payload: Value) {
        info!(target: "audit", kind = %kind, payload = %payload, "audit record");
    }
}

/// Keeps records in memory, for tests and embedding applications.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<(AuditEventKind, Value)>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(AuditEventKind, Value)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, kind: AuditEventKind) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, kind: AuditEventKind, payload: Value) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, payload));
    }
}

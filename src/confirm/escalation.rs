//! Append-only trail of privilege escalation attempts.
//!
//! Independent of the general audit sink: events are kept in memory for
//! per-session queries and forwarded to the sink exactly once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{AuditEventKind, AuditSink};
use crate::security::Permission;

use super::history::BoundedLog;
use super::ConfirmationResult;

/// One escalation attempt. Never mutated after it is logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub session_id: String,
    pub command: String,
    pub required_permissions: Vec<Permission>,
    pub confirmation_result: ConfirmationResult,
    pub user_comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationSummary {
    pub total_attempts: usize,
    pub approved: usize,
    pub denied: usize,
    pub timeout: usize,
    pub error: usize,
}

pub struct EscalationAuditor {
    events: BoundedLog<EscalationEvent>,
    audit: Arc<dyn AuditSink>,
}

impl EscalationAuditor {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            events: BoundedLog::default(),
            audit,
        }
    }

    pub fn with_capacity(audit: Arc<dyn AuditSink>, capacity: usize) -> Self {
        Self {
            events: BoundedLog::new(capacity),
            audit,
        }
    }

    pub fn log_escalation_attempt(
        &self,
        session_id: &str,
        command: &str,
        required_permissions: &[Permission],
        confirmation_result: ConfirmationResult,
        user_comment: Option<&str>,
    ) {
        let event = EscalationEvent {
            session_id: session_id.to_string(),
            command: command.to_string(),
            required_permissions: required_permissions.to_vec(),
            confirmation_result,
            user_comment: user_comment.map(str::to_string),
            timestamp: Utc::now(),
        };

        self.audit.record(
            AuditEventKind::EscalationAttempt,
            json!({
                "session_id": event.session_id,
                "command": event.command,
                "required_permissions": event.required_permissions,
                "confirmation_result": event.confirmation_result,
                "user_comment": event.user_comment,
                "timestamp": event.timestamp,
            }),
        );
        self.events.push(event);
    }

    /// Events for `session_id`, or all events, in the order they were logged.
    pub fn escalation_events(&self, session_id: Option<&str>) -> Vec<EscalationEvent> {
        match session_id {
            None => self.events.snapshot(),
            Some(id) => self.events.with_entries(|events| {
                events
                    .iter()
                    .filter(|e| e.session_id == id)
                    .cloned()
                    .collect()
            }),
        }
    }

    pub fn escalation_summary(&self) -> EscalationSummary {
        self.events.with_entries(|events| {
            let mut summary = EscalationSummary::default();
            for event in events {
                summary.total_attempts += 1;
                match event.confirmation_result {
                    ConfirmationResult::Approved => summary.approved += 1,
                    ConfirmationResult::Denied => summary.denied += 1,
                    ConfirmationResult::Timeout => summary.timeout += 1,
                    ConfirmationResult::Error => summary.error += 1,
                }
            }
            summary
        })
    }
}

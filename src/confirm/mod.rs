//! Human confirmation workflow for permission-requiring commands.
//!
//! A [`ConfirmationProvider`] decides how a human is asked (interactive prompt,
//! programmed answers for headless use); the [`ConfirmationCoordinator`] wraps it
//! with history, audit records and statistics. The [`EscalationAuditor`] keeps a
//! separate append-only trail of every escalation attempt.
//!
//! Providers block for up to the request's timeout. Async callers should go
//! through `SecurityEngine::confirm_async`, which moves the call onto a blocking
//! worker thread.

mod escalation;
mod history;
mod interactive;
mod programmable;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditEventKind, AuditSink};
use crate::security::Permission;

pub use escalation::{EscalationAuditor, EscalationEvent, EscalationSummary};
pub use history::{BoundedLog, DEFAULT_HISTORY_CAPACITY};
pub use interactive::{parse_confirmation_input, InteractiveProvider, InterruptHandle};
pub use programmable::ProgrammableProvider;

/// Default time a human gets to answer a prompt.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 30;

/// Outcome of a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationResult {
    Approved,
    Denied,
    Timeout,
    Error,
}

impl fmt::Display for ConfirmationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfirmationResult::Approved => "approved",
            ConfirmationResult::Denied => "denied",
            ConfirmationResult::Timeout => "timeout",
            ConfirmationResult::Error => "error",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub id: String,
    pub command: String,
    pub required_permissions: Vec<Permission>,
    pub risk_description: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub timeout_seconds: u64,
}

impl ConfirmationRequest {
    /// A fresh request with a generated id and the current time.
    pub fn new(
        command: impl Into<String>,
        required_permissions: Vec<Permission>,
        risk_description: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            command: command.into(),
            required_permissions,
            risk_description: risk_description.into(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
            timeout_seconds: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    pub request_id: String,
    pub result: ConfirmationResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_comment: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub response_time_seconds: f64,
}

impl ConfirmationResponse {
    pub fn new(
        request_id: impl Into<String>,
        result: ConfirmationResult,
        user_comment: Option<String>,
        response_time_seconds: f64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            result,
            user_comment,
            timestamp: Utc::now(),
            response_time_seconds,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.result == ConfirmationResult::Approved
    }
}

/// Asks a human (or a stand-in) to approve or deny a request.
///
/// Implementations must fail closed: anything but an explicit approval is
/// reported as `Denied`, `Timeout` or `Error`.
pub trait ConfirmationProvider: Send + Sync {
    fn request_confirmation(&self, request: &ConfirmationRequest) -> ConfirmationResponse;
}

/// Tally of confirmation outcomes over the retained history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationStats {
    pub total_requests: usize,
    pub approved: usize,
    pub denied: usize,
    pub timeout: usize,
    pub error: usize,
}

impl ConfirmationStats {
    fn tally<'a>(results: impl Iterator<Item = &'a ConfirmationResult>) -> Self {
        let mut stats = Self::default();
        for result in results {
            stats.total_requests += 1;
            match result {
                ConfirmationResult::Approved => stats.approved += 1,
                ConfirmationResult::Denied => stats.denied += 1,
                ConfirmationResult::Timeout => stats.timeout += 1,
                ConfirmationResult::Error => stats.error += 1,
            }
        }
        stats
    }
}

/// Routes confirmation requests to a provider and keeps the exchange history.
pub struct ConfirmationCoordinator {
    provider: Arc<dyn ConfirmationProvider>,
    audit: Arc<dyn AuditSink>,
    history: BoundedLog<(ConfirmationRequest, ConfirmationResponse)>,
    timeout_seconds: u64,
}

impl ConfirmationCoordinator {
    pub fn new(provider: Arc<dyn ConfirmationProvider>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            provider,
            audit,
            history: BoundedLog::default(),
            timeout_seconds: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = BoundedLog::new(capacity);
        self
    }

    /// Timeout applied to requests built by [`Self::request_permission_confirmation`].
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn request_permission_confirmation(
        &self,
        command: &str,
        required_permissions: &[Permission],
        session_id: &str,
        risk_description: &str,
    ) -> ConfirmationResponse {
        let request = ConfirmationRequest::new(
            command,
            required_permissions.to_vec(),
            risk_description,
            session_id,
        )
        .with_timeout(self.timeout_seconds);
        self.submit(request)
    }

    /// Run a prebuilt request through the provider and record the exchange.
    pub fn submit(&self, request: ConfirmationRequest) -> ConfirmationResponse {
        self.audit.record(
            AuditEventKind::ConfirmationRequested,
            json!({
                "request_id": request.id,
                "session_id": request.session_id,
                "command": request.command,
                "required_permissions": request.required_permissions,
                "risk_description": request.risk_description,
                "timeout_seconds": request.timeout_seconds,
            }),
        );

        let response = self.provider.request_confirmation(&request);

        info!(
            "Confirmation {} for session {}: {}",
            request.id, request.session_id, response.result
        );
        self.audit.record(
            AuditEventKind::ConfirmationResponded,
            json!({
                "request_id": response.request_id,
                "session_id": request.session_id,
                "result": response.result,
                "user_comment": response.user_comment,
                "response_time_seconds": response.response_time_seconds,
            }),
        );

        self.history.push((request, response.clone()));
        response
    }

    pub fn history(&self) -> Vec<(ConfirmationRequest, ConfirmationResponse)> {
        self.history.snapshot()
    }

    pub fn confirmation_stats(&self) -> ConfirmationStats {
        self.history
            .with_entries(|entries| ConfirmationStats::tally(entries.iter().map(|(_, r)| &r.result)))
    }
}

//! Scripted confirmation answers for headless use and tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{ConfirmationProvider, ConfirmationRequest, ConfirmationResponse, ConfirmationResult};

/// Answers confirmations from configuration instead of a human.
///
/// Used for headless deployments and tests. Every request is recorded so the
/// caller can inspect what would have been shown to a user.
#[derive(Debug)]
pub struct ProgrammableProvider {
    default_result: ConfirmationResult,
    overrides: Mutex<HashMap<String, ConfirmationResult>>,
    received: Mutex<Vec<ConfirmationRequest>>,
}

impl ProgrammableProvider {
    pub fn new(default_result: ConfirmationResult) -> Self {
        Self {
            default_result,
            overrides: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Answer the request with id `request_id` with `result`.
    pub fn set_override(&self, request_id: impl Into<String>, result: ConfirmationResult) {
        self.overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id.into(), result);
    }

    /// Requests seen so far, in arrival order.
    pub fn received(&self) -> Vec<ConfirmationRequest> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for ProgrammableProvider {
    fn default() -> Self {
        Self::new(ConfirmationResult::Denied)
    }
}

impl ConfirmationProvider for ProgrammableProvider {
    fn request_confirmation(&self, request: &ConfirmationRequest) -> ConfirmationResponse {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let result = self
            .overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.id)
            .copied()
            .unwrap_or(self.default_result);

        ConfirmationResponse::new(request.id.clone(), result, None, 0.0)
    }
}

//! The three-tier security gate.
//!
//! 1. Whitelist: rule-based validation of the command text.
//! 2. Permissions: inferred capabilities and, when any are needed, a human
//!    confirmation recorded by the escalation auditor.
//! 3. Sandbox: execution inside an isolated container.
//!
//! Build one engine per process (or tenant) and pass it around explicitly.

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info};

use crate::audit::AuditSink;
use crate::config::{GateConfig, ProviderKind};
use crate::confirm::{
    ConfirmationCoordinator, ConfirmationProvider, ConfirmationRequest, ConfirmationResponse,
    ConfirmationStats, EscalationAuditor, EscalationEvent, EscalationSummary, InteractiveProvider,
    InterruptHandle, ProgrammableProvider,
};
use crate::error::GateError;
use crate::sandbox::{DockerRunner, ExecutionResult, SandboxExecutor};
use crate::security::{
    describe_risk, Permission, PermissionInferencer, RuleStore, SecurityRule, ValidationResult,
    WhitelistValidator,
};

pub struct SecurityEngine {
    validator: WhitelistValidator,
    inferencer: PermissionInferencer,
    coordinator: ConfirmationCoordinator,
    auditor: EscalationAuditor,
    sandbox: Option<SandboxExecutor>,
    interrupt: Option<InterruptHandle>,
}

impl SecurityEngine {
    /// An engine without a sandbox tier.
    pub fn new(
        store: RuleStore,
        provider: Arc<dyn ConfirmationProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self::from_parts(
            WhitelistValidator::new(store),
            ConfirmationCoordinator::new(provider, audit.clone()),
            EscalationAuditor::new(audit),
            None,
        )
    }

    pub fn from_parts(
        validator: WhitelistValidator,
        coordinator: ConfirmationCoordinator,
        auditor: EscalationAuditor,
        sandbox: Option<SandboxExecutor>,
    ) -> Self {
        Self {
            validator,
            inferencer: PermissionInferencer::new(),
            coordinator,
            auditor,
            sandbox,
            interrupt: None,
        }
    }

    /// Build everything from configuration.
    ///
    /// With the sandbox enabled, its preflight runs here and a failure is
    /// returned rather than falling back to unsandboxed execution.
    pub async fn from_config(config: &GateConfig, audit: Arc<dyn AuditSink>) -> Result<Self, GateError> {
        let store = RuleStore::open(&config.rules_path);

        let (provider, interrupt): (Arc<dyn ConfirmationProvider>, Option<InterruptHandle>) =
            match config.confirmation.provider {
                ProviderKind::Interactive => {
                    let provider = InteractiveProvider::stdio();
                    let handle = provider.interrupt_handle();
                    (Arc::new(provider), Some(handle))
                }
                ProviderKind::Programmable => (
                    Arc::new(ProgrammableProvider::new(config.confirmation.default_result)),
                    None,
                ),
            };

        let coordinator = ConfirmationCoordinator::new(provider, audit.clone())
            .with_timeout(config.confirmation.timeout_seconds)
            .with_history_capacity(config.history_capacity);
        let auditor = EscalationAuditor::with_capacity(audit, config.history_capacity);

        let sandbox = if config.sandbox.enabled {
            let runner = Arc::new(DockerRunner::new(config.sandbox.runtime.clone()));
            Some(SandboxExecutor::new(config.sandbox.clone(), runner).await?)
        } else {
            info!("Sandbox tier disabled by configuration");
            None
        };

        let mut engine = Self::from_parts(WhitelistValidator::new(store), coordinator, auditor, sandbox);
        engine.interrupt = interrupt;
        Ok(engine)
    }

    pub fn with_sandbox(mut self, executor: SandboxExecutor) -> Self {
        self.sandbox = Some(executor);
        self
    }

    /// Handle that cancels a pending interactive prompt, if the provider has one.
    pub fn interrupt_handle(&self) -> Option<InterruptHandle> {
        self.interrupt.clone()
    }

    pub fn sandbox(&self) -> Option<&SandboxExecutor> {
        self.sandbox.as_ref()
    }

    /// Tier 1 verdict plus the permissions the command would need.
    pub fn validate(&self, command: &str) -> ValidationResult {
        let mut result = self.validator.validate(command);
        result.required_permissions = self.inferencer.infer(command);
        result
    }

    /// Tier 2: ask for approval when `required_permissions` is non-empty.
    ///
    /// Blocks for up to the confirmation timeout. Returns `true` only on an
    /// explicit approval (or when nothing needs approving).
    pub fn request_permission_confirmation(
        &self,
        command: &str,
        required_permissions: &[Permission],
        session_id: &str,
    ) -> bool {
        if required_permissions.is_empty() {
            return true;
        }

        let risk = describe_risk(command, required_permissions);
        let response =
            self.coordinator
                .request_permission_confirmation(command, required_permissions, session_id, &risk);
        self.record_escalation(command, required_permissions, session_id, &response);
        response.is_approved()
    }

    /// Same as [`Self::request_permission_confirmation`], run on a blocking
    /// worker so async callers never stall their executor.
    pub async fn confirm_async(
        self: &Arc<Self>,
        command: String,
        required_permissions: Vec<Permission>,
        session_id: String,
    ) -> bool {
        let engine = self.clone();
        let worker = tokio::task::spawn_blocking(move || {
            engine.request_permission_confirmation(&command, &required_permissions, &session_id)
        });
        match worker.await {
            Ok(approved) => approved,
            Err(e) => {
                error!("Confirmation worker failed: {}", e);
                false
            }
        }
    }

    /// Tier 2 for a caller-built request (custom id or timeout).
    pub fn submit_confirmation(&self, request: ConfirmationRequest) -> ConfirmationResponse {
        let command = request.command.clone();
        let permissions = request.required_permissions.clone();
        let session_id = request.session_id.clone();
        let response = self.coordinator.submit(request);
        self.record_escalation(&command, &permissions, &session_id, &response);
        response
    }

    fn record_escalation(
        &self,
        command: &str,
        required_permissions: &[Permission],
        session_id: &str,
        response: &ConfirmationResponse,
    ) {
        self.auditor.log_escalation_attempt(
            session_id,
            command,
            required_permissions,
            response.result,
            response.user_comment.as_deref(),
        );
    }

    /// Tier 3: run an approved command in the sandbox.
    pub async fn execute_sandboxed(
        &self,
        command: &str,
        timeout_seconds: u64,
    ) -> Result<ExecutionResult, GateError> {
        let sandbox = self.sandbox.as_ref().ok_or(GateError::SandboxDisabled)?;
        Ok(sandbox.execute(command, timeout_seconds).await)
    }

    /// Tier 3, abandoned early when `cancel` completes (e.g. on Ctrl-C).
    pub async fn execute_sandboxed_until(
        &self,
        command: &str,
        timeout_seconds: u64,
        cancel: impl Future<Output = ()>,
    ) -> Result<ExecutionResult, GateError> {
        let sandbox = self.sandbox.as_ref().ok_or(GateError::SandboxDisabled)?;
        Ok(sandbox.execute_until(command, timeout_seconds, cancel).await)
    }

    /// Replace and persist the whitelist. Concurrent validations see either the
    /// old or the new set, never a mix.
    pub fn update_whitelist(&self, rules: Vec<SecurityRule>) -> Result<(), GateError> {
        self.validator.store().replace(rules).map_err(GateError::Persist)
    }

    pub fn rules(&self) -> Vec<SecurityRule> {
        self.validator.store().snapshot().rules()
    }

    pub fn confirmation_stats(&self) -> ConfirmationStats {
        self.coordinator.confirmation_stats()
    }

    pub fn escalation_events(&self, session_id: Option<&str>) -> Vec<EscalationEvent> {
        self.auditor.escalation_events(session_id)
    }

    pub fn escalation_summary(&self) -> EscalationSummary {
        self.auditor.escalation_summary()
    }
}

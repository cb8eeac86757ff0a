//! Errors returned by the [`SecurityEngine`](crate::SecurityEngine) façade.

use thiserror::Error;

use crate::sandbox::SandboxError;

#[derive(Debug, Error)]
pub enum GateError {
    /// Sandboxed execution was requested but this engine has no executor.
    #[error("Sandbox disabled: no sandbox executor is configured")]
    SandboxDisabled,

    /// The sandbox failed its preflight check.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// The new whitelist could not be written; the previous one stays active.
    #[error("Failed to persist whitelist: {0:#}")]
    Persist(#[source] anyhow::Error),
}

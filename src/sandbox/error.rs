//! Error types for sandbox setup.
//!
//! Per-call execution problems never surface as errors; they are folded into
//! `ExecutionResult`. Only preflight failures end up here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    /// The isolation runtime could not be reached.
    #[error("Isolation runtime '{runtime}' is unavailable: {detail}")]
    RuntimeUnavailable { runtime: String, detail: String },

    /// The execution image is missing and could not be pulled.
    #[error("Failed to pull sandbox image '{image}': {detail}")]
    ImagePull { image: String, detail: String },

    /// Spawning the runtime process failed.
    #[error("Sandbox process error: {0}")]
    Process(#[from] std::io::Error),
}

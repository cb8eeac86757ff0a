//! Sandboxed command execution.
//!
//! Approved commands run inside a throwaway container: no network, read-only
//! root filesystem, bounded CPU and memory, and a hard wall-clock timeout.

pub mod error;
mod executor;
mod runner;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use error::SandboxError;
pub use executor::{ExecutionResult, SandboxExecutor};
pub use runner::{DockerRunner, IsolatedRunner, RunOutput, SandboxInvocation, SCRIPT_MOUNT_PATH};

/// Sandbox settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub enabled: bool,
    /// Docker-compatible CLI used as the isolation runtime.
    pub runtime: String,
    pub image: String,
    pub interpreter: String,
    pub memory_limit: String,
    pub cpu_limit: String,
    pub default_timeout_seconds: u64,
    /// Max bytes kept from each of stdout and stderr.
    pub max_output_bytes: usize,
    /// Where scratch scripts are written; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            runtime: "docker".to_string(),
            image: "mcr.microsoft.com/powershell:latest".to_string(),
            interpreter: "pwsh".to_string(),
            memory_limit: "512m".to_string(),
            cpu_limit: "1.0".to_string(),
            default_timeout_seconds: 30,
            max_output_bytes: 64 * 1024,
            scratch_dir: None,
        }
    }
}

//! RustyGate - the command security gate for AI-suggested shell commands
//!
//! This library decides whether a generated command may run, and runs it:
//! - Whitelist validation against persisted, runtime-editable rules
//! - Permission inference (admin, write, execute)
//! - Human confirmation with an escalation audit trail
//! - Sandboxed execution in a network-less, read-only container
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rusty_gate::audit::TracingAuditSink;
//! use rusty_gate::config::GateConfig;
//! use rusty_gate::SecurityEngine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GateConfig::load(None)?;
//!     let engine = SecurityEngine::from_config(&config, Arc::new(TracingAuditSink)).await?;
//!
//!     let command = "Stop-Service -Name Spooler";
//!     let verdict = engine.validate(command);
//!     if verdict.is_valid
//!         && engine.request_permission_confirmation(command, &verdict.required_permissions, "session-1")
//!     {
//!         let result = engine.execute_sandboxed(command, 30).await?;
//!         println!("{}", result.stdout);
//!     }
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod confirm;
pub mod engine;
pub mod error;
pub mod sandbox;
pub mod security;
pub mod utils;

// Re-export commonly used types
pub use config::GateConfig;
pub use confirm::{ConfirmationResponse, ConfirmationResult};
pub use engine::SecurityEngine;
pub use error::GateError;
pub use sandbox::ExecutionResult;
pub use security::{Permission, RiskLevel, SecurityRule, ValidationResult};

//! Command analysis: whitelist rules, their storage, and permission inference.
//!
//! This module judges command text only. Asking a human and running the command
//! live in [`crate::confirm`] and [`crate::sandbox`].

mod analyzer;
mod permissions;
mod rules;
mod store;
mod whitelist;

pub use analyzer::describe_risk;
pub use permissions::{Permission, PermissionInferencer};
pub use rules::{default_rules, RiskLevel, RuleAction, RuleCategory, SecurityRule};
pub use store::{default_rules_path, CompiledRule, PersistedRules, RuleSet, RuleStore};
pub use whitelist::{evaluate, ValidationResult, WhitelistValidator};

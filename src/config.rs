//! Gate configuration.
//!
//! Loaded from `~/.rusty-gate/config.json` (or an explicit path). Every field has
//! a default, so a missing file or a partial document is fine. A few settings
//! can be overridden from the environment:
//!
//! - `RUSTY_GATE_RULES` - path of the rule file
//! - `RUSTY_GATE_SANDBOX_IMAGE` - container image used for execution
//! - `RUSTY_GATE_NO_SANDBOX` - any value disables the sandbox tier

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::confirm::{ConfirmationResult, DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_HISTORY_CAPACITY};
use crate::sandbox::SandboxConfig;
use crate::security::default_rules_path;

/// Which confirmation provider to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Interactive,
    Programmable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub provider: ProviderKind,
    pub timeout_seconds: u64,
    /// Answer given by the programmable provider.
    pub default_result: ConfirmationResult,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Interactive,
            timeout_seconds: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            default_result: ConfirmationResult::Denied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub rules_path: PathBuf,
    /// Entries kept in the confirmation and escalation histories.
    pub history_capacity: usize,
    pub confirmation: ConfirmationConfig,
    pub sandbox: SandboxConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            confirmation: ConfirmationConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    home.join(".rusty-gate").join("config.json")
}

impl GateConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file is an
    /// error. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: GateConfig = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid config JSON at {}", path.display()))?;
            info!("Loaded config from {}", path.display());
            config
        } else {
            GateConfig::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("RUSTY_GATE_RULES") {
            self.rules_path = PathBuf::from(path);
        }
        if let Some(image) = var("RUSTY_GATE_SANDBOX_IMAGE") {
            self.sandbox.image = image;
        }
        if var("RUSTY_GATE_NO_SANDBOX").is_some() {
            self.sandbox.enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GateConfig::load(Some(dir.path().join("config.json").as_path())).unwrap();
        assert_eq!(config.confirmation.timeout_seconds, 30);
        assert_eq!(config.confirmation.provider, ProviderKind::Interactive);
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"confirmation": {"provider": "programmable", "default_result": "approved"},
                "sandbox": {"memory_limit": "256m"}}"#,
        )
        .unwrap();

        let config = GateConfig::load(Some(path.as_path())).unwrap();

        assert_eq!(config.confirmation.provider, ProviderKind::Programmable);
        assert_eq!(config.confirmation.default_result, ConfirmationResult::Approved);
        assert_eq!(config.confirmation.timeout_seconds, 30);
        assert_eq!(config.sandbox.memory_limit, "256m");
        assert_eq!(config.sandbox.cpu_limit, "1.0");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(GateConfig::load(Some(path.as_path())).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RUSTY_GATE_RULES", "/etc/rusty-gate/rules.json"),
            ("RUSTY_GATE_NO_SANDBOX", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = GateConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.rules_path, PathBuf::from("/etc/rusty-gate/rules.json"));
        assert!(!config.sandbox.enabled);
        assert_eq!(config.sandbox.image, SandboxConfig::default().image);
    }
}

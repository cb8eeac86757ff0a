//! Disk persistence and atomic swapping of the active rule set.
//!
//! Goal: keep whitelist edits across restarts, and let validators keep reading
//! a consistent rule list while an update is in flight.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::Context as _;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use super::rules::{default_rules, SecurityRule};

/// On-disk layout of the rule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRules {
    pub rules: Vec<SecurityRule>,
}

/// A rule together with its compiled pattern.
///
/// `regex` is `None` when the pattern failed to compile; such a rule never matches.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: SecurityRule,
    pub regex: Option<Regex>,
}

impl CompiledRule {
    pub fn compile(rule: SecurityRule) -> Self {
        let regex = match RegexBuilder::new(&rule.pattern)
            .case_insensitive(true)
            .build()
        {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(
                    "Invalid pattern in rule '{}', rule will never match: {}",
                    rule.description, e
                );
                None
            }
        };
        Self { rule, regex }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(text))
    }
}

/// An immutable, compiled snapshot of the whitelist.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    compiled: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn compile(rules: Vec<SecurityRule>) -> Self {
        Self {
            compiled: rules.into_iter().map(CompiledRule::compile).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.compiled.iter()
    }

    pub fn rules(&self) -> Vec<SecurityRule> {
        self.compiled.iter().map(|c| c.rule.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Owns the active rule set and, optionally, the file it is persisted to.
pub struct RuleStore {
    path: Option<PathBuf>,
    active: RwLock<Arc<RuleSet>>,
    // Held across persist and swap so disk and memory agree on the last writer
    writer: Mutex<()>,
}

pub fn default_rules_path() -> PathBuf {
    // ~/.rusty-gate/rules.json
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    home.join(".rusty-gate").join("rules.json")
}

impl RuleStore {
    /// Open the store backed by `path`.
    ///
    /// A missing or corrupt file is replaced by the default rule set, which is
    /// then written back to `path`. Failing to write it is logged; the defaults
    /// stay active in memory.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let rules = match load(&path) {
            Ok(persisted) => {
                info!("Loaded {} rules from {}", persisted.rules.len(), path.display());
                persisted.rules
            }
            Err(e) => {
                warn!("Falling back to default rules: {:#}", e);
                let defaults = default_rules();
                if let Err(e) = save(&path, &defaults) {
                    warn!("Failed to persist default rules: {:#}", e);
                }
                defaults
            }
        };

        Self {
            path: Some(path),
            active: RwLock::new(Arc::new(RuleSet::compile(rules))),
            writer: Mutex::new(()),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory(rules: Vec<SecurityRule>) -> Self {
        Self {
            path: None,
            active: RwLock::new(Arc::new(RuleSet::compile(rules))),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The current rule set. Callers keep the snapshot even if it is replaced.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Persist `rules` and make them the active set.
    ///
    /// Patterns are compiled before taking the write lock, so readers only ever
    /// see the old or the new set. If persisting fails the old set stays active.
    /// Concurrent calls are serialized; the set left in memory is the one on disk.
    pub fn replace(&self, rules: Vec<SecurityRule>) -> anyhow::Result<()> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = &self.path {
            save(path, &rules)?;
        }
        let next = Arc::new(RuleSet::compile(rules));
        let count = next.len();
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = next;
        info!("Whitelist replaced with {} rules", count);
        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create rules directory: {}", parent.display()))?;
    }
    Ok(())
}

fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    ensure_parent_dir(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // Unique temp name in the target directory, so the rename stays on one filesystem
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(data)
        .with_context(|| format!("Failed to write temp file: {}", tmp.path().display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

pub fn load(path: &Path) -> anyhow::Result<PersistedRules> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let persisted: PersistedRules =
        serde_json::from_str(&raw).with_context(|| format!("Invalid rules JSON at {}", path.display()))?;
    Ok(persisted)
}

pub fn save(path: &Path, rules: &[SecurityRule]) -> anyhow::Result<()> {
    let persisted = PersistedRules {
        rules: rules.to_vec(),
    };
    let data = serde_json::to_vec_pretty(&persisted).context("Failed to serialize rules")?;
    write_atomic(path, &data)
}

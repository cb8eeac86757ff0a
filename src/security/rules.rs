//! Security rule definitions and the built-in default rule set.
//!
//! Rules are plain data (pattern strings plus metadata) so the whitelist can be
//! updated at runtime without rebuilding the binary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a matching rule does to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Block,
    RequireConfirmation,
}

/// Ordinal severity of a rule match. Ordering is `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// Category tag used to pick alternative suggestions for a blocked command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    RecursiveDelete,
    ForcedDelete,
    DiskFormat,
    Shutdown,
    Registry,
    Service,
    Network,
    ProcessKill,
    ReadOnly,
}

impl RuleCategory {
    /// Safer alternatives to offer when a rule of this category blocks a command.
    pub fn alternatives(&self) -> &'static [&'static str] {
        match self {
            RuleCategory::RecursiveDelete => &[
                "Get-ChildItem <path> -Recurse  # review what would be deleted first",
                "Move-Item <path> <backup-location>  # keep a backup instead of deleting",
                "Remove-Item <path> -Recurse -WhatIf  # preview the deletion",
            ],
            RuleCategory::ForcedDelete => &[
                "Remove-Item <path>  # without -Force, read-only and hidden items are kept",
                "Remove-Item <path> -WhatIf  # preview the deletion",
            ],
            RuleCategory::DiskFormat => &[
                "Get-Disk  # inspect attached disks first",
                "Get-Volume  # inspect volumes and their file systems",
            ],
            RuleCategory::Shutdown => &[
                "shutdown /r /t 3600  # schedule a delayed restart instead",
                "Restart-Computer -WhatIf  # preview the restart",
            ],
            RuleCategory::Registry => &[
                "reg export <key> backup.reg  # export the key before changing it",
                "Get-ItemProperty <key>  # inspect current values first",
            ],
            RuleCategory::Service => &[
                "Get-Service <name>  # check the service status first",
            ],
            RuleCategory::Network => &[
                "Resolve-DnsName <host>  # check the target host first",
                "Test-NetConnection <host>  # check reachability without downloading",
            ],
            RuleCategory::ProcessKill => &[
                "Get-Process <name>  # identify the process first",
                "Stop-Process -Name <name>  # stop gracefully without -Force",
            ],
            RuleCategory::ReadOnly => &[],
        }
    }
}

/// A single whitelist rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub pattern: String,
    pub action: RuleAction,
    pub risk_level: RiskLevel,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<RuleCategory>,
}

impl SecurityRule {
    pub fn new(
        pattern: impl Into<String>,
        action: RuleAction,
        risk_level: RiskLevel,
        description: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            action,
            risk_level,
            description: description.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: RuleCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// The rule set used when no persisted rules exist.
pub fn default_rules() -> Vec<SecurityRule> {
    use RiskLevel::*;
    use RuleAction::*;

    vec![
        SecurityRule::new(
            r"(?:\bRemove-Item\b|\brm\b|\bdel\b|\brmdir\b|\brd\b).*(?:-Recurse\b.*-Force\b|-Force\b.*-Recurse\b)|\brm\s+-(?:rf|fr)\b",
            Block,
            Critical,
            "Recursive forced deletion",
        )
        .with_category(RuleCategory::RecursiveDelete),
        SecurityRule::new(
            r"(?:\bRemove-Item\b|\brm\b|\bdel\b).*-Force\b|\bdel\s+/f\b",
            Block,
            High,
            "Forced deletion",
        )
        .with_category(RuleCategory::ForcedDelete),
        SecurityRule::new(
            r"\bFormat-Volume\b|\bClear-Disk\b|\bInitialize-Disk\b|\bformat\s+[a-z]:",
            Block,
            Critical,
            "Disk format",
        )
        .with_category(RuleCategory::DiskFormat),
        SecurityRule::new(
            r"\bStop-Computer\b|\bRestart-Computer\b|\bshutdown\b",
            RequireConfirmation,
            High,
            "System shutdown or restart",
        )
        .with_category(RuleCategory::Shutdown),
        SecurityRule::new(
            r"(?:\bSet-ItemProperty\b|\bNew-ItemProperty\b|\bRemove-ItemProperty\b|\bNew-Item\b|\bRemove-Item\b|\breg\s+(?:add|delete|import)\b).*\bHKLM\b",
            RequireConfirmation,
            High,
            "HKLM registry modification",
        )
        .with_category(RuleCategory::Registry),
        SecurityRule::new(
            r"\b(?:Start|Stop|Set|Restart)-Service\b",
            RequireConfirmation,
            Medium,
            "Service state change",
        )
        .with_category(RuleCategory::Service),
        SecurityRule::new(
            r"\bInvoke-WebRequest\b|\bInvoke-RestMethod\b|\biwr\b|\birm\b|\bcurl\b|\bwget\b|\bStart-BitsTransfer\b",
            RequireConfirmation,
            Medium,
            "Outbound network request",
        )
        .with_category(RuleCategory::Network),
        SecurityRule::new(
            r"\bStop-Process\b.*-Force\b|\btaskkill\b.*/f\b|\bkill\s+-9\b",
            RequireConfirmation,
            Medium,
            "Forced process termination",
        )
        .with_category(RuleCategory::ProcessKill),
        SecurityRule::new(
            r"\b(?:Get|Select|Where|Sort|Measure|Format)-[a-z]+",
            Allow,
            Low,
            "Read-only cmdlet",
        )
        .with_category(RuleCategory::ReadOnly),
    ]
}

//! Rule-based whitelist validation.
//!
//! Every rule in the active set is evaluated against the command; a command can
//! match several rules, and every blocking match is reported.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::permissions::Permission;
use super::rules::{RiskLevel, RuleAction};
use super::store::{RuleSet, RuleStore};

/// Verdict for a single command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub blocked_reasons: Vec<String>,
    pub required_permissions: Vec<Permission>,
    pub suggested_alternatives: Vec<String>,
    pub risk_assessment: RiskLevel,
}

/// Applies the rules held by a [`RuleStore`] to command strings.
pub struct WhitelistValidator {
    store: RuleStore,
}

impl WhitelistValidator {
    pub fn new(store: RuleStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// Validate a command against the current rule set.
    ///
    /// `required_permissions` is left empty; the permission tier fills it in.
    pub fn validate(&self, command: &str) -> ValidationResult {
        let rules = self.store.snapshot();
        evaluate(&rules, command)
    }
}

/// Evaluate `command` against a rule snapshot.
pub fn evaluate(rules: &RuleSet, command: &str) -> ValidationResult {
    let normalized = normalize(command);
    let mut result = ValidationResult::default();

    for compiled in rules.iter() {
        if !compiled.is_match(&normalized) {
            continue;
        }
        let rule = &compiled.rule;
        result.risk_assessment = result.risk_assessment.max(rule.risk_level);

        match rule.action {
            RuleAction::Block => {
                result
                    .blocked_reasons
                    .push(format!("Blocked by rule: {}", rule.description));
                if let Some(category) = rule.category {
                    for alt in category.alternatives() {
                        if !result.suggested_alternatives.iter().any(|a| a == alt) {
                            result.suggested_alternatives.push((*alt).to_string());
                        }
                    }
                }
            }
            // Confirmation is decided by the permission tier
            RuleAction::RequireConfirmation | RuleAction::Allow => {}
        }
    }

    result.is_valid = result.blocked_reasons.is_empty();
    debug!(
        "Validated '{}': valid={} risk={} reasons={}",
        normalized,
        result.is_valid,
        result.risk_assessment,
        result.blocked_reasons.len()
    );
    result
}

/// Collapse runs of whitespace into single spaces and trim the ends.
fn normalize(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::rules::{default_rules, SecurityRule};

    fn validator() -> WhitelistValidator {
        WhitelistValidator::new(RuleStore::in_memory(default_rules()))
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Get-Process   -Name\tfoo  "), "Get-Process -Name foo");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_recursive_forced_deletion_is_blocked() {
        let result = validator().validate(r"Remove-Item C:\data -Recurse -Force");

        assert!(!result.is_valid);
        assert_eq!(result.risk_assessment, RiskLevel::Critical);
        assert!(result
            .blocked_reasons
            .contains(&"Blocked by rule: Recursive forced deletion".to_string()));
        // Every blocking rule is reported
        assert!(result
            .blocked_reasons
            .contains(&"Blocked by rule: Forced deletion".to_string()));
        assert!(result
            .suggested_alternatives
            .iter()
            .any(|a| a.starts_with("Get-ChildItem")));
    }

    #[test]
    fn test_flag_order_does_not_matter() {
        let result = validator().validate(r"remove-item C:\data -force -recurse");
        assert!(!result.is_valid);
        assert_eq!(result.risk_assessment, RiskLevel::Critical);
    }

    #[test]
    fn test_unix_rm_rf_is_blocked() {
        let result = validator().validate("rm -rf /");
        assert!(!result.is_valid);
        assert_eq!(result.risk_assessment, RiskLevel::Critical);
    }

    #[test]
    fn test_read_only_command_is_allowed() {
        let result = validator().validate("Get-Process");

        assert!(result.is_valid);
        assert!(result.blocked_reasons.is_empty());
        assert!(result.required_permissions.is_empty());
        assert_eq!(result.risk_assessment, RiskLevel::Low);
    }

    #[test]
    fn test_require_confirmation_does_not_block() {
        let result = validator().validate("Stop-Service -Name Spooler");

        assert!(result.is_valid);
        assert_eq!(result.risk_assessment, RiskLevel::Medium);
        assert!(result.suggested_alternatives.is_empty());
    }

    #[test]
    fn test_disk_format_is_blocked() {
        let result = validator().validate("Format-Volume -DriveLetter D");

        assert!(!result.is_valid);
        assert_eq!(result.risk_assessment, RiskLevel::Critical);
        assert!(result.suggested_alternatives.iter().any(|a| a.starts_with("Get-Disk")));
    }

    #[test]
    fn test_risk_is_max_over_all_matches() {
        // Allow/Low read-only verb plus RequireConfirmation/Medium network call
        let result = validator().validate("Get-Content urls.txt | Invoke-WebRequest");

        assert!(result.is_valid);
        assert_eq!(result.risk_assessment, RiskLevel::Medium);
    }

    #[test]
    fn test_block_dominates_allow_matches() {
        let store = RuleStore::in_memory(vec![
            SecurityRule::new("foo", RuleAction::Allow, RiskLevel::Low, "a"),
            SecurityRule::new("foo", RuleAction::Allow, RiskLevel::Low, "b"),
            SecurityRule::new("foo bar", RuleAction::Block, RiskLevel::Medium, "no bar"),
            SecurityRule::new("foo", RuleAction::Allow, RiskLevel::Low, "c"),
        ]);
        let result = WhitelistValidator::new(store).validate("foo   bar");

        assert!(!result.is_valid);
        assert_eq!(result.blocked_reasons, vec!["Blocked by rule: no bar".to_string()]);
        assert_eq!(result.risk_assessment, RiskLevel::Medium);
    }

    #[test]
    fn test_invalid_pattern_does_not_abort_validation() {
        let store = RuleStore::in_memory(vec![
            SecurityRule::new("([", RuleAction::Block, RiskLevel::Critical, "broken"),
            SecurityRule::new("danger", RuleAction::Block, RiskLevel::High, "danger"),
        ]);
        let result = WhitelistValidator::new(store).validate("danger zone");

        assert_eq!(result.blocked_reasons, vec!["Blocked by rule: danger".to_string()]);
        assert_eq!(result.risk_assessment, RiskLevel::High);
    }

    #[test]
    fn test_no_match_is_valid_and_low() {
        let result = validator().validate("echo hello");
        assert!(result.is_valid);
        assert_eq!(result.risk_assessment, RiskLevel::Low);
    }

    #[test]
    fn test_uncategorised_block_has_no_alternatives() {
        let store = RuleStore::in_memory(vec![SecurityRule::new(
            "secret",
            RuleAction::Block,
            RiskLevel::High,
            "secret access",
        )]);
        let result = WhitelistValidator::new(store).validate("cat secret");
        assert!(!result.is_valid);
        assert!(result.suggested_alternatives.is_empty());
    }

    #[test]
    fn test_validity_tracks_blocked_reasons() {
        let v = validator();
        for cmd in [
            "Get-ChildItem",
            "Remove-Item x -Force",
            "Restart-Computer",
            "Clear-Disk -Number 1",
            "",
        ] {
            let result = v.validate(cmd);
            assert_eq!(result.is_valid, result.blocked_reasons.is_empty(), "{}", cmd);
        }
    }
}

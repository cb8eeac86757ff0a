//! Permission inference from command text.
//!
//! Purely textual: the inferencer does not care whether the whitelist blocked
//! the command, so callers can always report what it would have needed.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// An elevated capability a command may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Admin,
    Write,
    Execute,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::Admin => "admin",
            Permission::Write => "write",
            Permission::Execute => "execute",
        };
        write!(f, "{}", name)
    }
}

const ADMIN_PATTERNS: &[&str] = &[
    r"\b(?:Start|Stop|Set|Restart|New|Remove)-Service\b",
    r"\bHKLM\b",
    r"\b(?:Stop|Restart)-Computer\b",
    r"\bshutdown\b",
    r"\bSet-ExecutionPolicy\b",
    r"\b(?:Format-Volume|Clear-Disk|Initialize-Disk)\b",
    r"\b(?:Add|Remove)-LocalGroupMember\b",
    r"\b(?:New|Remove|Set)-LocalUser\b",
    r"-Verb\s+RunAs\b",
    r"\bsudo\b",
    r"\bStop-Process\b.*-Force\b",
    r"\btaskkill\b.*/f\b",
    r"\bkill\s+-9\b",
];

const WRITE_PATTERNS: &[&str] = &[
    r"\b(?:Set|New|Remove|Add|Clear|Move|Copy|Rename)-Item(?:Property)?\b",
    r"\b(?:Set|Add|Clear)-Content\b",
    r"\bOut-File\b",
    r"\b(?:Export|Compress|Expand)-[a-z]+\b",
    r"\b(?:rm|mv|cp|mkdir|rmdir|del|touch)\b",
    r">>?",
];

const EXECUTE_PATTERNS: &[&str] = &[
    r"\bStart-Process\b",
    r"\b(?:Invoke-Expression|iex)\b",
    r"\bInvoke-Command\b",
    r"\bStart-Job\b",
    r"&\s*['\x22]?[\w\\/.:-]+\.(?:exe|bat|cmd|ps1)\b",
    r"\.[\\/][\w.-]+\.(?:exe|bat|cmd|ps1)\b",
    r"\bcmd(?:\.exe)?\s+/c\b",
    r"\b(?:powershell|pwsh)(?:\.exe)?\s+-(?:Command|File|EncodedCommand)\b",
    // Outbound transfers can pull and run remote content
    r"\b(?:Invoke-WebRequest|Invoke-RestMethod|iwr|irm|curl|wget|Start-BitsTransfer)\b",
];

/// Infers required permissions from three independent pattern lists.
pub struct PermissionInferencer {
    categories: Vec<(Permission, Vec<Regex>)>,
}

impl Default for PermissionInferencer {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionInferencer {
    pub fn new() -> Self {
        Self {
            categories: vec![
                (Permission::Admin, compile_patterns(ADMIN_PATTERNS)),
                (Permission::Write, compile_patterns(WRITE_PATTERNS)),
                (Permission::Execute, compile_patterns(EXECUTE_PATTERNS)),
            ],
        }
    }

    /// Permissions `command` would need, in `Admin, Write, Execute` order.
    pub fn infer(&self, command: &str) -> Vec<Permission> {
        self.categories
            .iter()
            .filter(|(_, patterns)| patterns.iter().any(|re| re.is_match(command)))
            .map(|(permission, _)| *permission)
            .collect()
    }
}

fn compile_patterns(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match RegexBuilder::new(p).case_insensitive(true).build() {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Skipping invalid permission pattern '{}': {}", p, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtin_patterns_compile() {
        let inferencer = PermissionInferencer::new();
        let counts: Vec<usize> = inferencer.categories.iter().map(|(_, p)| p.len()).collect();
        assert_eq!(
            counts,
            vec![ADMIN_PATTERNS.len(), WRITE_PATTERNS.len(), EXECUTE_PATTERNS.len()]
        );
    }

    #[test]
    fn test_read_only_needs_nothing() {
        let inferencer = PermissionInferencer::new();
        assert!(inferencer.infer("Get-Process").is_empty());
        assert!(inferencer.infer("Get-ChildItem C:\\Users | Sort-Object Length").is_empty());
    }

    #[test]
    fn test_service_control_needs_admin() {
        let inferencer = PermissionInferencer::new();
        assert_eq!(inferencer.infer("Stop-Service -Name Spooler"), vec![Permission::Admin]);
    }

    #[test]
    fn test_categories_are_independent() {
        let inferencer = PermissionInferencer::new();
        let perms = inferencer.infer(r"Set-ItemProperty -Path HKLM:\Software\App -Name X -Value 1");
        assert_eq!(perms, vec![Permission::Admin, Permission::Write]);

        let perms = inferencer.infer(r"Start-Process notepad.exe -Verb RunAs; Out-File log.txt");
        assert_eq!(
            perms,
            vec![Permission::Admin, Permission::Write, Permission::Execute]
        );
    }

    #[test]
    fn test_execute_detection() {
        let inferencer = PermissionInferencer::new();
        assert_eq!(inferencer.infer(r".\setup.exe /quiet"), vec![Permission::Execute]);
        assert_eq!(inferencer.infer("Invoke-Expression $payload"), vec![Permission::Execute]);
        assert_eq!(inferencer.infer("cmd /c dir"), vec![Permission::Execute]);
    }

    #[test]
    fn test_each_permission_reported_once() {
        let inferencer = PermissionInferencer::new();
        // Matches several write patterns
        let perms = inferencer.infer("Remove-Item a; Copy-Item b c; Set-Content d e");
        assert_eq!(perms, vec![Permission::Write]);
    }

    #[test]
    fn test_network_calls_need_execute() {
        let inferencer = PermissionInferencer::new();
        for cmd in [
            "Invoke-WebRequest http://example.com",
            "iwr http://example.com -OutFile x",
            "curl http://evil.sh",
            "wget http://example.com/a.zip",
            "Start-BitsTransfer -Source http://example.com/a",
        ] {
            assert!(inferencer.infer(cmd).contains(&Permission::Execute), "{}", cmd);
        }
    }

    #[test]
    fn test_forced_kills_need_admin() {
        let inferencer = PermissionInferencer::new();
        for cmd in ["Stop-Process -Name explorer -Force", "taskkill /f /im x.exe", "kill -9 1234"] {
            assert!(inferencer.infer(cmd).contains(&Permission::Admin), "{}", cmd);
        }
        assert!(inferencer.infer("Stop-Process -Name notepad").is_empty());
    }

    #[test]
    fn test_blocked_commands_still_inferred() {
        let inferencer = PermissionInferencer::new();
        let perms = inferencer.infer(r"Remove-Item C:\data -Recurse -Force");
        assert_eq!(perms, vec![Permission::Write]);
    }
}

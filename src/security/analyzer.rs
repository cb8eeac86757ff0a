//! Risk wording for the confirmation prompt.

use super::Permission;

/// Build the human-readable risk description shown with a confirmation prompt.
pub fn describe_risk(cmd: &str, permissions: &[Permission]) -> String {
    let lowered = cmd.to_lowercase();
    let mut clauses: Vec<&str> = Vec::new();

    for permission in permissions {
        clauses.push(match permission {
            Permission::Admin => "requires administrative privileges",
            Permission::Write => "will modify files or system state",
            Permission::Execute => "will execute external programs",
        });
    }
    if clauses.is_empty() {
        clauses.push("requires elevated permissions");
    }

    if lowered.contains("remove-item") && lowered.contains("-force") {
        clauses.push("forcibly deletes items");
    }
    if lowered.contains("stop-service") || lowered.contains("start-service") {
        clauses.push("changes the state of a system service");
    }
    if lowered.contains("set-executionpolicy") {
        clauses.push("changes the PowerShell execution policy");
    }

    let destructive = ["format-volume", "clear-disk", "initialize-disk"]
        .iter()
        .any(|k| lowered.contains(k))
        || formats_drive_letter(&lowered);
    if destructive {
        clauses.push("formats a disk");
    }

    let sentence = format!("This command {}.", clauses.join(" and "));
    if destructive {
        format!("DESTRUCTIVE: {}", sentence)
    } else {
        sentence
    }
}

/// `format <letter>:` as typed at a cmd prompt.
fn formats_drive_letter(lowered: &str) -> bool {
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    tokens.windows(2).any(|pair| {
        let drive = pair[1].as_bytes();
        pair[0] == "format" && drive.len() >= 2 && drive[0].is_ascii_alphabetic() && drive[1] == b':'
    })
}

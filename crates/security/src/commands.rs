//! Command classification: safe read-only commands, shell metacharacters,
//! destructive patterns and user-configured auto-approve globs.

use glob::Pattern;

/// Read-only commands that never need approval. Two-word entries are
/// matched against the first two tokens of the command.
pub const SAFE_COMMANDS: &[&str] = &[
    "ls",
    "pwd",
    "echo",
    "cat",
    "git status",
    "git log",
    "git diff",
    "grep",
    "find",
    "which",
    "whoami",
    "date",
    "tree",
    "head",
    "tail",
    "less",
];

/// Chaining, piping, redirection and substitution operators.
pub const SHELL_METACHARACTERS: &[&str] = &["&&", "||", ";", "|", ">", "<", "`", "$("];

/// Substrings that disqualify a command from scope elevation. Matched
/// against the lowercased command.
pub const DANGEROUS_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "sudo ",
    "shutdown",
    "reboot",
    "mkfs",
    "dd if=",
    ":(){",
    "halt",
    "chmod 777 /",
    "rm -rf ~",
    "rm -rf $home",
];

/// The first shell metacharacter found in `cmd`, if any.
pub fn find_metacharacter(cmd: &str) -> Option<&'static str> {
    SHELL_METACHARACTERS.iter().copied().find(|m| cmd.contains(m))
}

/// The first dangerous pattern found in `cmd`, if any.
pub fn find_dangerous(cmd: &str) -> Option<&'static str> {
    let lower = cmd.trim().to_lowercase();
    DANGEROUS_PATTERNS.iter().copied().find(|d| lower.contains(d))
}

/// Whether `cmd` is a plain invocation of a read-only command.
///
/// Any shell metacharacter disqualifies the command regardless of its base.
pub fn is_safe_command(cmd: &str) -> bool {
    if cmd.trim().is_empty() || find_metacharacter(cmd).is_some() {
        return false;
    }

    let tokens: Vec<&str> = cmd.split_whitespace().collect();
    if tokens.len() >= 2 {
        let two_word = format!("{} {}", tokens[0], tokens[1]);
        if SAFE_COMMANDS.contains(&two_word.as_str()) {
            return true;
        }
    }

    SAFE_COMMANDS.contains(&tokens[0])
}

/// The first configured glob pattern that matches the whole (trimmed)
/// command. `*` also matches `/`. Invalid patterns are skipped.
pub fn matching_auto_approve<'p>(cmd: &str, patterns: &'p [String]) -> Option<&'p str> {
    let cmd = cmd.trim();
    if cmd.is_empty() {
        return None;
    }

    patterns.iter().map(String::as_str).find(|raw| match Pattern::new(raw) {
        Ok(pattern) => pattern.matches(cmd),
        Err(e) => {
            tracing::warn!(pattern = %raw, error = %e, "Ignoring invalid auto-approve pattern");
            false
        }
    })
}

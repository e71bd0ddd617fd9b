//! Destructive command classification.
//!
//! Pattern-based, case-insensitive detection of shell idioms that commonly
//! cause irreversible damage. This is a heuristic: it flags commands for
//! human review and makes no attempt to understand shell syntax.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Size of the head and tail windows scanned in very long commands.
/// The full command is still what gets executed.
pub const MAX_SCAN_CHARS: usize = 64 * 1024;

/// A single destructive-command rule.
///
/// Rules are independent of each other; the order of [`Rule::ALL`] only
/// decides which rule gets reported when several match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    RecursiveRemove,
    PowerState,
    FormatFilesystem,
    RawDeviceWrite,
    PrivilegedDestructive,
    RecursiveChown,
    RecursiveChmod,
    RemoteScriptPipe,
}

impl Rule {
    pub const ALL: [Rule; 8] = [
        Rule::RecursiveRemove,
        Rule::PowerState,
        Rule::FormatFilesystem,
        Rule::RawDeviceWrite,
        Rule::PrivilegedDestructive,
        Rule::RecursiveChown,
        Rule::RecursiveChmod,
        Rule::RemoteScriptPipe,
    ];

    /// Human readable description, shown in the confirmation prompt.
    pub fn description(self) -> &'static str {
        match self {
            Rule::RecursiveRemove => "recursive or forced file removal",
            Rule::PowerState => "system power state change",
            Rule::FormatFilesystem => "filesystem formatting",
            Rule::RawDeviceWrite => "direct write to a block device",
            Rule::PrivilegedDestructive => "destructive command run with sudo",
            Rule::RecursiveChown => "recursive ownership change",
            Rule::RecursiveChmod => "recursive permission change",
            Rule::RemoteScriptPipe => "remote script piped into a shell",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Rule::RecursiveRemove => {
                r"(?i)\brm\s+(?:[^\s;|&]+\s+)*?(?:-[a-z]*[rf][a-z]*|--recursive|--force|--no-preserve-root)(?:\s|$)"
            }
            Rule::PowerState => r"(?i)\b(?:shutdown|halt|reboot|poweroff)\b|\binit\s+[06]\b",
            Rule::FormatFilesystem => r"(?i)\bmkfs(?:\.\w+)?\b|\bmke2fs\b|\bmkswap\b|\bwipefs\b",
            Rule::RawDeviceWrite => {
                r"(?i)\bdd\b.*\bof=/?dev/|>\s*/dev/(?:sd|hd|vd|xvd|nvme|mmcblk|disk)"
            }
            Rule::PrivilegedDestructive => {
                r"(?i)\bsudo\s+(?:-\S+\s+)*(?:rm|dd|mkfs(?:\.\w+)?|mount|umount|chmod|chown)\b"
            }
            Rule::RecursiveChown => {
                r"(?i)\bchown\s+(?:[^\s;|&]+\s+)*?(?:-[a-z]*r[a-z]*|--recursive)(?:\s|$)"
            }
            Rule::RecursiveChmod => {
                r"(?i)\bchmod\s+(?:[^\s;|&]+\s+)*?(?:-[a-z]*r[a-z]*|--recursive)(?:\s|$)"
            }
            Rule::RemoteScriptPipe => {
                r"(?i)\b(?:curl|wget)\b[^|]*\|\s*(?:sudo\s+)?(?:ba|z|k|da)?sh\b|\b(?:ba|z)?sh\s+<\(\s*(?:curl|wget)\b"
            }
        }
    }

    /// Check whether this rule matches the given command text.
    pub fn matches(self, command: &str) -> bool {
        PATTERNS[self as usize].is_match(command)
    }
}

// Indexed by `Rule as usize`; `Rule::ALL` is declared in discriminant order.
#[allow(clippy::expect_used)]
static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    Rule::ALL
        .iter()
        .map(|rule| Regex::new(rule.source()).expect("invalid destructive-command pattern"))
        .collect()
});

/// Outcome of classifying one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyVerdict {
    /// First rule that matched, if any.
    pub rule: Option<Rule>,
}

impl SafetyVerdict {
    pub fn flagged(&self) -> bool {
        self.rule.is_some()
    }
}

/// Ordered list of rules applied to every command.
#[derive(Debug, Clone)]
pub struct SafetyClassifier {
    rules: Vec<Rule>,
}

impl Default for SafetyClassifier {
    fn default() -> Self {
        Self::with_rules(Rule::ALL.to_vec())
    }
}

impl SafetyClassifier {
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Classify a command. Never fails; stops at the first matching rule.
    pub fn classify(&self, command: &str) -> SafetyVerdict {
        let (head, tail) = scan_windows(command.trim());
        let rule = self
            .rules
            .iter()
            .copied()
            .find(|rule| rule.matches(head) || tail.is_some_and(|tail| rule.matches(tail)));
        SafetyVerdict { rule }
    }
}

/// Shorthand for classifying with the default rule set.
pub fn is_possibly_destructive(command: &str) -> bool {
    SafetyClassifier::default().classify(command).flagged()
}

/// First and last `MAX_SCAN_CHARS` chars of `command`. The tail is `None`
/// when the head already covers the whole command.
fn scan_windows(command: &str) -> (&str, Option<&str>) {
    let Some((head_end, _)) = command.char_indices().nth(MAX_SCAN_CHARS) else {
        return (command, None);
    };
    let tail_start = command
        .char_indices()
        .rev()
        .nth(MAX_SCAN_CHARS - 1)
        .map_or(0, |(idx, _)| idx);
    (&command[..head_end], Some(&command[tail_start..]))
}

//! Prompt Shape Patterns
//!
//! The quick-pattern table matched against the line a shell is waiting on,
//! and the status-line cues that mark a pager waiting for a keypress.

use crate::error::{Error, Result};
use crate::models::InteractionType;
use regex::Regex;

/// One recognisable prompt shape
#[derive(Debug, Clone)]
pub struct QuickPattern {
    /// Stable identifier, used in logs
    pub name: &'static str,
    pub regex: Regex,
    pub interaction_type: InteractionType,
    /// Accepted answers, positive first
    pub confirm_values: Option<&'static [&'static str]>,
    /// Input that leaves the prompting program
    pub exit_key: Option<&'static str>,
    pub exit_append_newline: Option<bool>,
}

impl QuickPattern {
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

struct PatternDef {
    name: &'static str,
    source: &'static str,
    interaction_type: InteractionType,
    confirm_values: Option<&'static [&'static str]>,
    exit_key: Option<&'static str>,
    exit_append_newline: Option<bool>,
}

const fn def(name: &'static str, source: &'static str, interaction_type: InteractionType) -> PatternDef {
    PatternDef {
        name,
        source,
        interaction_type,
        confirm_values: None,
        exit_key: None,
        exit_append_newline: None,
    }
}

const YES_NO: &[&str] = &["yes", "no"];
const Y_N: &[&str] = &["y", "n"];

// First match wins, so the more specific shapes come first.
const BUILTIN_PATTERNS: &[PatternDef] = &[
    PatternDef {
        confirm_values: Some(YES_NO),
        ..def(
            "ssh-host-key",
            r"(?i)continue connecting \(yes/no(?:/\[fingerprint\])?\)\?\s*$",
            InteractionType::Confirm,
        )
    },
    def(
        "password",
        r"(?i)(?:password|passphrase|passcode|\bpin\b)[^:\n]{0,80}:\s*$",
        InteractionType::Password,
    ),
    PatternDef {
        confirm_values: Some(YES_NO),
        ..def(
            "yes-no",
            r"(?i)[\[(]\s*yes\s*/\s*no\s*[\])]\s*[?:]?\s*$",
            InteractionType::Confirm,
        )
    },
    PatternDef {
        confirm_values: Some(Y_N),
        ..def(
            "y-n",
            r"(?i)[\[(]\s*\[?y\]?\s*/\s*\[?n\]?\s*[\])]\s*[?:]?\s*$",
            InteractionType::Confirm,
        )
    },
    def(
        "select-menu",
        r"(?i)\b(?:enter|select|choose|pick)\b[^\n]{0,40}\b(?:number|choice|option|selection|item)s?\b[^\n]*[:?>]\s*$",
        InteractionType::Select,
    ),
    def("shell-select", r"^\s*#\?\s*$", InteractionType::Select),
    def(
        "press-enter",
        r"(?i)\b(?:press|hit)\s+(?:enter|return|\[enter\]|<enter>|any key)\b[^\n]*$",
        InteractionType::Enter,
    ),
    PatternDef {
        exit_key: Some("q"),
        exit_append_newline: Some(false),
        ..def("more", r"^\s*--More--", InteractionType::Pager)
    },
    PatternDef {
        exit_key: Some("exit()"),
        exit_append_newline: Some(true),
        ..def("python-repl", r"^>>>\s*$", InteractionType::Freeform)
    },
    PatternDef {
        exit_key: Some("exit"),
        exit_append_newline: Some(true),
        ..def(
            "mysql-repl",
            r"^(?:mysql|MariaDB \[[^\]]*\])>\s*$",
            InteractionType::Freeform,
        )
    },
    PatternDef {
        exit_key: Some("\\q"),
        exit_append_newline: Some(true),
        ..def("psql-repl", r"^[\w-]+=[#>]\s*$", InteractionType::Freeform)
    },
    def(
        "login",
        r"(?i)^\s*(?:username|user name|login|user)\s*:\s*$",
        InteractionType::Freeform,
    ),
    def(
        "freeform",
        r"(?i)^\s*(?:please\s+)?(?:enter|type|input|provide)\b[^\n]{1,80}:\s*$",
        InteractionType::Freeform,
    ),
];

const PAGER_CUE_PATTERNS: &[&str] = &[
    r"\(END\)\s*$",
    r"^\s*--More--",
    r"^\s*:\s*$",
    r"(?i)\blines \d+-\d+(?:/\d+)?",
    r"(?i)^\s*manual page \S+ line \d+",
    r"(?i)press h for help or q to quit",
    r"(?i)^\s*byte \d+",
    r"(?i)^\s*(?:less|most|more)\b.*\d+%",
];

fn compile(source: &str) -> Result<Regex> {
    Regex::new(source).map_err(|e| Error::PatternCompileFailed {
        pattern: source.to_string(),
        reason: e.to_string(),
    })
}

/// Compile the built-in quick-pattern table
pub fn builtin_quick_patterns() -> Result<Vec<QuickPattern>> {
    BUILTIN_PATTERNS
        .iter()
        .map(|d| {
            Ok(QuickPattern {
                name: d.name,
                regex: compile(d.source)?,
                interaction_type: d.interaction_type,
                confirm_values: d.confirm_values,
                exit_key: d.exit_key,
                exit_append_newline: d.exit_append_newline,
            })
        })
        .collect()
}

/// Status-line heuristics for a pager waiting on a keypress
#[derive(Debug, Clone, Default)]
pub struct PagerCues {
    cues: Vec<Regex>,
}

impl PagerCues {
    pub fn builtin() -> Result<Self> {
        let cues = PAGER_CUE_PATTERNS
            .iter()
            .map(|source| compile(source))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { cues })
    }

    /// Check whether a screen row looks like a pager status line
    pub fn is_cue(&self, row: &str) -> bool {
        self.cues.iter().any(|cue| cue.is_match(row))
    }
}

/// Pull a numbered menu out of the lines printed above a select prompt
///
/// Returns labels and the values to send for each, or `None` when no menu
/// precedes the prompt.
pub fn extract_menu<'a, I>(lines_before: I) -> Option<(Vec<String>, Vec<String>)>
where
    I: DoubleEndedIterator<Item = &'a str>,
{
    let mut entries = Vec::new();
    for line in lines_before.rev() {
        if line.trim().is_empty() {
            if entries.is_empty() {
                continue;
            }
            break;
        }
        match parse_menu_entry(line) {
            Some(entry) => entries.push(entry),
            None => break,
        }
    }

    if entries.is_empty() {
        return None;
    }
    entries.reverse();
    Some(entries.into_iter().unzip())
}

fn parse_menu_entry(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim_start();
    let (value, rest) = if let Some(inner) = trimmed.strip_prefix('[') {
        let close = inner.find(']')?;
        (&inner[..close], &inner[close + 1..])
    } else {
        let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
        let rest = &trimmed[digits..];
        let rest = rest
            .strip_prefix(')')
            .or_else(|| rest.strip_prefix('.'))
            .or_else(|| rest.strip_prefix(':'))?;
        (&trimmed[..digits], rest)
    };

    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let label = rest.trim();
    if label.is_empty() || !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((label.to_string(), value.to_string()))
}

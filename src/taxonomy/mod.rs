//! Command Taxonomy
//!
//! Read-only tables deciding how a command is treated by the interaction
//! detector: full-screen programs that may be auto-cancelled, programs that
//! are only interactive without certain flags, pagers, and prompt shapes.
//! Built once and shared by every detector through an `Arc`.

pub mod patterns;

use crate::config::DetectorConfig;
use crate::error::Result;
use crate::models::Classification;
use once_cell::sync::Lazy;
use patterns::{PagerCues, QuickPattern};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Bumped whenever the built-in tables change meaning
pub const TAXONOMY_VERSION: u32 = 1;

/// Programs that take over the screen whatever their arguments
const ALWAYS_TUI: &[&str] = &[
    "vim", "vi", "nvim", "vimdiff", "view", "nano", "pico", "emacs", "micro", "joe", "hx",
    "helix", "tmux", "screen", "byobu", "zellij", "htop", "btop", "atop", "iotop", "glances",
    "nmtui", "mc", "ranger", "nnn", "lf", "tig", "lazygit", "k9s", "watch", "ncdu", "alsamixer",
    "cfdisk", "iftop", "nethogs",
];

/// Interactive by default: `(program, non-interactive flags, positional argument demotes)`
const CONDITIONAL_TUI: &[(&str, &[&str], bool)] = &[
    ("top", &["-b", "-n", "--batch"], false),
    ("mysql", &["-e", "--execute", "-B", "--batch"], false),
    ("mariadb", &["-e", "--execute", "-B", "--batch"], false),
    ("psql", &["-c", "--command", "-f", "--file", "-l", "--list"], false),
    ("sqlite3", &["-batch", "-cmd"], false),
    ("mongosh", &["--eval", "-f", "--file"], true),
    ("mongo", &["--eval"], true),
    ("python", &["-c", "-m", "-V", "--version"], true),
    ("python3", &["-c", "-m", "-V", "--version"], true),
    ("ipython", &["-c", "-m"], true),
    ("node", &["-e", "--eval", "-p", "--print", "-v", "--version"], true),
    ("irb", &["-v", "--version"], true),
    ("lua", &["-e", "-v"], true),
    ("sftp", &["-b"], false),
    ("ftp", &["-n"], false),
    ("bc", &["-v", "--version"], true),
];

/// Programs that page their output
const PAGERS: &[&str] = &["less", "more", "most", "man", "pg", "journalctl"];

/// Programs that page only for some subcommands
const PAGER_SUBCOMMANDS: &[(&str, &[&str])] = &[
    ("git", &["log", "diff", "show", "blame", "reflog", "shortlog", "whatchanged"]),
    ("systemctl", &["status", "list-units", "list-unit-files", "cat", "show"]),
];

/// Launchers whose real program follows: `(name, options taking a value, leading positionals)`
const WRAPPERS: &[(&str, &[&str], usize)] = &[
    ("sudo", &["-u", "-g", "-h", "-p", "-C", "-D", "-U", "-r", "-t"], 0),
    ("doas", &["-u", "-C"], 0),
    ("env", &["-u", "-C", "-S"], 0),
    ("nohup", &[], 0),
    ("time", &["-f", "-o"], 0),
    ("nice", &["-n"], 0),
    ("ionice", &["-c", "-n"], 0),
    ("exec", &["-a"], 0),
    ("command", &[], 0),
    ("builtin", &[], 0),
    ("stdbuf", &["-i", "-o", "-e"], 0),
    ("timeout", &["-s", "-k"], 1),
];

/// Global options of programs with pager subcommands that take a value
const SUBCOMMAND_VALUE_OPTIONS: &[&str] = &["-C", "-c", "-H", "--git-dir", "--work-tree"];

/// Non-interactive flags for a conditionally interactive program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalRule {
    pub non_interactive_flags: Vec<String>,
    /// Any positional argument (a script, a query) makes the run non-interactive
    pub positional_demotes: bool,
}

impl ConditionalRule {
    fn is_demoted_by(&self, args: &[String]) -> bool {
        args.iter().any(|arg| {
            if self.positional_demotes && !arg.starts_with('-') {
                return true;
            }
            self.non_interactive_flags
                .iter()
                .any(|flag| flag_matches(arg, flag))
        })
    }
}

/// How a command string was classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandProfile {
    /// Program that decided the classification
    pub program: Option<String>,
    /// `None` for pager commands
    pub classification: Option<Classification>,
}

impl CommandProfile {
    pub fn is_pager(&self) -> bool {
        self.classification.is_none()
    }

    pub fn auto_cancel(&self) -> bool {
        self.classification.is_some_and(Classification::auto_cancel)
    }
}

/// Ordered from least to most interactive; the strongest segment wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SegmentKind {
    Plain,
    Pager,
    Conditional,
    Always,
}

impl SegmentKind {
    fn classification(self) -> Option<Classification> {
        match self {
            SegmentKind::Plain => Some(Classification::NonBlacklist),
            SegmentKind::Pager => None,
            SegmentKind::Conditional => Some(Classification::Conditional),
            SegmentKind::Always => Some(Classification::Always),
        }
    }
}

/// Static classification and pattern tables
#[derive(Debug, Clone)]
pub struct Taxonomy {
    version: u32,
    always: HashSet<String>,
    conditional: HashMap<String, ConditionalRule>,
    pagers: HashSet<String>,
    pager_subcommands: HashMap<String, Vec<String>>,
    quick_patterns: Vec<QuickPattern>,
    pager_cues: PagerCues,
}

static SHARED: Lazy<Arc<Taxonomy>> = Lazy::new(|| match Taxonomy::builtin() {
    Ok(taxonomy) => Arc::new(taxonomy),
    Err(e) => {
        error!("Failed to build prompt tables, prompt matching disabled: {}", e);
        Arc::new(Taxonomy::lists_only())
    }
});

impl Taxonomy {
    /// Build the built-in tables
    pub fn builtin() -> Result<Self> {
        let mut taxonomy = Self::lists_only();
        taxonomy.quick_patterns = patterns::builtin_quick_patterns()?;
        taxonomy.pager_cues = PagerCues::builtin()?;
        Ok(taxonomy)
    }

    fn lists_only() -> Self {
        Self {
            version: TAXONOMY_VERSION,
            always: ALWAYS_TUI.iter().map(|s| s.to_string()).collect(),
            conditional: CONDITIONAL_TUI
                .iter()
                .map(|(program, flags, positional_demotes)| {
                    (
                        program.to_string(),
                        ConditionalRule {
                            non_interactive_flags: flags.iter().map(|f| f.to_string()).collect(),
                            positional_demotes: *positional_demotes,
                        },
                    )
                })
                .collect(),
            pagers: PAGERS.iter().map(|s| s.to_string()).collect(),
            pager_subcommands: PAGER_SUBCOMMANDS
                .iter()
                .map(|(program, subs)| {
                    (
                        program.to_string(),
                        subs.iter().map(|s| s.to_string()).collect(),
                    )
                })
                .collect(),
            quick_patterns: Vec::new(),
            pager_cues: PagerCues::default(),
        }
    }

    /// The process-wide built-in taxonomy
    pub fn shared() -> Arc<Taxonomy> {
        SHARED.clone()
    }

    /// The shared taxonomy, extended with user additions when configured
    pub fn for_config(config: &DetectorConfig) -> Arc<Taxonomy> {
        if config.extra_always_tui.is_empty() && config.extra_pagers.is_empty() {
            return Self::shared();
        }

        let mut taxonomy = (*Self::shared()).clone();
        taxonomy.always.extend(config.extra_always_tui.iter().cloned());
        taxonomy.pagers.extend(config.extra_pagers.iter().cloned());
        Arc::new(taxonomy)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn quick_patterns(&self) -> &[QuickPattern] {
        &self.quick_patterns
    }

    /// First quick pattern matching the line a shell is waiting on
    pub fn match_prompt(&self, line: &str) -> Option<&QuickPattern> {
        self.quick_patterns.iter().find(|p| p.is_match(line))
    }

    pub fn is_pager_cue(&self, row: &str) -> bool {
        self.pager_cues.is_cue(row)
    }

    pub fn is_always_tui(&self, program: &str) -> bool {
        self.always.contains(program)
    }

    pub fn is_pager_program(&self, program: &str) -> bool {
        self.pagers.contains(program)
    }

    /// Classify a command line
    ///
    /// Pipelines and command lists are split into segments and the most
    /// interactive segment decides. Anything unrecognised is non-blacklist.
    pub fn classify(&self, command: &str) -> CommandProfile {
        let mut best = (SegmentKind::Plain, None);

        for segment in split_command_list(command) {
            let tokens = tokenize(&segment.text);
            let (kind, program) = self.classify_segment(&tokens, segment.piped_onward);
            if program.is_some() && (best.1.is_none() || kind > best.0) {
                best = (kind, program);
            }
        }

        let (kind, program) = best;
        CommandProfile {
            program,
            classification: kind.classification(),
        }
    }

    fn classify_segment(&self, tokens: &[String], piped_onward: bool) -> (SegmentKind, Option<String>) {
        let Some(index) = program_index(tokens) else {
            return (SegmentKind::Plain, None);
        };
        let program = program_name(&tokens[index]).to_string();
        let args = &tokens[index + 1..];

        if self.always.contains(&program) {
            return (SegmentKind::Always, Some(program));
        }

        if let Some(rule) = self.conditional.get(&program) {
            let kind = if rule.is_demoted_by(args) {
                SegmentKind::Plain
            } else {
                SegmentKind::Conditional
            };
            return (kind, Some(program));
        }

        // A pager writing into a pipe behaves like cat.
        if piped_onward || args.iter().any(|a| a == "--no-pager") {
            return (SegmentKind::Plain, Some(program));
        }

        if self.pagers.contains(&program) {
            return (SegmentKind::Pager, Some(program));
        }

        if let Some(subcommands) = self.pager_subcommands.get(&program) {
            if first_subcommand(args).is_some_and(|sub| subcommands.iter().any(|s| s == sub)) {
                return (SegmentKind::Pager, Some(program));
            }
        }

        (SegmentKind::Plain, Some(program))
    }
}

struct Segment {
    text: String,
    /// Output feeds another command through `|`
    piped_onward: bool,
}

/// Split on `|`, `||`, `&&`, `&`, `;` and newlines outside quotes
fn split_command_list(command: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = command.chars().peekable();
    let mut quote: Option<char> = None;

    let mut finish = |current: &mut String, piped_onward: bool| {
        let text = std::mem::take(current);
        if !text.trim().is_empty() {
            segments.push(Segment { text, piped_onward });
        }
    };

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some('"'), '\\') | (None, '\\') => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '|') => match chars.peek() {
                Some('|') => {
                    chars.next();
                    finish(&mut current, false);
                }
                Some('&') => {
                    chars.next();
                    finish(&mut current, true);
                }
                _ => finish(&mut current, true),
            },
            (None, '&') => {
                if chars.peek() == Some(&'&') {
                    chars.next();
                } else if current.ends_with('>') || chars.peek() == Some(&'>') {
                    // Redirection such as `2>&1` or `&>`.
                    current.push(c);
                    continue;
                }
                finish(&mut current, false);
            }
            (None, ';' | '\n') => finish(&mut current, false),
            (None, c) => current.push(c),
        }
    }
    finish(&mut current, false);

    segments
}

fn tokenize(segment: &str) -> Vec<String> {
    shell_words::split(segment)
        .unwrap_or_else(|_| segment.split_whitespace().map(str::to_string).collect())
}

/// Strip a path prefix and an alias-bypassing backslash
fn program_name(token: &str) -> &str {
    let name = token.rsplit('/').next().unwrap_or(token);
    name.trim_start_matches('\\')
}

fn is_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && !name.starts_with(|c: char| c.is_ascii_digit())
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

/// Index of the token naming the program that actually runs
fn program_index(tokens: &[String]) -> Option<usize> {
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if is_assignment(token) {
            i += 1;
            continue;
        }

        let name = program_name(token);
        let Some((_, value_options, positionals)) = WRAPPERS.iter().find(|(w, _, _)| *w == name)
        else {
            return Some(i);
        };

        i += 1;
        while let Some(option) = tokens.get(i).filter(|t| t.starts_with('-')) {
            i += 1;
            if option == "--" {
                break;
            }
            if value_options.contains(&option.as_str()) {
                i += 1;
            }
        }
        i += positionals;
    }
    None
}

fn first_subcommand(args: &[String]) -> Option<&str> {
    let mut i = 0;
    while let Some(arg) = args.get(i) {
        if !arg.starts_with('-') {
            return Some(arg.as_str());
        }
        i += if SUBCOMMAND_VALUE_OPTIONS.contains(&arg.as_str()) { 2 } else { 1 };
    }
    None
}

/// Whether an argument carries a flag, in any of its usual spellings
fn flag_matches(arg: &str, flag: &str) -> bool {
    if arg == flag {
        return true;
    }

    if flag.starts_with("--") {
        return arg
            .strip_prefix(flag)
            .is_some_and(|rest| rest.starts_with('='));
    }

    // Single-letter short option: `-n1`, `-cprint(1)`, or a small cluster like `-bn`.
    let Some(letter) = flag.strip_prefix('-').filter(|l| l.len() == 1) else {
        return false;
    };
    let Some(body) = arg.strip_prefix('-').filter(|b| !b.starts_with('-')) else {
        return false;
    };
    body.starts_with(letter)
        || (body.len() <= 3 && body.chars().all(|c| c.is_ascii_alphabetic()) && body.contains(letter))
}

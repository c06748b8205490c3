//! ANSI escape handling
//!
//! Both helpers sit on top of a `vte` parser so malformed or truncated
//! sequences degrade to ordinary text instead of failing.

use vte::{Params, Parser, Perform};

/// DEC private modes that switch to the alternate screen buffer
const ALTERNATE_SCREEN_MODES: [u16; 3] = [1049, 1047, 47];

/// Collects printable text, dropping every escape sequence
#[derive(Default)]
struct TextCollector {
    text: String,
}

impl Perform for TextCollector {
    fn print(&mut self, c: char) {
        self.text.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.text.push('\n'),
            b'\t' => self.text.push('\t'),
            _ => {}
        }
    }
}

/// Remove display codes from text
///
/// Used to normalise lines before comparing them against sentinel markers,
/// where colour codes or cursor resets would otherwise cause false negatives.
pub fn strip_ansi(text: &str) -> String {
    if !text.bytes().any(|b| b < 0x20 && b != b'\n' && b != b'\t') {
        return text.to_string();
    }

    let mut parser = Parser::new();
    let mut collector = TextCollector::default();
    parser.advance(&mut collector, text.as_bytes());
    collector.text
}

/// One ordered piece of a scanned chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenSegment {
    /// Printable text between mode changes
    Text(String),
    /// Alternate screen switched on
    EnterAlternate,
    /// Alternate screen switched off
    ExitAlternate,
}

#[derive(Default)]
struct SegmentCollector {
    segments: Vec<ScreenSegment>,
    text: String,
}

impl SegmentCollector {
    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.segments
                .push(ScreenSegment::Text(std::mem::take(&mut self.text)));
        }
    }

    fn take(&mut self) -> Vec<ScreenSegment> {
        self.flush_text();
        std::mem::take(&mut self.segments)
    }
}

impl Perform for SegmentCollector {
    fn print(&mut self, c: char) {
        self.text.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.text.push('\n'),
            // Kept so callers can tell a redrawn line from a new one.
            b'\r' => self.text.push('\r'),
            b'\t' => self.text.push('\t'),
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], ignore: bool, action: char) {
        if ignore {
            return;
        }

        // Absolute cursor moves start a new visual row.
        if matches!(action, 'H' | 'f') && !self.text.ends_with('\n') && !self.text.is_empty() {
            self.text.push('\n');
            return;
        }

        if !matches!(intermediates, [b'?']) || !matches!(action, 'h' | 'l') {
            return;
        }

        let switches_screen = params
            .iter()
            .any(|param| param.first().is_some_and(|mode| ALTERNATE_SCREEN_MODES.contains(mode)));
        if !switches_screen {
            return;
        }

        self.flush_text();
        self.segments.push(if action == 'h' {
            ScreenSegment::EnterAlternate
        } else {
            ScreenSegment::ExitAlternate
        });
    }
}

/// Stateful scanner for alternate-screen switches
///
/// Keeps parser state between chunks, so an escape sequence split across two
/// chunks is still recognised once its final byte arrives.
pub struct ScreenModeScanner {
    parser: Parser,
    collector: SegmentCollector,
}

impl ScreenModeScanner {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            collector: SegmentCollector::default(),
        }
    }

    /// Feed one chunk and return its text and mode switches in order
    pub fn scan(&mut self, chunk: &str) -> Vec<ScreenSegment> {
        self.parser.advance(&mut self.collector, chunk.as_bytes());
        self.collector.take()
    }

    /// Forget any partially parsed sequence
    pub fn reset(&mut self) {
        self.parser = Parser::new();
        self.collector = SegmentCollector::default();
    }
}

impl Default for ScreenModeScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScreenModeScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenModeScanner").finish_non_exhaustive()
    }
}

//! Marker Stream Decoding
//!
//! Turns arbitrarily chunked session bytes into ordered lines bounded by the
//! start and end sentinel markers. Nothing here depends on timing, so the
//! same bytes always yield the same events however they were chunked.

use crate::models::MarkerPair;
use crate::terminal::ansi::strip_ansi;

/// Something the cursor recognised in the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The start marker line was seen; output follows
    Started,
    /// A complete output line, escape sequences intact
    Line(String),
    /// The end marker arrived with this exit code
    Finished(i32),
}

/// Mutable parse state for one command's output
#[derive(Debug)]
pub struct StreamCursor {
    markers: MarkerPair,
    /// `<end>:$?` as echoed by the shell when the wrapper is typed
    wrapper_tail: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending_bytes: Vec<u8>,
    saw_start: bool,
    saw_end: bool,
    /// Text after the last newline
    line_buffer: String,
    /// Bytes of `line_buffer` already released by a half-line flush
    released_len: usize,
    lines_emitted: usize,
    max_line_len: usize,
}

impl StreamCursor {
    /// Create a cursor for one command
    pub fn new(markers: MarkerPair, max_line_len: usize) -> Self {
        let wrapper_tail = format!("{}:$?", markers.end);
        Self {
            markers,
            wrapper_tail,
            pending_bytes: Vec::new(),
            saw_start: false,
            saw_end: false,
            line_buffer: String::new(),
            released_len: 0,
            lines_emitted: 0,
            max_line_len: max_line_len.max(1),
        }
    }

    pub fn saw_start(&self) -> bool {
        self.saw_start
    }

    pub fn saw_end(&self) -> bool {
        self.saw_end
    }

    pub fn lines_emitted(&self) -> usize {
        self.lines_emitted
    }

    /// Whether a line is held without a trailing newline
    pub fn has_partial(&self) -> bool {
        self.line_buffer.len() > self.released_len
    }

    /// Decode bytes and parse them in one step
    ///
    /// Returns the decoded text (for observers that want the raw stream) and
    /// the events it produced.
    pub fn feed(&mut self, bytes: &[u8]) -> (String, Vec<StreamEvent>) {
        let text = self.decode(bytes);
        let events = self.push_text(&text);
        (text, events)
    }

    /// Decode bytes to text, holding back an incomplete trailing UTF-8 sequence
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.pending_bytes.len());
        let mut input: &[u8] = &self.pending_bytes;
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    input = &[];
                    break;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        // Incomplete sequence at the end; wait for more bytes.
                        None => {
                            input = rest;
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                    }
                }
            }
        }

        self.pending_bytes = input.to_vec();
        out
    }

    /// Parse already-decoded text
    pub fn push_text(&mut self, text: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.saw_end || text.is_empty() {
            return events;
        }

        self.line_buffer.push_str(text);

        loop {
            self.enforce_line_limit(&mut events);
            let Some(newline) = self.line_buffer.find('\n') else {
                break;
            };

            let mut line: String = self.line_buffer.drain(..=newline).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            let released = std::mem::take(&mut self.released_len).min(line.len());

            self.process_line(&line, released, &mut events);
            if self.saw_end {
                self.line_buffer.clear();
                return events;
            }
        }

        events
    }

    /// Release the held partial line, if any part of it may be surfaced
    ///
    /// Only output after the start marker is ever released, and a tail that
    /// could be the beginning of the end marker is held back.
    pub fn release_partial(&mut self) -> Option<String> {
        if !self.saw_start || self.saw_end || !self.has_partial() {
            return None;
        }

        let normalized = strip_ansi(&self.line_buffer);
        let trimmed = normalized.trim_start();
        if trimmed.contains(&self.markers.end) || self.markers.end.starts_with(trimmed) {
            return None;
        }

        let hold = marker_prefix_overlap(&self.line_buffer, &self.markers.end);
        let release_end = self.line_buffer.len() - hold;
        if release_end <= self.released_len {
            return None;
        }

        let released = self.line_buffer[self.released_len..release_end].to_string();
        self.released_len = release_end;
        Some(released)
    }

    fn process_line(&mut self, line: &str, released: usize, events: &mut Vec<StreamEvent>) {
        let normalized = strip_ansi(line);

        if !self.saw_start {
            // The echoed wrapper ends with `<end>:$?`, never with the start marker.
            if normalized.trim_end().ends_with(&self.markers.start) {
                debug!("Start marker seen");
                self.saw_start = true;
                events.push(StreamEvent::Started);
            }
            return;
        }

        if let Some((marker_at, exit_code)) = self.find_end_marker(&normalized) {
            let prefix = &normalized[..marker_at];
            let already = strip_ansi(&line[..released]);
            let unreleased = prefix.strip_prefix(already.as_str()).unwrap_or(prefix);
            if !unreleased.trim().is_empty() {
                self.emit(unreleased.to_string(), events);
            }
            debug!("End marker seen with exit code {}", exit_code);
            self.saw_end = true;
            events.push(StreamEvent::Finished(exit_code));
            return;
        }

        if normalized.contains(&self.wrapper_tail) {
            return;
        }

        let remainder = &line[released..];
        if released > 0 && remainder.is_empty() {
            return;
        }
        self.emit(remainder.to_string(), events);
    }

    /// Locate `<end>:<digits>` terminating the line
    fn find_end_marker(&self, normalized: &str) -> Option<(usize, i32)> {
        let trimmed = normalized.trim_end();
        let marker_at = trimmed.rfind(&self.markers.end)?;
        let suffix = trimmed[marker_at + self.markers.end.len()..].strip_prefix(':')?;

        let digits = suffix.strip_prefix('-').unwrap_or(suffix);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let exit_code = suffix.parse::<i32>().ok()?;
        Some((marker_at, exit_code))
    }

    /// Split the current line into pieces while it is longer than the limit
    ///
    /// Pieces depend only on the line's own text, so a long line splits the
    /// same way whether its newline arrives in this chunk or a later one.
    fn enforce_line_limit(&mut self, events: &mut Vec<StreamEvent>) {
        loop {
            let line_end = self.line_buffer.find('\n').unwrap_or(self.line_buffer.len());
            let content = &self.line_buffer[..line_end];
            // A trailing `\r` may still turn out to be half of a CRLF.
            let length = content.strip_suffix('\r').map_or(content.len(), str::len);
            if length <= self.max_line_len {
                return;
            }

            let split = self.piece_len(content);
            let piece: String = self.line_buffer.drain(..split).collect();
            let released = self.released_len.min(piece.len());
            self.released_len -= released;
            if self.saw_start {
                if released < piece.len() {
                    self.emit(piece[released..].to_string(), events);
                }
            } else {
                debug!("Discarding {} bytes of oversized echo", piece.len());
            }
        }
    }

    /// Length of the next forced piece of an oversized line
    ///
    /// The piece stops short of the marker the cursor is waiting for, so a
    /// marker is never cut in two.
    fn piece_len(&self, content: &str) -> usize {
        let mut split = self.max_line_len.min(content.len());
        while !content.is_char_boundary(split) {
            split -= 1;
        }
        if split == 0 {
            split = content.chars().next().map_or(content.len(), char::len_utf8);
        }

        let marker = if self.saw_start {
            &self.markers.end
        } else {
            &self.markers.start
        };
        let head = &content[..split];
        let keep = match head.find(marker.as_str()) {
            Some(at) => at,
            None => split - marker_prefix_overlap(head, marker),
        };
        if keep == 0 {
            split
        } else {
            keep
        }
    }

    fn emit(&mut self, line: String, events: &mut Vec<StreamEvent>) {
        self.lines_emitted += 1;
        events.push(StreamEvent::Line(line));
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `marker`
fn marker_prefix_overlap(text: &str, marker: &str) -> usize {
    (1..marker.len().min(text.len() + 1))
        .rev()
        .find(|&len| {
            marker.is_char_boundary(len)
                && text.is_char_boundary(text.len() - len)
                && text.ends_with(&marker[..len])
        })
        .unwrap_or(0)
}

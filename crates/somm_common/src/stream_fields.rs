//! Incremental JSON field detection over a streaming model response.
//!
//! The model emits one JSON object as a sequence of arbitrary text
//! fragments. The detector appends each fragment to an internal buffer
//! and fires `on_field` exactly once per target field, as soon as that
//! field's value is syntactically complete, without waiting for the
//! whole object to become valid JSON. No assumption is made about
//! fragment boundaries: a key, a quote, or an escape sequence may be
//! split across chunks.
//!
//! For configured text-stream fields the detector also surfaces
//! partial string values through `on_text_delta` while the string is
//! still open. Deltas carry the full decoded text so far and are only
//! emitted when the text grew since the last delta; completion of the
//! field supersedes any further deltas.
//!
//! Pure state machine: no I/O, safe to test on buffer-in/events-out
//! pairs alone.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Per-request detector state. Create one per streaming call, discard
/// (or `reset`) on completion, error, or cancellation.
pub struct StreamFieldDetector {
    buffer: String,
    targets: Vec<String>,
    text_stream: HashSet<String>,
    completed: HashSet<String>,
    /// Bytes of decoded text already surfaced per text-stream field
    emitted_len: HashMap<String, usize>,
}

impl StreamFieldDetector {
    pub fn new<S: AsRef<str>>(targets: &[S]) -> Self {
        Self {
            buffer: String::new(),
            targets: targets.iter().map(|s| s.as_ref().to_string()).collect(),
            text_stream: HashSet::new(),
            completed: HashSet::new(),
            emitted_len: HashMap::new(),
        }
    }

    /// Enable partial text deltas for the given fields.
    pub fn with_text_stream<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.text_stream = fields.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Fields already completed in this call (emission order not kept).
    pub fn completed_fields(&self) -> &HashSet<String> {
        &self.completed
    }

    /// Clear buffer, completed fields, and delta bookkeeping.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.completed.clear();
        self.emitted_len.clear();
    }

    /// Append a fragment and emit any newly completed fields, then any
    /// grown partial text for open text-stream fields.
    pub fn process_chunk(
        &mut self,
        chunk: &str,
        on_field: &mut dyn FnMut(&str, Value),
        mut on_text_delta: Option<&mut dyn FnMut(&str, &str)>,
    ) {
        self.buffer.push_str(chunk);

        // Pass 1: completed values. Targets iterate in declared order
        // so emission order follows the buffer's field order for any
        // single-field-per-chunk stream.
        let targets: Vec<String> = self
            .targets
            .iter()
            .filter(|t| !self.completed.contains(*t))
            .cloned()
            .collect();
        for field in targets {
            let Some(value_start) = self.find_value_start(&field) else {
                continue;
            };
            if let Some(value) = self.try_extract_value(value_start) {
                self.completed.insert(field.clone());
                self.emitted_len.remove(&field);
                on_field(&field, value);
            }
        }

        // Pass 2: partial text for still-open string values.
        if let Some(on_delta) = on_text_delta.as_mut() {
            let streaming: Vec<String> = self
                .text_stream
                .iter()
                .filter(|t| !self.completed.contains(*t))
                .cloned()
                .collect();
            for field in streaming {
                let Some(value_start) = self.find_value_start(&field) else {
                    continue;
                };
                if self.buffer.as_bytes().get(value_start) != Some(&b'"') {
                    continue;
                }
                // Only an open (unterminated) string yields deltas; a
                // closed one was already handled by pass 1.
                if find_string_end(self.buffer.as_bytes(), value_start).is_some() {
                    continue;
                }
                let partial = &self.buffer[value_start + 1..];
                let text = decode_partial_string(partial);
                let prior = self.emitted_len.get(&field).copied().unwrap_or(0);
                if text.len() > prior {
                    self.emitted_len.insert(field.clone(), text.len());
                    on_delta(&field, &text);
                }
            }
        }
    }

    /// Byte offset of the first non-whitespace character after
    /// `"field":`, or None if the key (or any value text) has not
    /// arrived yet.
    fn find_value_start(&self, field: &str) -> Option<usize> {
        let needle = format!("\"{}\"", field);
        let bytes = self.buffer.as_bytes();
        for (pos, _) in self.buffer.match_indices(&needle) {
            // Key text occurring inside an earlier string value is not
            // a key.
            if inside_string(bytes, pos) {
                continue;
            }
            let mut i = pos + needle.len();
            while bytes.get(i).is_some_and(|b| b.is_ascii_whitespace()) {
                i += 1;
            }
            if bytes.get(i) != Some(&b':') {
                continue;
            }
            i += 1;
            while bytes.get(i).is_some_and(|b| b.is_ascii_whitespace()) {
                i += 1;
            }
            if i < bytes.len() {
                return Some(i);
            }
        }
        None
    }

    /// Attempt to consume one complete JSON value at `start`. Returns
    /// None when the value is not yet complete in the buffer.
    fn try_extract_value(&self, start: usize) -> Option<Value> {
        let bytes = self.buffer.as_bytes();
        match bytes[start] {
            b'"' => {
                let end = find_string_end(bytes, start)?;
                let raw = &self.buffer[start..=end];
                serde_json::from_str::<String>(raw).ok().map(Value::String)
            }
            b'[' | b'{' => {
                let end = find_container_end(bytes, start)?;
                serde_json::from_str(&self.buffer[start..=end]).ok()
            }
            b'-' | b'0'..=b'9' => {
                let mut i = start;
                while bytes
                    .get(i)
                    .is_some_and(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
                {
                    i += 1;
                }
                // A bare trailing number is never final: more digits
                // may still arrive. Require a delimiter after it.
                if !is_delimiter(bytes.get(i)) {
                    return None;
                }
                serde_json::from_str(&self.buffer[start..i]).ok()
            }
            b't' => self.literal_at(start, "true", Value::Bool(true)),
            b'f' => self.literal_at(start, "false", Value::Bool(false)),
            b'n' => self.literal_at(start, "null", Value::Null),
            _ => None,
        }
    }

    /// `true`/`false`/`null` also need a trailing delimiter before
    /// they count as complete.
    fn literal_at(&self, start: usize, literal: &str, value: Value) -> Option<Value> {
        let end = start + literal.len();
        if self.buffer.len() < end || &self.buffer[start..end] != literal {
            return None;
        }
        if !is_delimiter(self.buffer.as_bytes().get(end)) {
            return None;
        }
        Some(value)
    }
}

fn is_delimiter(b: Option<&u8>) -> bool {
    matches!(b, Some(b',') | Some(b'}') | Some(b']')) || b.is_some_and(|b| b.is_ascii_whitespace())
}

/// Whether `pos` falls inside a string that opened before it and has
/// not closed yet, scanning from the start of the buffer.
fn inside_string(bytes: &[u8], pos: usize) -> bool {
    let mut in_string = false;
    let mut escaped = false;
    for &b in &bytes[..pos] {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if b == b'"' {
            in_string = true;
        }
    }
    in_string
}

/// Index of the unescaped closing quote of the string opening at
/// `start` (which must hold `"`), or None while the string is open.
fn find_string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start + 1) {
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b'"' {
            return Some(i);
        }
    }
    None
}

/// Index of the closing bracket/brace matching the container opening
/// at `start`, tracking nesting and ignoring structural characters
/// inside strings.
fn find_container_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode the body of an open JSON string. A trailing escape split at
/// a chunk boundary is dropped before decoding; if decoding still
/// fails the raw buffer is surfaced for this call only.
fn decode_partial_string(partial: &str) -> String {
    let trimmed = strip_trailing_escape(partial);
    serde_json::from_str::<String>(&format!("\"{}\"", trimmed)).unwrap_or_else(|_| {
        tracing::debug!("partial string decode failed, surfacing raw text");
        partial.to_string()
    })
}

/// Drop an unterminated trailing backslash escape (odd run of
/// backslashes, or an incomplete \uXXXX sequence).
fn strip_trailing_escape(s: &str) -> &str {
    let bytes = s.as_bytes();
    // Incomplete unicode escape: \u followed by fewer than 4 hex digits
    for cut in 0..=4.min(bytes.len()) {
        let tail_start = bytes.len() - cut;
        if tail_start >= 2
            && bytes[tail_start - 1] == b'u'
            && bytes[tail_start - 2] == b'\\'
            && bytes[tail_start..].iter().all(|b| b.is_ascii_hexdigit())
            && cut < 4
            && trailing_backslashes(&bytes[..tail_start - 1]) % 2 == 1
        {
            return &s[..tail_start - 2];
        }
    }
    if trailing_backslashes(bytes) % 2 == 1 {
        return &s[..s.len() - 1];
    }
    s
}

fn trailing_backslashes(bytes: &[u8]) -> usize {
    bytes.iter().rev().take_while(|&&b| b == b'\\').count()
}

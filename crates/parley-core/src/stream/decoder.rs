//! Event framing over a chunked response body
//!
//! Frames are separated by a blank line. A frame's payload is every `data:`
//! line in it, marker and one optional space stripped, concatenated in order.
//! Chunks may split lines, frames, and even UTF-8 characters anywhere.

use tracing::debug;

/// SSE payload line marker
const DATA_PREFIX: &str = "data:";

/// Field names a server may send besides `data`, ignored when framing
const IGNORED_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

/// Incremental frame decoder, owned by a single streaming call
#[derive(Debug, Default)]
pub struct EventFrameDecoder {
    /// Tail of the last chunk that is not yet a complete UTF-8 character
    pending_bytes: Vec<u8>,
    /// Decoded text not yet terminated by a blank line
    buffer: String,
    /// A `\r` ended the last chunk; it may be the first half of `\r\n`
    held_cr: bool,
    /// Start of the part of `buffer` not yet searched for a boundary
    scan_from: usize,
}

impl EventFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame it completed, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decode_utf8(chunk);
        self.append_normalized(&text);
        self.drain_frames()
    }

    /// End of stream: flush whatever is left as the final frames
    ///
    /// Nothing buffered is dropped. If the leftover text never reached a
    /// blank line it still becomes a frame: its `data:` payload when it has
    /// one, otherwise the raw text itself.
    pub fn finish(mut self) -> Vec<String> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.pending_bytes.clear();
            self.buffer.push_str(&tail);
        }
        if self.held_cr {
            self.held_cr = false;
            self.buffer.push('\n');
        }

        let mut frames = self.drain_frames();
        let rest = std::mem::take(&mut self.buffer);
        if let Some(frame) = trailing_frame(&rest) {
            debug!("Flushing unterminated frame: {} chars", frame.len());
            frames.push(frame);
        }
        frames
    }

    /// Bytes of text currently waiting for a frame boundary
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending_bytes.len()
    }

    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending_bytes.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending_bytes[..valid]));
                    match e.error_len() {
                        // Incomplete character at the end: wait for more bytes
                        None => {
                            self.pending_bytes.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid + len);
                        }
                    }
                }
            }
        }

        out
    }

    /// Append text with `\r\n` and lone `\r` turned into `\n`
    fn append_normalized(&mut self, text: &str) {
        let mut chars = text.chars().peekable();

        if self.held_cr {
            self.held_cr = false;
            self.buffer.push('\n');
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
        }

        while let Some(c) = chars.next() {
            if c != '\r' {
                self.buffer.push(c);
                continue;
            }
            match chars.peek() {
                Some('\n') => {
                    chars.next();
                    self.buffer.push('\n');
                }
                Some(_) => self.buffer.push('\n'),
                None => self.held_cr = true,
            }
        }
    }

    fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();

        while let Some(found) = self.buffer[self.scan_from..].find("\n\n") {
            let idx = self.scan_from + found;
            let span: String = self.buffer.drain(..idx + 2).collect();
            self.scan_from = 0;
            match data_payload(&span[..idx]) {
                Some(payload) => frames.push(payload),
                None => debug!("Skipping frame without data lines"),
            }
        }

        // A trailing '\n' may pair with the next chunk's first
        self.scan_from = self.buffer.len() - usize::from(self.buffer.ends_with('\n'));
        frames
    }
}

/// Concatenated `data:` payload of a span, `None` if it has no data line
fn data_payload(span: &str) -> Option<String> {
    let mut payload = String::new();
    let mut found = false;

    for line in span.split('\n') {
        if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            payload.push_str(rest.strip_prefix(' ').unwrap_or(rest));
            found = true;
        }
    }

    found.then_some(payload)
}

fn trailing_frame(rest: &str) -> Option<String> {
    if rest.trim().is_empty() {
        return None;
    }
    if let Some(payload) = data_payload(rest) {
        return Some(payload);
    }

    let only_fields = rest
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .all(is_field_line);
    if only_fields {
        None
    } else {
        Some(rest.trim().to_string())
    }
}

fn is_field_line(line: &str) -> bool {
    line.starts_with(':') || IGNORED_FIELDS.iter().any(|f| line.starts_with(f))
}

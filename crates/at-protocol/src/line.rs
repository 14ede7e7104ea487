//! Line tokenizer for the modem byte stream
//!
//! The modem terminates every reply and notification with `\r\n`, but a
//! single serial read can hold several lines, or stop in the middle of one.
//! [`LineCodec`] keeps the unterminated remainder between reads so lines
//! come out whole and in arrival order no matter how the bytes were chunked.
//!
//! Classification happens once per line:
//! - lines starting with `+` become [`Line::Notification`] with the name up to
//!   the first `:` and comma-separated, quote-aware arguments
//! - the SMS input prompt `> ` becomes [`Line::Prompt`]
//! - anything else is [`Line::Plain`]; its whole text doubles as its name so
//!   bare tokens like `RING` and `Call Ready` can be dispatched

use std::fmt;

use tracing::{debug, warn};

/// Default upper bound for a single unterminated line
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Text used for the SMS input prompt
pub const PROMPT: &str = ">";

/// Final result code that ends a command transaction
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FinalResult {
    /// `OK`
    Ok,
    /// `ERROR`
    Error,
    /// `+CME ERROR: <code>` (equipment error)
    CmeError(String),
    /// `+CMS ERROR: <code>` (message service error)
    CmsError(String),
}

impl FinalResult {
    /// Recognize a final result code from a line's text
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match text {
            "OK" => Some(FinalResult::Ok),
            "ERROR" => Some(FinalResult::Error),
            _ => {
                if let Some(code) = text.strip_prefix("+CME ERROR:") {
                    Some(FinalResult::CmeError(code.trim().to_string()))
                } else {
                    text.strip_prefix("+CMS ERROR:")
                        .map(|code| FinalResult::CmsError(code.trim().to_string()))
                }
            }
        }
    }

    /// True for `OK`
    pub fn is_ok(&self) -> bool {
        matches!(self, FinalResult::Ok)
    }
}

impl fmt::Display for FinalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalResult::Ok => write!(f, "OK"),
            FinalResult::Error => write!(f, "ERROR"),
            FinalResult::CmeError(code) => write!(f, "+CME ERROR: {}", code),
            FinalResult::CmsError(code) => write!(f, "+CMS ERROR: {}", code),
        }
    }
}

/// A single classified line received from the modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A `+NAME: args` line
    Notification {
        /// Identifier up to the colon, e.g. `+CLIP`
        name: String,
        /// Arguments with surrounding quotes removed
        args: Vec<String>,
        /// The line exactly as received (without terminator)
        raw: String,
    },
    /// Any other non-empty line
    Plain(String),
    /// The `> ` SMS input prompt
    Prompt,
}

impl Line {
    /// Classify one line of text (terminator already removed)
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text == PROMPT {
            return Line::Prompt;
        }
        if !text.starts_with('+') {
            return Line::Plain(text.to_string());
        }

        let (name, args) = match text.split_once(':') {
            Some((name, rest)) => (name.trim(), split_args(rest)),
            None => (text, Vec::new()),
        };
        Line::Notification {
            name: name.to_string(),
            args,
            raw: text.to_string(),
        }
    }

    /// Name used for registry lookup
    pub fn name(&self) -> &str {
        match self {
            Line::Notification { name, .. } => name,
            Line::Plain(text) => text,
            Line::Prompt => PROMPT,
        }
    }

    /// Decoded arguments (empty for plain lines)
    pub fn args(&self) -> &[String] {
        match self {
            Line::Notification { args, .. } => args,
            _ => &[],
        }
    }

    /// The line text as received
    pub fn raw(&self) -> &str {
        match self {
            Line::Notification { raw, .. } => raw,
            Line::Plain(text) => text,
            Line::Prompt => PROMPT,
        }
    }

    /// The final result code carried by this line, if any
    pub fn final_result(&self) -> Option<FinalResult> {
        match self {
            Line::Prompt => None,
            _ => FinalResult::parse(self.raw()),
        }
    }

    /// Whether this line ends a command transaction by itself
    pub fn is_final(&self) -> bool {
        self.final_result().is_some()
    }

    /// Whether this line starts with `+`
    pub fn is_notification(&self) -> bool {
        matches!(self, Line::Notification { .. })
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

/// Split the text after a notification's colon into arguments
///
/// Commas inside double quotes do not split, so timestamps such as
/// `"24/01/30,20:40:31+00"` stay one argument.
pub fn split_args(rest: &str) -> Vec<String> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in rest.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                segments.push(&rest[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&rest[start..]);

    segments.into_iter().map(unquote).collect()
}

/// Trim whitespace and one pair of surrounding double quotes
pub fn unquote(arg: &str) -> String {
    let arg = arg.trim();
    arg.strip_prefix('"')
        .and_then(|a| a.strip_suffix('"'))
        .unwrap_or(arg)
        .to_string()
}

fn is_line_end(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

/// Streaming line splitter
///
/// Accepts `\r`, `\n` or `\r\n` as terminators and drops empty lines, so the
/// `\r\n` framing around every modem response never produces blank entries.
#[derive(Debug)]
pub struct LineCodec {
    buffer: Vec<u8>,
    max_line_len: usize,
    /// Dropping the rest of an overlong line up to its terminator
    discarding: bool,
}

impl LineCodec {
    /// Create a codec with the default line length limit
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    /// Create a codec that discards unterminated lines longer than `max_line_len`
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            max_line_len,
            discarding: false,
        }
    }

    /// Push raw bytes read from the serial line
    ///
    /// An unterminated line longer than the limit is dropped whole: the bytes
    /// buffered so far and everything up to and including its terminator, so
    /// its tail never shows up as a line of its own.
    pub fn push_bytes(&mut self, mut data: &[u8]) {
        if self.discarding {
            let Some(pos) = data.iter().position(|&b| is_line_end(b)) else {
                return;
            };
            debug!("Dropped {} more bytes of an overlong line", pos);
            self.discarding = false;
            data = &data[pos + 1..];
        }

        self.buffer.extend_from_slice(data);

        // Prevent unbounded growth on a line that never terminates
        if self.buffer.len() > self.max_line_len && !self.buffer.iter().any(|&b| is_line_end(b)) {
            warn!(
                "Discarding {} bytes without line terminator (limit {})",
                self.buffer.len(),
                self.max_line_len
            );
            self.buffer.clear();
            self.discarding = true;
        }
    }

    /// Extract the next complete line, if available
    pub fn next_line(&mut self) -> Option<Line> {
        self.next_line_with_bytes().map(|(line, _)| line)
    }

    /// Extract the next complete line along with the raw bytes it consumed
    pub fn next_line_with_bytes(&mut self) -> Option<(Line, Vec<u8>)> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| is_line_end(b)) else {
                // The prompt is the only thing the modem sends unterminated
                if self.buffer.trim_ascii() == PROMPT.as_bytes() {
                    let bytes = std::mem::take(&mut self.buffer);
                    return Some((Line::Prompt, bytes));
                }
                return None;
            };

            let segment: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&segment[..pos]);
            if text.trim().is_empty() {
                continue;
            }
            return Some((Line::parse(&text), segment));
        }
    }

    /// Number of buffered bytes that have not formed a line yet
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

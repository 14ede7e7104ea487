//! AT Protocol Library
//!
//! This crate provides parsing and encoding for the textual AT command
//! protocol spoken by SIM800-class cellular modems:
//!
//! - **Line tokenizer**: a streaming splitter that turns raw serial reads into
//!   classified lines, buffering partial lines across reads
//! - **Final results**: detection of `OK`, `ERROR`, `+CME ERROR` and `+CMS ERROR`
//! - **Notifications**: decoders that turn unsolicited result codes (URCs)
//!   such as `RING` or `+HTTPACTION: 0,200,1024` into typed [`EventKind`]s
//! - **Command builders**: per-feature command enums (basic, call, SMS,
//!   bearer, HTTP) and parsers for their replies
//!
//! # Architecture
//!
//! Nothing in this crate performs I/O. The transaction engine pushes bytes
//! into a [`LineCodec`], routes every [`Line`] it gets back, and uses the
//! command enums to produce the bytes it writes.
//!
//! Every line the modem sends is one of:
//! - `+NAME: arg,arg,...` - a notification or a reply field
//! - a bare token such as `OK`, `RING` or `Call Ready`
//! - the SMS input prompt `> ` which arrives without a line terminator
//!
//! # Example
//!
//! ```rust
//! use at_protocol::{Line, LineCodec};
//!
//! let mut codec = LineCodec::new();
//! codec.push_bytes(b"\r\n+CLIP: \"+5581999999999\",145\r\n\r\nO");
//!
//! let line = codec.next_line().unwrap();
//! assert_eq!(line.name(), "+CLIP");
//! assert_eq!(line.args(), ["+5581999999999", "145"]);
//!
//! // The rest of `OK` has not arrived yet
//! assert!(codec.next_line().is_none());
//! codec.push_bytes(b"K\r\n");
//! assert!(codec.next_line().unwrap().is_final());
//! ```

pub mod bearer;
pub mod call;
pub mod error;
pub mod http;
pub mod line;
pub mod misc;
pub mod sms;
pub mod urc;

pub use error::ParseError;
pub use line::{FinalResult, Line, LineCodec};
pub use urc::{EventBits, EventKind};

/// Line terminator appended to every command
pub const TERMINATOR: &[u8] = b"\r\n";

/// Encode a command to the bytes written on the serial line
pub trait EncodeCommand {
    /// Encode this command including the trailing `\r\n`
    fn encode(&self) -> Vec<u8>;
}

/// Append the command terminator to a command body
pub(crate) fn terminate(body: String) -> Vec<u8> {
    let mut bytes = body.into_bytes();
    bytes.extend_from_slice(TERMINATOR);
    bytes
}

/// Wrap a value in double quotes for use as a string argument
pub(crate) fn quoted(value: &str) -> String {
    format!("\"{}\"", value)
}

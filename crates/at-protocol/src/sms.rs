//! SMS commands (text mode)
//!
//! Sending a message is a two step exchange: `AT+CMGS="<number>"` makes the
//! module answer with the `> ` prompt, then the body goes out terminated by
//! Ctrl-Z instead of `\r\n`. The module replies `+CMGS: <mr>` and `OK` once
//! the network accepted it.

use crate::error::numeric_arg;
use crate::line::Line;
use crate::{quoted, terminate, EncodeCommand, ParseError};

/// Ends the message body of `AT+CMGS`
pub const CTRL_Z: u8 = 0x1A;
/// Aborts the message body of `AT+CMGS`
pub const ESC: u8 = 0x1B;

/// Message format selected with `AT+CMGF`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SmsFormat {
    /// Binary PDU mode
    Pdu,
    /// Plain text mode
    Text,
}

impl SmsFormat {
    fn code(self) -> u8 {
        match self {
            SmsFormat::Pdu => 0,
            SmsFormat::Text => 1,
        }
    }
}

/// Which messages `AT+CMGD` removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteFlag {
    /// Only the message at the given index
    Index,
    /// All read messages
    Read,
    /// All read and sent messages
    ReadAndSent,
    /// All read, sent and unsent messages
    ReadSentAndUnsent,
    /// Every message, unread included
    All,
}

impl DeleteFlag {
    fn code(self) -> u8 {
        match self {
            DeleteFlag::Index => 0,
            DeleteFlag::Read => 1,
            DeleteFlag::ReadAndSent => 2,
            DeleteFlag::ReadSentAndUnsent => 3,
            DeleteFlag::All => 4,
        }
    }
}

/// SMS commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsCommand {
    /// `AT+CMGF=<mode>`
    SetFormat(SmsFormat),
    /// `AT+CMGF?`
    QueryFormat,
    /// `AT+CMGR=<index>,0` - read and mark as read
    Read(u16),
    /// `AT+CMGS="<number>"` - start sending, module answers with the prompt
    Send(String),
    /// `AT+CMGD=<index>,<flag>`
    Delete {
        /// Storage index
        index: u16,
        /// Which messages to delete
        flag: DeleteFlag,
    },
}

impl EncodeCommand for SmsCommand {
    fn encode(&self) -> Vec<u8> {
        let body = match self {
            SmsCommand::SetFormat(format) => format!("AT+CMGF={}", format.code()),
            SmsCommand::QueryFormat => "AT+CMGF?".to_string(),
            SmsCommand::Read(index) => format!("AT+CMGR={},0", index),
            SmsCommand::Send(number) => format!("AT+CMGS={}", quoted(number)),
            SmsCommand::Delete { index, flag } => format!("AT+CMGD={},{}", index, flag.code()),
        };
        terminate(body)
    }
}

/// A message read from storage
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmsMessage {
    /// Storage status, e.g. `REC UNREAD`
    pub status: String,
    /// Originating address
    pub sender: String,
    /// Service centre timestamp as sent by the module
    pub timestamp: String,
    /// Message text
    pub text: String,
}

/// Encode a message body for the `AT+CMGS` prompt
pub fn encode_body(text: &str) -> Result<Vec<u8>, ParseError> {
    if text.bytes().any(|b| b == CTRL_Z || b == ESC) {
        return Err(ParseError::InvalidArgument(
            "message text contains Ctrl-Z or ESC".to_string(),
        ));
    }
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(CTRL_Z);
    Ok(bytes)
}

/// Find the first reply line carrying `prefix` and decode its arguments
fn field_args(lines: &[String], prefix: &'static str) -> Result<(usize, Vec<String>), ParseError> {
    lines
        .iter()
        .enumerate()
        .find_map(|(i, raw)| {
            let line = Line::parse(raw);
            (line.name() == prefix).then(|| (i, line.args().to_vec()))
        })
        .ok_or(ParseError::MissingLine(prefix))
}

/// Parse the reply to `AT+CMGF?`
pub fn parse_format(lines: &[String]) -> Result<SmsFormat, ParseError> {
    let (_, args) = field_args(lines, "+CMGF")?;
    match numeric_arg::<u8>(&args, 0, "+CMGF", "message format")? {
        0 => Ok(SmsFormat::Pdu),
        1 => Ok(SmsFormat::Text),
        other => Err(ParseError::InvalidField {
            field: "message format",
            value: other.to_string(),
        }),
    }
}

/// Parse the reply to `AT+CMGR` in text mode
pub fn parse_message(lines: &[String]) -> Result<SmsMessage, ParseError> {
    let (header, args) = field_args(lines, "+CMGR")?;
    let arg = |index: usize| {
        args.get(index).cloned().ok_or(ParseError::MissingArgument {
            context: "+CMGR",
            index,
        })
    };

    Ok(SmsMessage {
        status: arg(0)?,
        sender: arg(1)?,
        timestamp: arg(3).unwrap_or_default(),
        text: lines[header + 1..].join("\n"),
    })
}

/// Parse the message reference from the reply to the message body
pub fn parse_send_reference(lines: &[String]) -> Result<u16, ParseError> {
    let (_, args) = field_args(lines, "+CMGS")?;
    numeric_arg(&args, 0, "+CMGS", "message reference")
}

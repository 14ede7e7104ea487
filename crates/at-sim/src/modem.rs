//! Virtual modem
//!
//! A byte-level model of a SIM800-style module: bytes go in through
//! [`VirtualModem::feed`], response chunks come out of
//! [`VirtualModem::take_output`]. Each command produces one chunk holding
//! the echo (if enabled) and the reply; unsolicited notifications are queued
//! as chunks of their own.

use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;
use std::str::FromStr;

use at_protocol::bearer::{BearerParam, BearerStatus};
use at_protocol::call::MAX_VOLUME;
use at_protocol::http::{HttpMethod, HttpParam};
use at_protocol::line::{split_args, unquote};
use at_protocol::misc::SUPPORTED_BAUD_RATES;
use at_protocol::sms::{SmsFormat, SmsMessage, CTRL_Z, ESC};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SimError;

/// Timestamp given to messages stored with [`VirtualModem::receive_sms`]
pub const DEFAULT_TIMESTAMP: &str = "24/01/30,20:40:31+00";

/// HTTP status the module reports when no bearer is up
pub const NETWORK_ERROR_STATUS: u16 = 601;

/// Voice call state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    /// No call
    Idle,
    /// Incoming call not yet answered
    Ringing,
    /// Outgoing call placed
    Dialing,
    /// Call in progress
    Active,
}

/// Configuration for creating a virtual modem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualModemConfig {
    /// Display name
    pub id: String,
    /// Echo commands back (`ATE1`)
    pub echo: bool,
    /// Address reported once the bearer is open
    pub ip_address: Ipv4Addr,
    /// Status reported by `+HTTPACTION`
    pub http_status: u16,
    /// Body served by `AT+HTTPREAD`
    pub http_body: String,
    /// Split output into chunks of at most this many bytes
    pub chunk_size: Option<usize>,
}

impl Default for VirtualModemConfig {
    fn default() -> Self {
        Self {
            id: "Virtual SIM800".to_string(),
            echo: true,
            ip_address: Ipv4Addr::new(10, 89, 193, 1),
            http_status: 200,
            http_body: String::new(),
            chunk_size: None,
        }
    }
}

/// Reply to one command line
enum Response {
    /// Reply lines, the last being the result code
    Lines(Vec<String>),
    /// The SMS input prompt
    Prompt,
}

impl Response {
    fn ok() -> Self {
        Response::Lines(vec!["OK".to_string()])
    }

    fn with_ok(mut lines: Vec<String>) -> Self {
        lines.push("OK".to_string());
        Response::Lines(lines)
    }
}

/// How a command line addresses its command
enum Op<'a> {
    Exec,
    Query,
    Set(&'a str),
}

fn split_command(body: &str) -> (&str, Op<'_>) {
    if let Some((name, rest)) = body.split_once('=') {
        (name, Op::Set(rest))
    } else if let Some(name) = body.strip_suffix('?') {
        (name, Op::Query)
    } else {
        (body, Op::Exec)
    }
}

fn arg<T: FromStr>(args: &[String], index: usize) -> Result<T, SimError> {
    args.get(index)
        .and_then(|a| a.parse().ok())
        .ok_or(SimError::INCORRECT_PARAMETERS)
}

fn frame(out: &mut Vec<u8>, line: &str) {
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(line.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn bearer_code(status: BearerStatus) -> u8 {
    match status {
        BearerStatus::Connecting => 0,
        BearerStatus::Connected => 1,
        BearerStatus::Closing => 2,
        BearerStatus::Closed => 3,
    }
}

/// A simulated SIM800-style modem
#[derive(Debug)]
pub struct VirtualModem {
    id: String,
    echo: bool,
    powered: bool,
    silent: bool,
    baud_rate: u32,
    caller_id: bool,
    volume: u8,
    muted: bool,
    call: CallState,
    dial_failure: Option<String>,
    sms_format: SmsFormat,
    messages: BTreeMap<u16, SmsMessage>,
    sent: Vec<(String, String)>,
    next_reference: u16,
    bearer: BearerStatus,
    bearer_params: Vec<(BearerParam, String)>,
    ip_address: Ipv4Addr,
    http_ready: bool,
    http_params: Vec<(HttpParam, String)>,
    http_status: u16,
    http_body: String,
    http_length: Option<usize>,
    chunk_size: Option<usize>,
    /// Bytes of the line (or SMS body) being received
    input: Vec<u8>,
    /// Recipient while the modem waits for an SMS body
    sms_recipient: Option<String>,
    /// Notifications raised while handling a command, sent after its reply
    deferred: Vec<String>,
    pending_output: VecDeque<Vec<u8>>,
}

impl VirtualModem {
    /// Create a virtual modem with default settings
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_config(VirtualModemConfig {
            id: id.into(),
            ..VirtualModemConfig::default()
        })
    }

    /// Create a virtual modem from configuration
    pub fn from_config(config: VirtualModemConfig) -> Self {
        Self {
            id: config.id,
            echo: config.echo,
            powered: true,
            silent: false,
            baud_rate: 0,
            caller_id: false,
            volume: 50,
            muted: false,
            call: CallState::Idle,
            dial_failure: None,
            sms_format: SmsFormat::Text,
            messages: BTreeMap::new(),
            sent: Vec::new(),
            next_reference: 1,
            bearer: BearerStatus::Closed,
            bearer_params: vec![(BearerParam::ConnectionType, "GPRS".to_string())],
            ip_address: config.ip_address,
            http_ready: false,
            http_params: Vec::new(),
            http_status: config.http_status,
            http_body: config.http_body,
            http_length: None,
            chunk_size: config.chunk_size.filter(|n| *n > 0),
            input: Vec::new(),
            sms_recipient: None,
            deferred: Vec::new(),
            pending_output: VecDeque::new(),
        }
    }

    // -------------------------------------------------------------------------
    // State accessors
    // -------------------------------------------------------------------------

    /// Get the modem's identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether commands are echoed
    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Whether the module is powered (false after `AT+CPOWD`)
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Fixed baud rate, 0 for autobaud
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Current call state
    pub fn call_state(&self) -> CallState {
        self.call
    }

    /// Loudspeaker volume
    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Whether the microphone is muted
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Selected SMS format
    pub fn sms_format(&self) -> SmsFormat {
        self.sms_format
    }

    /// Stored message at `index`
    pub fn message(&self, index: u16) -> Option<&SmsMessage> {
        self.messages.get(&index)
    }

    /// Messages sent with `AT+CMGS`, as (recipient, text)
    pub fn sent_messages(&self) -> &[(String, String)] {
        &self.sent
    }

    /// Bearer state
    pub fn bearer_status(&self) -> BearerStatus {
        self.bearer
    }

    /// Value of an HTTP parameter
    pub fn http_param(&self, param: HttpParam) -> Option<&str> {
        self.http_params
            .iter()
            .find(|(p, _)| *p == param)
            .map(|(_, v)| v.as_str())
    }

    /// Preferred output chunk size
    pub fn chunk_size(&self) -> Option<usize> {
        self.chunk_size
    }

    // -------------------------------------------------------------------------
    // Behaviour switches
    // -------------------------------------------------------------------------

    /// Stop answering commands (echo is still sent)
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Make the next dial attempts fail with `token`, e.g. `BUSY`
    pub fn set_dial_failure(&mut self, token: Option<&str>) {
        self.dial_failure = token.map(str::to_string);
    }

    /// Change what the next HTTP request returns
    pub fn set_http_response(&mut self, status: u16, body: impl Into<String>) {
        self.http_status = status;
        self.http_body = body.into();
    }

    // -------------------------------------------------------------------------
    // Unsolicited notifications
    // -------------------------------------------------------------------------

    /// Queue the power-on notification sequence
    pub fn boot(&mut self) {
        info!("Virtual modem {} booting", self.id);
        self.powered = true;
        for line in ["RDY", "+CFUN: 1", "+CPIN: READY", "Call Ready", "SMS Ready"] {
            self.notify(line);
        }
    }

    /// Signal an incoming call
    pub fn ring(&mut self, number: &str) {
        self.call = CallState::Ringing;
        self.notify("RING");
        if self.caller_id {
            let number_type = if number.starts_with('+') { 145 } else { 129 };
            self.notify(&format!("+CLIP: \"{}\",{},\"\",0,\"\",0", number, number_type));
        }
    }

    /// The remote party ends the call
    pub fn hang_up_remote(&mut self) {
        if self.call != CallState::Idle {
            self.call = CallState::Idle;
            self.notify("NO CARRIER");
        }
    }

    /// Store an incoming message and announce it; returns its index
    pub fn receive_sms(&mut self, sender: &str, text: &str) -> u16 {
        let index = (1..=u16::MAX)
            .find(|i| !self.messages.contains_key(i))
            .unwrap_or(u16::MAX);
        self.messages.insert(
            index,
            SmsMessage {
                status: "REC UNREAD".to_string(),
                sender: sender.to_string(),
                timestamp: DEFAULT_TIMESTAMP.to_string(),
                text: text.to_string(),
            },
        );
        self.notify(&format!("+CMTI: \"SM\",{}", index));
        index
    }

    /// Queue an arbitrary line as a notification
    pub fn inject(&mut self, line: &str) {
        self.notify(line);
    }

    fn notify(&mut self, line: &str) {
        debug!("Virtual modem {} notifies {:?}", self.id, line);
        let mut out = Vec::new();
        frame(&mut out, line);
        self.pending_output.push_back(out);
    }

    // -------------------------------------------------------------------------
    // Byte interface
    // -------------------------------------------------------------------------

    /// Feed bytes written by the host
    pub fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            if self.sms_recipient.is_some() {
                self.feed_body(byte);
                continue;
            }
            match byte {
                b'\r' | b'\n' => {
                    if !self.input.is_empty() {
                        let line = String::from_utf8_lossy(&self.input).into_owned();
                        self.input.clear();
                        self.process_line(&line);
                    }
                }
                _ => self.input.push(byte),
            }
        }
    }

    fn feed_body(&mut self, byte: u8) {
        match byte {
            CTRL_Z => {
                let text = String::from_utf8_lossy(&self.input).into_owned();
                self.input.clear();
                if let Some(number) = self.sms_recipient.take() {
                    self.send_message(number, text);
                }
            }
            ESC => {
                debug!("Virtual modem {} cancelled message", self.id);
                self.input.clear();
                self.sms_recipient = None;
                self.notify("OK");
            }
            // Rest of the command terminator
            b'\n' if self.input.is_empty() => {}
            _ => self.input.push(byte),
        }
    }

    fn send_message(&mut self, number: String, text: String) {
        let reference = self.next_reference;
        self.next_reference = self.next_reference.wrapping_add(1);
        info!(
            "Virtual modem {} sent message {} to {}",
            self.id, reference, number
        );

        let mut out = Vec::new();
        if self.echo {
            out.extend_from_slice(text.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        frame(&mut out, &format!("+CMGS: {}", reference));
        frame(&mut out, "OK");
        self.pending_output.push_back(out);
        self.sent.push((number, text));
    }

    /// Take the next output chunk
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    /// Take all pending output as one buffer
    pub fn take_all_output(&mut self) -> Vec<u8> {
        self.pending_output.drain(..).flatten().collect()
    }

    /// Whether output is waiting
    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }

    fn process_line(&mut self, line: &str) {
        let mut out = Vec::new();
        if self.echo {
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        if self.silent {
            debug!("Virtual modem {} ignoring {:?}", self.id, line);
        } else {
            match self.execute(line.trim()) {
                Ok(Response::Lines(lines)) => {
                    for reply in &lines {
                        frame(&mut out, reply);
                    }
                }
                Ok(Response::Prompt) => out.extend_from_slice(b"\r\n> "),
                Err(e) => {
                    debug!("Virtual modem {} rejected {:?}: {}", self.id, line, e);
                    frame(&mut out, &e.to_string());
                }
            }
        }

        if !out.is_empty() {
            self.pending_output.push_back(out);
        }
        for line in std::mem::take(&mut self.deferred) {
            self.notify(&line);
        }
    }

    fn execute(&mut self, line: &str) -> Result<Response, SimError> {
        let bytes = line.as_bytes();
        if bytes.len() < 2 || !bytes[..2].eq_ignore_ascii_case(b"AT") {
            return Err(SimError::Unsupported);
        }
        let body = &line[2..];

        match body {
            "" | "&W" => return Ok(Response::ok()),
            "E0" | "E1" => {
                self.echo = body == "E1";
                return Ok(Response::ok());
            }
            "A" => return Ok(self.answer()),
            "H" => {
                self.call = CallState::Idle;
                return Ok(Response::ok());
            }
            _ => {}
        }
        if let Some(number) = body.strip_prefix('D') {
            return self.dial(number);
        }

        match split_command(body) {
            ("+IPR", Op::Set(a)) => {
                let rate: u32 = arg(&split_args(a), 0)?;
                if !SUPPORTED_BAUD_RATES.contains(&rate) {
                    return Err(SimError::INCORRECT_PARAMETERS);
                }
                self.baud_rate = rate;
                Ok(Response::ok())
            }
            ("+CPOWD", Op::Set(_)) => {
                self.powered = false;
                Ok(Response::Lines(vec!["NORMAL POWER DOWN".to_string()]))
            }
            ("+CLIP", Op::Set(a)) => {
                self.caller_id = arg::<u8>(&split_args(a), 0)? == 1;
                Ok(Response::ok())
            }
            ("+CLVL", Op::Set(a)) => {
                let level: u8 = arg(&split_args(a), 0)?;
                if level > MAX_VOLUME {
                    return Err(SimError::INCORRECT_PARAMETERS);
                }
                self.volume = level;
                Ok(Response::ok())
            }
            ("+CMUT", Op::Set(a)) => {
                self.muted = arg::<u8>(&split_args(a), 0)? == 1;
                Ok(Response::ok())
            }
            ("+CMGF", Op::Set(a)) => {
                self.sms_format = match arg::<u8>(&split_args(a), 0)? {
                    0 => SmsFormat::Pdu,
                    1 => SmsFormat::Text,
                    _ => return Err(SimError::INCORRECT_PARAMETERS),
                };
                Ok(Response::ok())
            }
            ("+CMGF", Op::Query) => {
                let mode = match self.sms_format {
                    SmsFormat::Pdu => 0,
                    SmsFormat::Text => 1,
                };
                Ok(Response::with_ok(vec![format!("+CMGF: {}", mode)]))
            }
            ("+CMGR", Op::Set(a)) => self.read_message(arg(&split_args(a), 0)?),
            ("+CMGS", Op::Set(a)) => {
                if self.sms_format != SmsFormat::Text {
                    return Err(SimError::NOT_ALLOWED);
                }
                self.sms_recipient = Some(unquote(a));
                self.input.clear();
                Ok(Response::Prompt)
            }
            ("+CMGD", Op::Set(a)) => {
                let args = split_args(a);
                let index: u16 = arg(&args, 0)?;
                let flag: u8 = args.get(1).map_or(Ok(0), |_| arg(&args, 1))?;
                if flag == 4 {
                    self.messages.clear();
                } else if self.messages.remove(&index).is_none() {
                    return Err(SimError::INVALID_INDEX);
                }
                Ok(Response::ok())
            }
            ("+SAPBR", Op::Set(a)) => self.bearer_command(&split_args(a)),
            ("+HTTPINIT", Op::Exec) => {
                if self.http_ready {
                    return Err(SimError::Unsupported);
                }
                self.http_ready = true;
                Ok(Response::ok())
            }
            ("+HTTPTERM", Op::Exec) => {
                if !self.http_ready {
                    return Err(SimError::Unsupported);
                }
                self.http_ready = false;
                self.http_params.clear();
                self.http_length = None;
                Ok(Response::ok())
            }
            ("+HTTPPARA", Op::Set(a)) => {
                let args = split_args(a);
                let param = args
                    .first()
                    .and_then(|tag| HttpParam::from_tag(tag))
                    .ok_or(SimError::INCORRECT_PARAMETERS)?;
                if !self.http_ready {
                    return Err(SimError::Unsupported);
                }
                let value = args.get(1).cloned().unwrap_or_default();
                self.http_params.retain(|(p, _)| *p != param);
                self.http_params.push((param, value));
                Ok(Response::ok())
            }
            ("+HTTPPARA", Op::Query) => {
                if !self.http_ready {
                    return Err(SimError::Unsupported);
                }
                let mut lines = vec!["+HTTPPARA:".to_string()];
                lines.extend(
                    self.http_params
                        .iter()
                        .map(|(param, value)| format!("{}: {}", param.tag(), value)),
                );
                Ok(Response::with_ok(lines))
            }
            ("+HTTPACTION", Op::Set(a)) => {
                let method = HttpMethod::from_code(arg(&split_args(a), 0)?)
                    .map_err(|_| SimError::INCORRECT_PARAMETERS)?;
                if !self.http_ready {
                    return Err(SimError::Unsupported);
                }
                let (status, length) = if self.bearer == BearerStatus::Connected {
                    (self.http_status, self.http_body.len())
                } else {
                    (NETWORK_ERROR_STATUS, 0)
                };
                self.http_length = Some(length);
                self.deferred.push(format!(
                    "+HTTPACTION: {},{},{}",
                    method.code(),
                    status,
                    length
                ));
                Ok(Response::ok())
            }
            ("+HTTPREAD", Op::Set(a)) => {
                let args = split_args(a);
                let start: usize = arg(&args, 0)?;
                let len: usize = arg(&args, 1)?;
                let available = match (self.http_ready, self.http_length) {
                    (true, Some(n)) => n,
                    _ => return Err(SimError::Unsupported),
                };
                let body = self.http_body.as_bytes();
                let end = start.saturating_add(len).min(available).min(body.len());
                let data = body
                    .get(start.min(end)..end)
                    .map(String::from_utf8_lossy)
                    .unwrap_or_default()
                    .into_owned();

                let mut lines = vec![format!("+HTTPREAD: {}", data.len())];
                if !data.is_empty() {
                    lines.push(data);
                }
                Ok(Response::with_ok(lines))
            }
            _ => Err(SimError::Unsupported),
        }
    }

    fn answer(&mut self) -> Response {
        if self.call == CallState::Ringing {
            self.call = CallState::Active;
            Response::ok()
        } else {
            Response::Lines(vec!["NO CARRIER".to_string()])
        }
    }

    fn dial(&mut self, number: &str) -> Result<Response, SimError> {
        let number = number.trim_end_matches(';');
        if number.is_empty() || self.call != CallState::Idle {
            return Err(SimError::Unsupported);
        }
        if let Some(token) = &self.dial_failure {
            return Ok(Response::Lines(vec![token.clone()]));
        }
        info!("Virtual modem {} dialing {}", self.id, number);
        self.call = CallState::Dialing;
        Ok(Response::ok())
    }

    fn read_message(&mut self, index: u16) -> Result<Response, SimError> {
        let message = self
            .messages
            .get_mut(&index)
            .ok_or(SimError::INVALID_INDEX)?;
        let header = format!(
            "+CMGR: \"{}\",\"{}\",\"\",\"{}\"",
            message.status, message.sender, message.timestamp
        );
        let text = message.text.clone();
        message.status = "REC READ".to_string();
        Ok(Response::with_ok(vec![header, text]))
    }

    fn bearer_command(&mut self, args: &[String]) -> Result<Response, SimError> {
        match arg::<u8>(args, 0)? {
            0 => {
                if self.bearer != BearerStatus::Connected {
                    return Err(SimError::Unsupported);
                }
                self.bearer = BearerStatus::Closed;
                Ok(Response::ok())
            }
            1 => {
                if self.bearer == BearerStatus::Connected {
                    return Err(SimError::Unsupported);
                }
                self.bearer = BearerStatus::Connected;
                Ok(Response::ok())
            }
            2 => {
                let address = if self.bearer == BearerStatus::Connected {
                    self.ip_address
                } else {
                    Ipv4Addr::UNSPECIFIED
                };
                Ok(Response::with_ok(vec![format!(
                    "+SAPBR: 1,{},\"{}\"",
                    bearer_code(self.bearer),
                    address
                )]))
            }
            3 => {
                let param = args
                    .get(2)
                    .and_then(|tag| BearerParam::from_tag(tag))
                    .ok_or(SimError::INCORRECT_PARAMETERS)?;
                let value = args.get(3).cloned().unwrap_or_default();
                self.bearer_params.retain(|(p, _)| *p != param);
                self.bearer_params.push((param, value));
                Ok(Response::ok())
            }
            4 => {
                let mut lines = vec!["+SAPBR:".to_string()];
                lines.extend(
                    self.bearer_params
                        .iter()
                        .map(|(param, value)| format!("{}: {}", param.tag(), value)),
                );
                Ok(Response::with_ok(lines))
            }
            _ => Err(SimError::INCORRECT_PARAMETERS),
        }
    }
}

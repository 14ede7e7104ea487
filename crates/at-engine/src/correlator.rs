//! Response correlator
//!
//! A single-slot mailbox pairing the outstanding command with its reply.
//! [`Correlator::begin`] claims the slot and hands back a [`Ticket`]; the
//! bridge loop feeds every line through [`Correlator::offer`] until a
//! terminal line resolves the ticket.
//!
//! # Reply assembly
//!
//! While a transaction is outstanding each line is classified as:
//! - the modem's echo of the command (dropped). With echo filtering on,
//!   anything arriving before the echo is left over from an earlier command
//!   and goes to the registry instead
//! - a terminal line: a final result code, a token the caller listed in its
//!   [`Expect`], or the `> ` prompt when the caller asked for it
//! - a reply line, when its name matches one of the caller's expected
//!   prefixes or no notification handler claims it
//! - a notification, left for the registry (the line is declined)

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use at_protocol::{FinalResult, Line, ParseError};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{EngineError, Result};
use crate::lock;

/// What the caller expects the reply to look like
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expect {
    prefixes: Vec<String>,
    tokens: Vec<String>,
    failures: Vec<String>,
    prompt: bool,
}

impl Expect {
    /// Reply ends with a final result code only
    pub fn final_result() -> Self {
        Self::default()
    }

    /// Lines named `prefix` belong to the reply even if a handler is registered
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    /// A line equal to `token` ends the reply successfully
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(token.into());
        self
    }

    /// A line equal to `token` ends the reply as a failure
    pub fn failure(mut self, token: impl Into<String>) -> Self {
        self.failures.push(token.into());
        self
    }

    /// The `> ` prompt ends the reply successfully
    pub fn prompt(mut self) -> Self {
        self.prompt = true;
        self
    }

    fn terminal_for(&self, line: &Line) -> Option<Terminal> {
        if let Line::Prompt = line {
            return self.prompt.then_some(Terminal::Prompt);
        }
        if let Some(result) = line.final_result() {
            return Some(Terminal::Result(result));
        }
        let raw = line.raw();
        if self.tokens.iter().any(|t| t == raw) {
            Some(Terminal::Token(raw.to_string()))
        } else if self.failures.iter().any(|t| t == raw) {
            Some(Terminal::Failure(raw.to_string()))
        } else {
            None
        }
    }

    fn claims(&self, name: &str) -> bool {
        self.prefixes.iter().any(|p| p == name)
    }
}

/// The line that ended a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// A final result code
    Result(FinalResult),
    /// A success token from [`Expect::token`]
    Token(String),
    /// A failure token from [`Expect::failure`]
    Failure(String),
    /// The SMS input prompt
    Prompt,
}

impl Terminal {
    /// Whether the transaction succeeded
    pub fn is_ok(&self) -> bool {
        match self {
            Terminal::Result(result) => result.is_ok(),
            Terminal::Token(_) | Terminal::Prompt => true,
            Terminal::Failure(_) => false,
        }
    }

    /// Text of the terminal line
    pub fn text(&self) -> String {
        match self {
            Terminal::Result(result) => result.to_string(),
            Terminal::Token(t) | Terminal::Failure(t) => t.clone(),
            Terminal::Prompt => at_protocol::line::PROMPT.to_string(),
        }
    }
}

/// A completed reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Command text the reply belongs to
    pub command: String,
    /// Reply lines before the terminal line
    pub lines: Vec<String>,
    /// How the reply ended
    pub terminal: Terminal,
}

impl Reply {
    /// Whether the modem accepted the command
    pub fn is_ok(&self) -> bool {
        self.terminal.is_ok()
    }

    /// All reply lines including the terminal line
    pub fn text(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&self.terminal.text());
        text
    }

    /// Arguments of the first line named `name`
    pub fn field(&self, name: &str) -> Option<Vec<String>> {
        self.lines
            .iter()
            .map(|raw| Line::parse(raw))
            .find(|line| line.name() == name)
            .map(|line| line.args().to_vec())
    }

    /// Run a body parser, reporting failures as a malformed reply
    pub fn parse_with<T>(&self, parse: impl FnOnce(&[String]) -> std::result::Result<T, ParseError>) -> Result<T> {
        parse(&self.lines).map_err(|e| {
            EngineError::MalformedReply(format!("{} (reply to {:?})", e, self.command))
        })
    }

    /// Turn a failed reply into an error
    pub fn into_result(self) -> Result<Reply> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(EngineError::Rejected {
                command: self.command,
                reason: self.terminal.text(),
            })
        }
    }
}

/// What the correlator did with an offered line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    /// No transaction is outstanding
    Idle,
    /// The line was the command echo and has been dropped
    Echo,
    /// The line was added to the reply
    Accumulated,
    /// The line ended the transaction
    Resolved {
        /// Command text
        command: String,
        /// Terminal line
        terminal: Terminal,
    },
    /// The line is a notification for the registry
    Declined,
    /// The line arrived before the command echo and is not part of the reply
    BeforeEcho,
}

struct Pending {
    id: u64,
    command: String,
    expect: Expect,
    lines: Vec<String>,
    /// Echo lines still expected before the reply starts
    echo: VecDeque<String>,
    reply_tx: oneshot::Sender<Reply>,
}

/// Strip the terminator and control bytes the modem puts around an echo
fn normalize(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_control() || c.is_whitespace())
}

/// Lines the modem echoes for a command (an SMS body may span several)
fn echo_lines(command: &str) -> VecDeque<String> {
    command
        .split(['\r', '\n'])
        .map(normalize)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Single-slot transaction mailbox
#[derive(Debug)]
pub struct Correlator {
    slot: Mutex<Option<Pending>>,
    next_id: AtomicU64,
    echo_filter: AtomicBool,
}

impl std::fmt::Debug for Pending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("lines", &self.lines.len())
            .finish()
    }
}

impl Correlator {
    /// Create an empty correlator
    pub fn new(echo_filter: bool) -> Self {
        Self {
            slot: Mutex::new(None),
            next_id: AtomicU64::new(0),
            echo_filter: AtomicBool::new(echo_filter),
        }
    }

    /// Expect (or stop expecting) the modem to echo commands
    ///
    /// Takes effect from the next transaction.
    pub fn set_echo_filter(&self, on: bool) {
        self.echo_filter.store(on, Ordering::Relaxed);
    }

    /// Whether commands are expected to be echoed
    pub fn echo_filter(&self) -> bool {
        self.echo_filter.load(Ordering::Relaxed)
    }

    /// Claim the slot for a command
    ///
    /// Fails with [`EngineError::Busy`] while another ticket is outstanding.
    pub fn begin(&self, command: &[u8], expect: Expect) -> Result<Ticket<'_>> {
        let mut slot = lock(&self.slot);
        if let Some(pending) = slot.as_ref() {
            debug!(
                "Rejecting {:?}: {:?} still outstanding",
                String::from_utf8_lossy(command),
                pending.command
            );
            return Err(EngineError::Busy);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = String::from_utf8_lossy(command);
        let echo = if self.echo_filter() {
            echo_lines(&text)
        } else {
            VecDeque::new()
        };
        let command = normalize(&text).to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        *slot = Some(Pending {
            id,
            command: command.clone(),
            expect,
            lines: Vec::new(),
            echo,
            reply_tx,
        });

        Ok(Ticket {
            correlator: self,
            id,
            command,
            rx: Some(reply_rx),
        })
    }

    /// Whether a transaction is outstanding
    pub fn is_pending(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Free the slot if it still belongs to ticket `id`
    fn abandon(&self, id: u64) -> bool {
        let mut slot = lock(&self.slot);
        if slot.as_ref().is_some_and(|p| p.id == id) {
            if let Some(pending) = slot.take() {
                debug!(
                    "Abandoned {:?} after {} reply lines",
                    pending.command,
                    pending.lines.len()
                );
            }
            true
        } else {
            false
        }
    }

    /// Drop the outstanding transaction; its caller sees `Stopped`
    pub fn cancel(&self) {
        if let Some(pending) = lock(&self.slot).take() {
            debug!("Cancelled {:?}", pending.command);
        }
    }

    /// Offer one received line to the outstanding transaction
    ///
    /// `registered` tells whether a notification handler answers for the
    /// line's name.
    pub fn offer(&self, line: &Line, registered: bool) -> Offer {
        let mut slot = lock(&self.slot);
        let Some(pending) = slot.as_mut() else {
            return Offer::Idle;
        };

        if let Some(expected) = pending.echo.front() {
            if normalize(line.raw()) == expected.as_str() {
                trace!("Dropping echo of {:?}", pending.command);
                pending.echo.pop_front();
                return Offer::Echo;
            }
            debug!(
                "Line {:?} arrived before the echo of {:?}",
                line.raw(),
                pending.command
            );
            return Offer::BeforeEcho;
        }

        if let Some(terminal) = pending.expect.terminal_for(line) {
            let Some(pending) = slot.take() else {
                return Offer::Idle;
            };
            let reply = Reply {
                command: pending.command.clone(),
                lines: pending.lines,
                terminal: terminal.clone(),
            };
            if pending.reply_tx.send(reply).is_err() {
                debug!("Caller for {:?} is gone, reply dropped", pending.command);
            }
            return Offer::Resolved {
                command: pending.command,
                terminal,
            };
        }

        if pending.expect.claims(line.name()) || !registered {
            pending.lines.push(line.raw().to_string());
            return Offer::Accumulated;
        }

        Offer::Declined
    }
}

/// Claim on the correlator slot
///
/// Dropping a ticket without a reply frees the slot, so a caller that gives
/// up (or is cancelled) never blocks later commands.
#[derive(Debug)]
pub struct Ticket<'a> {
    correlator: &'a Correlator,
    id: u64,
    command: String,
    rx: Option<oneshot::Receiver<Reply>>,
}

impl Ticket<'_> {
    /// Command text this ticket is waiting on
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Wait for the reply, freeing the slot on timeout
    pub async fn await_reply(mut self, timeout: Duration) -> Result<Reply> {
        let Some(rx) = self.rx.take() else {
            return Err(EngineError::Stopped);
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(EngineError::Stopped),
            Err(_) => {
                debug!("No reply to {:?} within {:?}", self.command, timeout);
                self.correlator.abandon(self.id);
                Err(EngineError::timed_out(timeout))
            }
        }
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.correlator.abandon(self.id);
    }
}

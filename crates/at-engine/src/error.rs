//! Error types for the transaction engine

use at_protocol::ParseError;
use thiserror::Error;

/// Errors returned to the caller of a transaction or wait
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another transaction is still outstanding
    #[error("a transaction is already outstanding")]
    Busy,

    /// No terminal line (or event) arrived before the deadline
    #[error("timed out after {waited_ms}ms")]
    TimedOut {
        /// How long the caller waited
        waited_ms: u64,
    },

    /// The reply ended normally but its body did not have the expected shape
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// The modem answered with an error result or failure token
    #[error("{command} rejected: {reason}")]
    Rejected {
        /// Command text as sent
        command: String,
        /// Terminal line that ended the transaction
        reason: String,
    },

    /// Read or write failure on the transport
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The serial port could not be opened
    #[error("failed to open serial port: {0}")]
    Open(#[from] tokio_serial::Error),

    /// A command argument could not be encoded
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] ParseError),

    /// The bridge loop is no longer running
    #[error("session stopped")]
    Stopped,

    /// The bridge loop task panicked
    #[error("bridge task failed: {0}")]
    BridgeFailed(String),
}

impl EngineError {
    /// Build a timeout error from the duration the caller waited
    pub(crate) fn timed_out(waited: std::time::Duration) -> Self {
        EngineError::TimedOut {
            waited_ms: waited.as_millis() as u64,
        }
    }

    /// Returns true for `Busy`
    pub fn is_busy(&self) -> bool {
        matches!(self, EngineError::Busy)
    }

    /// Returns true for `TimedOut`
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::TimedOut { .. })
    }
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

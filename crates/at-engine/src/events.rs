//! Unified event stream for a session
//!
//! Everything observable about a running session (decoded notifications,
//! raw traffic, completed transactions, errors) is published on one
//! broadcast channel, so a subscriber sees it in the order it happened.

use at_protocol::EventKind;

use crate::correlator::Terminal;

/// Event published by the bridge loop
#[derive(Debug, Clone)]
pub enum SessionEvent {
    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------
    /// A notification was dispatched to its handler
    Notification {
        /// Notification name
        name: String,
        /// Decoded arguments
        args: Vec<String>,
        /// What the handler made of it
        kind: EventKind,
    },

    // -------------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------------
    /// A command transaction ended
    TransactionCompleted {
        /// Command text
        command: String,
        /// Line that ended it
        terminal: Terminal,
    },

    // -------------------------------------------------------------------------
    // Traffic events
    // -------------------------------------------------------------------------
    /// Bytes received from the modem
    DataIn {
        /// Raw data bytes
        data: Vec<u8>,
    },

    /// Bytes written to the modem
    DataOut {
        /// Raw data bytes
        data: Vec<u8>,
    },

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------
    /// A non-fatal error inside the bridge loop
    Error {
        /// Where it happened
        source: String,
        /// What went wrong
        message: String,
    },

    /// The bridge loop has terminated
    Stopped,
}

impl SessionEvent {
    /// Returns true if this is a traffic event (data in/out)
    pub fn is_traffic(&self) -> bool {
        matches!(self, SessionEvent::DataIn { .. } | SessionEvent::DataOut { .. })
    }

    /// The decoded event, if this is a notification
    pub fn kind(&self) -> Option<&EventKind> {
        match self {
            SessionEvent::Notification { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

//! Error types for the virtual modem

use thiserror::Error;

/// Reasons the virtual modem refuses a command
///
/// These never leave the simulator as Rust errors; they are rendered as the
/// `ERROR` / `+CME ERROR` / `+CMS ERROR` line the module would send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// Unknown or malformed command
    #[error("ERROR")]
    Unsupported,

    /// Equipment error with a numeric code
    #[error("+CME ERROR: {0}")]
    Equipment(u16),

    /// Message service error with a numeric code
    #[error("+CMS ERROR: {0}")]
    MessageService(u16),
}

impl SimError {
    /// `+CME ERROR: 50` - incorrect parameters
    pub const INCORRECT_PARAMETERS: Self = SimError::Equipment(50);
    /// `+CMS ERROR: 302` - operation not allowed
    pub const NOT_ALLOWED: Self = SimError::MessageService(302);
    /// `+CMS ERROR: 321` - invalid memory index
    pub const INVALID_INDEX: Self = SimError::MessageService(321);
}

//! Basic module control commands

use crate::{terminate, EncodeCommand, ParseError};

/// Baud rates accepted by `AT+IPR` (0 selects auto-bauding)
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    0, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800,
];

/// General-purpose module commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BasicCommand {
    /// `AT` - attention, used to probe the link
    Attention,
    /// `ATE0` / `ATE1` - command echo
    Echo(bool),
    /// `AT+IPR=<rate>` - fixed baud rate
    SetBaudRate(u32),
    /// `AT+CPOWD=<n>` - power down (`urgent` skips the network detach)
    PowerDown {
        /// Power off immediately instead of detaching first
        urgent: bool,
    },
    /// `AT&W` - save the current settings to the user profile
    SaveProfile,
}

impl BasicCommand {
    /// Build `AT+IPR`, rejecting rates the module does not support
    pub fn baud_rate(rate: u32) -> Result<Self, ParseError> {
        if SUPPORTED_BAUD_RATES.contains(&rate) {
            Ok(BasicCommand::SetBaudRate(rate))
        } else {
            Err(ParseError::InvalidArgument(format!(
                "unsupported baud rate {}",
                rate
            )))
        }
    }
}

impl EncodeCommand for BasicCommand {
    fn encode(&self) -> Vec<u8> {
        let body = match self {
            BasicCommand::Attention => "AT".to_string(),
            BasicCommand::Echo(on) => format!("ATE{}", u8::from(*on)),
            BasicCommand::SetBaudRate(rate) => format!("AT+IPR={}", rate),
            BasicCommand::PowerDown { urgent } => format!("AT+CPOWD={}", u8::from(!*urgent)),
            BasicCommand::SaveProfile => "AT&W".to_string(),
        };
        terminate(body)
    }
}

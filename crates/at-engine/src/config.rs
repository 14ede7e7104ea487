//! Session and serial port configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::Result;

/// Tuning for one modem session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// How long one read waits before the bridge loop checks for commands again
    pub poll_interval_ms: u64,
    /// Default deadline for a command transaction
    pub command_timeout_ms: u64,
    /// Deadline for the boot notification sequence
    pub boot_timeout_ms: u64,
    /// Size of the read buffer handed to the transport
    pub read_buffer_size: usize,
    /// Longest line kept while waiting for its terminator
    pub max_line_len: usize,
    /// Capacity of the session event broadcast channel
    pub event_capacity: usize,
    /// Capacity of the bridge loop command queue
    pub command_queue: usize,
    /// Drop the modem's echo of the command in front of the reply
    pub echo_filter: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            command_timeout_ms: 1000,
            boot_timeout_ms: 60_000,
            read_buffer_size: 512,
            max_line_len: at_protocol::line::DEFAULT_MAX_LINE_LEN,
            event_capacity: 64,
            command_queue: 16,
            echo_filter: true,
        }
    }
}

impl SessionConfig {
    /// Poll interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Default command timeout as a `Duration`
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Boot timeout as a `Duration`
    pub fn boot_timeout(&self) -> Duration {
        Duration::from_millis(self.boot_timeout_ms)
    }
}

/// Serial link settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SerialSettings {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3)
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    /// Driver-level read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

fn default_baud() -> u32 {
    9600
}

fn default_read_timeout() -> u64 {
    100
}

impl SerialSettings {
    /// Settings for a port at the default baud rate
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud(),
            read_timeout_ms: default_read_timeout(),
        }
    }

    /// Open the port as an async stream
    pub fn open(&self) -> Result<SerialStream> {
        let stream = tokio_serial::new(&self.port, self.baud_rate)
            .timeout(Duration::from_millis(self.read_timeout_ms))
            .open_native_async()?;
        Ok(stream)
    }
}

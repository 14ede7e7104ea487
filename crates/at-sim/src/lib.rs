//! Virtual Modem Simulation
//!
//! This crate provides a simulated SIM800-style modem for exercising AT
//! command sessions without hardware. It includes:
//!
//! - **VirtualModem**: answers AT commands the way the module does (echo,
//!   reply lines, final result codes, the SMS prompt) and produces
//!   unsolicited notifications on request
//! - **run_virtual_modem_task**: an actor that serves a `VirtualModem` over
//!   any async byte stream, e.g. one end of `tokio::io::duplex()`
//!
//! # Example
//!
//! ```rust
//! use at_sim::VirtualModem;
//!
//! let mut modem = VirtualModem::new("SIM800L");
//! modem.feed(b"AT+CMGF?\r");
//!
//! let output = modem.take_output().unwrap();
//! assert_eq!(output, b"AT+CMGF?\r\n\r\n+CMGF: 1\r\n\r\nOK\r\n");
//! ```

pub mod error;
pub mod modem;
pub mod modem_task;

pub use error::SimError;
pub use modem::{CallState, VirtualModem, VirtualModemConfig};
pub use modem_task::{run_virtual_modem_task, spawn_virtual_modem, VirtualModemCommand};

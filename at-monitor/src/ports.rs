//! Serial port listing

use serialport::{available_ports, SerialPortType};
use tracing::{debug, warn};

/// Port name fragments that never lead to a modem
const SKIP_PATTERNS: &[&str] = &["Bluetooth", "debug"];

/// A serial port that may have a modem behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// USB vendor and product id (if USB)
    pub usb_id: Option<(u16, u16)>,
    /// USB product string
    pub product: Option<String>,
}

impl PortInfo {
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                usb_id: Some((usb.vid, usb.pid)),
                product: usb.product.clone(),
            },
            _ => Self {
                port: name,
                usb_id: None,
                product: None,
            },
        }
    }

    /// One-line description for listings
    pub fn display_label(&self) -> String {
        match (&self.usb_id, &self.product) {
            (Some((vid, pid)), Some(product)) => {
                format!("{} ({}, {:04x}:{:04x})", self.port, product, vid, pid)
            }
            (Some((vid, pid)), None) => format!("{} ({:04x}:{:04x})", self.port, vid, pid),
            _ => self.port.clone(),
        }
    }
}

fn skipped(name: &str) -> bool {
    SKIP_PATTERNS.iter().any(|p| name.contains(p))
}

/// List the serial ports on this machine
pub fn list_ports() -> Vec<PortInfo> {
    match available_ports() {
        Ok(ports) => ports
            .into_iter()
            .filter(|p| {
                let skip = skipped(&p.port_name);
                if skip {
                    debug!("Skipping port {}", p.port_name);
                }
                !skip
            })
            .map(|p| PortInfo::from_serialport(p.port_name, &p.port_type))
            .collect(),
        Err(e) => {
            warn!("Failed to enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}

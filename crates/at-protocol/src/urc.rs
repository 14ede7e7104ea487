//! Unsolicited result codes
//!
//! The modem emits notifications at any time, interleaved with command
//! replies. Every notification the driver understands decodes into an
//! [`EventKind`], and every kind owns one bit in [`EventBits`] so callers can
//! block until a combination of notifications has arrived.
//!
//! # Bit layout
//!
//! - bits 0-1: transaction outcome (reserved for the engine)
//! - bits 2-15: built-in notifications
//! - bits 16-31: free for feature-specific notifications ([`EventBits::feature`])

use std::fmt;

use bitflags::bitflags;

use crate::error::{numeric_arg, text_arg, ParseError};
use crate::http::HttpMethod;

/// `RDY` - module finished power-on
pub const RDY: &str = "RDY";
/// `+CFUN: <fun>` - phone functionality level
pub const CFUN: &str = "+CFUN";
/// `+CPIN: <code>` - SIM state
pub const CPIN: &str = "+CPIN";
/// `Call Ready` - voice call subsystem initialized
pub const CALL_READY: &str = "Call Ready";
/// `SMS Ready` - SMS subsystem initialized
pub const SMS_READY: &str = "SMS Ready";
/// `RING` - incoming call
pub const RING: &str = "RING";
/// `+CLIP: "<number>",<type>,...` - calling line identification
pub const CLIP: &str = "+CLIP";
/// `NO CARRIER` - call ended or failed
pub const NO_CARRIER: &str = "NO CARRIER";
/// `+CMGS: <mr>` - SMS sent with message reference
pub const CMGS: &str = "+CMGS";
/// `+CMTI: "<mem>",<index>` - new SMS stored
pub const CMTI: &str = "+CMTI";
/// `+HTTPACTION: <method>,<status>,<length>` - HTTP request finished
pub const HTTPACTION: &str = "+HTTPACTION";

bitflags! {
    /// Set of event bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct EventBits: u32 {
        // ---------------------------------------------------------------------
        // Reserved for the transaction engine
        // ---------------------------------------------------------------------
        /// The last transaction ended with `OK` (or a caller terminal token)
        const TRANSACTION_OK = 1 << 0;
        /// The last transaction ended with an error result
        const TRANSACTION_ERROR = 1 << 1;

        // ---------------------------------------------------------------------
        // Boot sequence
        // ---------------------------------------------------------------------
        /// `RDY`
        const READY = 1 << 2;
        /// `+CFUN: 0`
        const FUNCTIONALITY_MINIMUM = 1 << 3;
        /// `+CFUN: 1`
        const FUNCTIONALITY_FULL = 1 << 4;
        /// `+CFUN: 4`
        const FUNCTIONALITY_DISABLED = 1 << 5;
        /// `+CPIN: READY`
        const SIM_READY = 1 << 6;
        /// `+CPIN: <anything else>`
        const SIM_NOT_READY = 1 << 7;
        /// `Call Ready`
        const CALL_READY = 1 << 8;
        /// `SMS Ready`
        const SMS_READY = 1 << 9;

        // ---------------------------------------------------------------------
        // Calls
        // ---------------------------------------------------------------------
        /// `RING`
        const RING = 1 << 10;
        /// `+CLIP`
        const CALLER_ID = 1 << 11;
        /// `NO CARRIER`
        const NO_CARRIER = 1 << 12;

        // ---------------------------------------------------------------------
        // SMS and HTTP
        // ---------------------------------------------------------------------
        /// `+CMGS`
        const SMS_SENT = 1 << 13;
        /// `+CMTI`
        const SMS_RECEIVED = 1 << 14;
        /// `+HTTPACTION`
        const HTTP_ACTION = 1 << 15;

        /// Everything a freshly powered module reports before it accepts calls and SMS
        const BOOT = Self::READY.bits()
            | Self::FUNCTIONALITY_FULL.bits()
            | Self::SIM_READY.bits()
            | Self::CALL_READY.bits()
            | Self::SMS_READY.bits();

        // Feature bits are unnamed but still valid
        const _ = !0;
    }
}

impl EventBits {
    /// No bits
    pub const NONE: Self = Self::empty();

    /// First bit available to feature-specific notifications
    pub const FEATURE_SHIFT: u32 = 16;

    /// Bit `n` of the feature range (0-15)
    pub const fn feature(n: u32) -> Option<Self> {
        if n < 32 - Self::FEATURE_SHIFT {
            Some(Self::from_bits_retain(1 << (Self::FEATURE_SHIFT + n)))
        } else {
            None
        }
    }
}

impl Default for EventBits {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for EventBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.bits())
    }
}

/// Semantic meaning of a decoded notification
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    // -------------------------------------------------------------------------
    // Boot sequence
    // -------------------------------------------------------------------------
    /// Module powered on and is accepting commands
    Ready,
    /// Radio at minimum functionality
    FunctionalityMinimum,
    /// Radio at full functionality
    FunctionalityFull,
    /// Radio transmit and receive disabled
    FunctionalityDisabled,
    /// SIM unlocked and ready
    SimReady,
    /// SIM present but needs attention (PIN, PUK, not inserted...)
    SimNotReady {
        /// Status text reported by the module
        status: String,
    },
    /// Voice call subsystem initialized
    CallReady,
    /// SMS subsystem initialized
    SmsReady,

    // -------------------------------------------------------------------------
    // Calls
    // -------------------------------------------------------------------------
    /// Incoming call alert
    Ring,
    /// Caller identity for an incoming call
    CallerId {
        /// Calling number
        number: String,
        /// Type of address octet (129 national, 145 international)
        number_type: u8,
    },
    /// Call ended or could not be established
    NoCarrier,

    // -------------------------------------------------------------------------
    // SMS
    // -------------------------------------------------------------------------
    /// An outgoing message was accepted by the network
    SmsSent {
        /// Message reference assigned by the network
        reference: u16,
    },
    /// A new message was stored
    SmsReceived {
        /// Storage area (e.g. "SM")
        storage: String,
        /// Index within the storage area
        index: u16,
    },

    // -------------------------------------------------------------------------
    // HTTP
    // -------------------------------------------------------------------------
    /// An HTTP request finished
    HttpAction {
        /// Request method
        method: HttpMethod,
        /// HTTP status code (or modem-specific 6xx network error)
        status: u16,
        /// Length of the response body held by the module
        length: usize,
    },

    // -------------------------------------------------------------------------
    // Feature-specific
    // -------------------------------------------------------------------------
    /// A notification decoded by a caller-supplied handler
    Custom {
        /// Notification name
        name: String,
        /// Raw arguments
        args: Vec<String>,
        /// Bits to raise when this notification arrives
        bits: EventBits,
    },
}

impl EventKind {
    /// Bits raised when this event is dispatched
    pub fn bits(&self) -> EventBits {
        match self {
            EventKind::Ready => EventBits::READY,
            EventKind::FunctionalityMinimum => EventBits::FUNCTIONALITY_MINIMUM,
            EventKind::FunctionalityFull => EventBits::FUNCTIONALITY_FULL,
            EventKind::FunctionalityDisabled => EventBits::FUNCTIONALITY_DISABLED,
            EventKind::SimReady => EventBits::SIM_READY,
            EventKind::SimNotReady { .. } => EventBits::SIM_NOT_READY,
            EventKind::CallReady => EventBits::CALL_READY,
            EventKind::SmsReady => EventBits::SMS_READY,
            EventKind::Ring => EventBits::RING,
            EventKind::CallerId { .. } => EventBits::CALLER_ID,
            EventKind::NoCarrier => EventBits::NO_CARRIER,
            EventKind::SmsSent { .. } => EventBits::SMS_SENT,
            EventKind::SmsReceived { .. } => EventBits::SMS_RECEIVED,
            EventKind::HttpAction { .. } => EventBits::HTTP_ACTION,
            EventKind::Custom { bits, .. } => *bits,
        }
    }
}

/// A built-in notification decoder
pub type Decoder = fn(&[String]) -> Result<EventKind, ParseError>;

/// Decode `RDY`
pub fn decode_ready(_args: &[String]) -> Result<EventKind, ParseError> {
    Ok(EventKind::Ready)
}

/// Decode `+CFUN: <fun>`
pub fn decode_functionality(args: &[String]) -> Result<EventKind, ParseError> {
    match text_arg(args, 0, CFUN)?.trim() {
        "0" => Ok(EventKind::FunctionalityMinimum),
        "1" => Ok(EventKind::FunctionalityFull),
        "4" => Ok(EventKind::FunctionalityDisabled),
        other => Err(ParseError::InvalidField {
            field: "functionality level",
            value: other.to_string(),
        }),
    }
}

/// Decode `+CPIN: <code>`
pub fn decode_sim(args: &[String]) -> Result<EventKind, ParseError> {
    let status = text_arg(args, 0, CPIN)?;
    if status == "READY" {
        Ok(EventKind::SimReady)
    } else {
        Ok(EventKind::SimNotReady {
            status: status.to_string(),
        })
    }
}

/// Decode `Call Ready`
pub fn decode_call_ready(_args: &[String]) -> Result<EventKind, ParseError> {
    Ok(EventKind::CallReady)
}

/// Decode `SMS Ready`
pub fn decode_sms_ready(_args: &[String]) -> Result<EventKind, ParseError> {
    Ok(EventKind::SmsReady)
}

/// Decode `RING`
pub fn decode_ring(_args: &[String]) -> Result<EventKind, ParseError> {
    Ok(EventKind::Ring)
}

/// Decode `+CLIP: "<number>",<type>[,...]`
pub fn decode_caller_id(args: &[String]) -> Result<EventKind, ParseError> {
    Ok(EventKind::CallerId {
        number: text_arg(args, 0, CLIP)?.to_string(),
        number_type: numeric_arg(args, 1, CLIP, "number type")?,
    })
}

/// Decode `NO CARRIER`
pub fn decode_no_carrier(_args: &[String]) -> Result<EventKind, ParseError> {
    Ok(EventKind::NoCarrier)
}

/// Decode `+CMGS: <mr>`
pub fn decode_sms_sent(args: &[String]) -> Result<EventKind, ParseError> {
    Ok(EventKind::SmsSent {
        reference: numeric_arg(args, 0, CMGS, "message reference")?,
    })
}

/// Decode `+CMTI: "<mem>",<index>`
pub fn decode_sms_received(args: &[String]) -> Result<EventKind, ParseError> {
    Ok(EventKind::SmsReceived {
        storage: text_arg(args, 0, CMTI)?.to_string(),
        index: numeric_arg(args, 1, CMTI, "message index")?,
    })
}

/// Decode `+HTTPACTION: <method>,<status>,<length>`
pub fn decode_http_action(args: &[String]) -> Result<EventKind, ParseError> {
    let method: u8 = numeric_arg(args, 0, HTTPACTION, "HTTP method")?;
    Ok(EventKind::HttpAction {
        method: HttpMethod::from_code(method)?,
        status: numeric_arg(args, 1, HTTPACTION, "HTTP status")?,
        length: numeric_arg(args, 2, HTTPACTION, "content length")?,
    })
}

/// Notifications the module reports while booting
pub const BOOT_NOTIFICATIONS: [(&str, Decoder); 5] = [
    (RDY, decode_ready),
    (CFUN, decode_functionality),
    (CPIN, decode_sim),
    (CALL_READY, decode_call_ready),
    (SMS_READY, decode_sms_ready),
];

/// Notifications for voice calls
pub const CALL_NOTIFICATIONS: [(&str, Decoder); 3] = [
    (RING, decode_ring),
    (CLIP, decode_caller_id),
    (NO_CARRIER, decode_no_carrier),
];

/// Notifications for SMS
pub const SMS_NOTIFICATIONS: [(&str, Decoder); 2] =
    [(CMGS, decode_sms_sent), (CMTI, decode_sms_received)];

/// Notifications for HTTP
pub const HTTP_NOTIFICATIONS: [(&str, Decoder); 1] = [(HTTPACTION, decode_http_action)];

/// Look up the built-in decoder for a notification name
pub fn builtin(name: &str) -> Option<Decoder> {
    BOOT_NOTIFICATIONS
        .iter()
        .chain(CALL_NOTIFICATIONS.iter())
        .chain(SMS_NOTIFICATIONS.iter())
        .chain(HTTP_NOTIFICATIONS.iter())
        .find(|(n, _)| *n == name)
        .map(|(_, decoder)| *decoder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Line;

    fn args(line: &str) -> Vec<String> {
        Line::parse(line).args().to_vec()
    }

    #[test]
    fn test_http_action() {
        let event = decode_http_action(&args("+HTTPACTION: 0,200,1024")).unwrap();
        assert_eq!(
            event,
            EventKind::HttpAction {
                method: HttpMethod::Get,
                status: 200,
                length: 1024,
            }
        );
        assert_eq!(event.bits(), EventBits::HTTP_ACTION);
    }

    #[test]
    fn test_http_action_bad_method() {
        assert!(decode_http_action(&args("+HTTPACTION: 9,200,0")).is_err());
    }

    #[test]
    fn test_caller_id() {
        let event = decode_caller_id(&args("+CLIP: \"+5581999999999\",145,\"\",0,\"\",0")).unwrap();
        assert_eq!(
            event,
            EventKind::CallerId {
                number: "+5581999999999".into(),
                number_type: 145,
            }
        );
    }

    #[test]
    fn test_caller_id_missing_type() {
        assert_eq!(
            decode_caller_id(&args("+CLIP: \"123\"")),
            Err(ParseError::MissingArgument {
                context: CLIP,
                index: 1
            })
        );
    }

    #[test]
    fn test_functionality_levels() {
        assert_eq!(
            decode_functionality(&args("+CFUN: 1")),
            Ok(EventKind::FunctionalityFull)
        );
        assert_eq!(
            decode_functionality(&args("+CFUN: 0")),
            Ok(EventKind::FunctionalityMinimum)
        );
        assert_eq!(
            decode_functionality(&args("+CFUN: 4")),
            Ok(EventKind::FunctionalityDisabled)
        );
        assert!(decode_functionality(&args("+CFUN: 7")).is_err());
    }

    #[test]
    fn test_sim_status() {
        assert_eq!(decode_sim(&args("+CPIN: READY")), Ok(EventKind::SimReady));
        let event = decode_sim(&args("+CPIN: SIM PIN")).unwrap();
        assert_eq!(
            event,
            EventKind::SimNotReady {
                status: "SIM PIN".into()
            }
        );
    }

    #[test]
    fn test_sms_received() {
        assert_eq!(
            decode_sms_received(&args("+CMTI: \"SM\",3")),
            Ok(EventKind::SmsReceived {
                storage: "SM".into(),
                index: 3
            })
        );
    }

    #[test]
    fn test_boot_mask() {
        let mut seen = EventBits::NONE;
        for (name, decoder) in BOOT_NOTIFICATIONS {
            let line = match name {
                CFUN => "+CFUN: 1",
                CPIN => "+CPIN: READY",
                other => other,
            };
            seen |= decoder(&args(line)).unwrap().bits();
        }
        assert_eq!(seen, EventBits::BOOT);
    }

    #[test]
    fn test_builtin_lookup_is_exact() {
        assert!(builtin("+CPIN").is_some());
        assert!(builtin("+CPI").is_none());
        assert!(builtin("+CME").is_none());
        assert!(builtin(HTTPACTION).is_some());
    }

    #[test]
    fn test_feature_bits() {
        assert_eq!(EventBits::feature(0), Some(EventBits::from_bits_retain(1 << 16)));
        assert_eq!(EventBits::feature(15), Some(EventBits::from_bits_retain(1 << 31)));
        assert_eq!(EventBits::feature(16), None);
    }

    #[test]
    fn test_bit_helpers() {
        let ab = EventBits::RING | EventBits::CALLER_ID;
        assert!(ab.contains(EventBits::RING));
        assert!(!EventBits::RING.contains(ab));
        assert!(ab.intersects(EventBits::CALLER_ID | EventBits::SMS_SENT));
        assert_eq!(ab.difference(EventBits::RING), EventBits::CALLER_ID);
        assert!((ab & EventBits::SMS_SENT).is_empty());
    }
}

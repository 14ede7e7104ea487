//! Event rendering for the terminal

use at_engine::SessionEvent;
use serde_json::{json, Value};

/// Human-readable line for one event
pub fn render(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Notification { name, args, kind } => {
            if args.is_empty() {
                format!("<< {}  {:?}", name, kind)
            } else {
                format!("<< {}: {}  {:?}", name, args.join(","), kind)
            }
        }
        SessionEvent::TransactionCompleted { command, terminal } => {
            format!("== {} -> {}", command, terminal.text())
        }
        SessionEvent::DataIn { data } => format!("RX {}", data.escape_ascii()),
        SessionEvent::DataOut { data } => format!("TX {}", data.escape_ascii()),
        SessionEvent::Error { source, message } => format!("!! {}: {}", source, message),
        SessionEvent::Stopped => "-- session stopped".to_string(),
    }
}

/// JSON object for one event
pub fn to_json(event: &SessionEvent) -> Value {
    match event {
        SessionEvent::Notification { name, args, kind } => json!({
            "type": "notification",
            "name": name,
            "args": args,
            "kind": serde_json::to_value(kind).unwrap_or(Value::Null),
            "bits": kind.bits().bits(),
        }),
        SessionEvent::TransactionCompleted { command, terminal } => json!({
            "type": "transaction",
            "command": command,
            "terminal": terminal.text(),
            "ok": terminal.is_ok(),
        }),
        SessionEvent::DataIn { data } => json!({
            "type": "rx",
            "data": data.escape_ascii().to_string(),
        }),
        SessionEvent::DataOut { data } => json!({
            "type": "tx",
            "data": data.escape_ascii().to_string(),
        }),
        SessionEvent::Error { source, message } => json!({
            "type": "error",
            "source": source,
            "message": message,
        }),
        SessionEvent::Stopped => json!({ "type": "stopped" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use at_engine::Terminal;
    use at_protocol::{EventKind, FinalResult};

    #[test]
    fn test_render_notification() {
        let event = SessionEvent::Notification {
            name: "+CMTI".to_string(),
            args: vec!["SM".to_string(), "3".to_string()],
            kind: EventKind::SmsReceived {
                storage: "SM".to_string(),
                index: 3,
            },
        };
        assert!(render(&event).starts_with("<< +CMTI: SM,3  SmsReceived"));
    }

    #[test]
    fn test_render_traffic_escapes_control_bytes() {
        let event = SessionEvent::DataIn {
            data: b"\r\nOK\r\n".to_vec(),
        };
        assert_eq!(render(&event), "RX \\r\\nOK\\r\\n");
    }

    #[test]
    fn test_transaction_json() {
        let event = SessionEvent::TransactionCompleted {
            command: "AT".to_string(),
            terminal: Terminal::Result(FinalResult::CmeError("50".to_string())),
        };
        let value = to_json(&event);
        assert_eq!(value["type"], "transaction");
        assert_eq!(value["ok"], false);
        assert_eq!(value["terminal"], "+CME ERROR: 50");
    }
}

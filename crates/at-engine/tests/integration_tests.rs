//! Integration tests for the AT transaction engine
//!
//! These tests run a full session (bridge loop, correlator, registry and
//! flag bus) against either a scripted peer or the virtual modem:
//! - Transactions, echo filtering and partial reads
//! - Single-slot behaviour: busy rejection, slot recovery after timeouts,
//!   stale results and stalled writes
//! - Notification dispatch and its ordering relative to replies
//! - Event waits across several notifications
//! - Feature flows: boot, calls, SMS, bearer and HTTP
//! - Teardown (also with a transaction outstanding) and link loss

use std::time::Duration;

use at_engine::{EngineError, Expect, Session, SessionConfig, SessionEvent, Terminal};
use at_protocol::call::CallCommand;
use at_protocol::sms::SmsFormat;
use at_protocol::{EventBits, EventKind};
use at_sim::{spawn_virtual_modem, VirtualModem, VirtualModemCommand, VirtualModemConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Short poll interval and timeouts so tests finish quickly
    pub fn fast_config() -> SessionConfig {
        SessionConfig {
            poll_interval_ms: 5,
            command_timeout_ms: 500,
            ..Default::default()
        }
    }

    /// Session whose other end is driven by the test; the peer does not echo
    pub fn scripted() -> (Session<DuplexStream>, DuplexStream) {
        scripted_with(SessionConfig {
            echo_filter: false,
            ..fast_config()
        })
    }

    pub fn scripted_with(config: SessionConfig) -> (Session<DuplexStream>, DuplexStream) {
        let (host, peer) = tokio::io::duplex(1024);
        (Session::start(host, config), peer)
    }

    /// Session talking to a virtual modem
    pub fn simulated(
        modem: VirtualModem,
    ) -> (
        Session<DuplexStream>,
        tokio::sync::mpsc::Sender<VirtualModemCommand>,
        tokio::task::JoinHandle<std::io::Result<VirtualModem>>,
    ) {
        let config = SessionConfig {
            echo_filter: modem.echo(),
            ..fast_config()
        };
        let (host, cmd_tx, handle) = spawn_virtual_modem(modem);
        (Session::start(host, config), cmd_tx, handle)
    }

    /// Read one command line written by the session
    pub async fn read_command(peer: &mut DuplexStream) -> String {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            tokio::time::timeout(Duration::from_secs(1), peer.read_exact(&mut byte))
                .await
                .expect("no command from session")
                .expect("peer read failed");
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        String::from_utf8_lossy(&line).trim_end().to_string()
    }

    /// Non-traffic events received so far
    pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if !event.is_traffic() {
                events.push(event);
            }
        }
        events
    }

    pub fn quiet_modem() -> VirtualModem {
        VirtualModem::from_config(VirtualModemConfig {
            echo: false,
            ..Default::default()
        })
    }
}

// ============================================================================
// Transaction Tests
// ============================================================================

mod transaction_tests {
    use super::*;

    #[tokio::test]
    async fn reply_lines_are_collected_without_echo() {
        let (session, _cmd_tx, _handle) = helpers::simulated(VirtualModem::new("Echo"));

        let reply = session
            .transact_bytes(b"AT+CMGF?\r\n", Expect::final_result(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(reply.command, "AT+CMGF?");
        assert_eq!(reply.lines, vec!["+CMGF: 1"]);
        assert_eq!(reply.terminal, Terminal::Result(at_protocol::FinalResult::Ok));
        assert_eq!(reply.text(), "+CMGF: 1\nOK");
    }

    #[tokio::test]
    async fn reply_split_across_reads() {
        let modem = VirtualModem::from_config(VirtualModemConfig {
            chunk_size: Some(3),
            ..Default::default()
        });
        let (session, cmd_tx, _handle) = helpers::simulated(modem);

        assert_eq!(session.sms_format().await.unwrap(), SmsFormat::Text);

        cmd_tx
            .send(VirtualModemCommand::ReceiveSms {
                sender: "+5581988887777".into(),
                text: "split, into, pieces".into(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let message = session.read_sms(1).await.unwrap();
        assert_eq!(message.sender, "+5581988887777");
        assert_eq!(message.timestamp, at_sim::modem::DEFAULT_TIMESTAMP);
        assert_eq!(message.text, "split, into, pieces");
    }

    #[tokio::test]
    async fn echo_can_be_switched_at_runtime() {
        let (session, _cmd_tx, _handle) = helpers::simulated(VirtualModem::new("Echo"));

        session.set_echo(false).await.unwrap();
        assert_eq!(session.sms_format().await.unwrap(), SmsFormat::Text);

        session.set_echo(true).await.unwrap();
        let reply = session
            .transact_bytes(b"AT+CMGF?\r\n", Expect::final_result(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.lines, vec!["+CMGF: 1"]);
    }

    #[tokio::test]
    async fn error_result_is_rejected() {
        let (session, _cmd_tx, _handle) = helpers::simulated(helpers::quiet_modem());

        match session
            .transact_bytes(b"AT+FOO\r\n", Expect::final_result(), Duration::from_secs(1))
            .await
        {
            Err(EngineError::Rejected { command, reason }) => {
                assert_eq!(command, "AT+FOO");
                assert_eq!(reason, "ERROR");
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        let err = session.set_speaker_volume(101).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidCommand(_)));
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn transaction_bits_follow_result() {
        let (session, _cmd_tx, _handle) = helpers::simulated(helpers::quiet_modem());

        session.probe().await.unwrap();
        assert!(session.flags().contains(EventBits::TRANSACTION_OK));

        assert!(session
            .transact_bytes(b"AT+BAD\r\n", Expect::final_result(), Duration::from_secs(1))
            .await
            .is_err());
        let flags = session.flags();
        assert!(flags.contains(EventBits::TRANSACTION_ERROR));
        assert!(!flags.contains(EventBits::TRANSACTION_OK));
    }
}

// ============================================================================
// Single-Slot Tests
// ============================================================================

mod slot_tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_transaction_is_busy() {
        let (session, mut peer) = helpers::scripted();

        let first = session.transact_bytes(b"AT\r\n", Expect::final_result(), Duration::from_secs(1));
        let second = async {
            while !session.is_busy() {
                tokio::task::yield_now().await;
            }
            session
                .transact_bytes(b"ATI\r\n", Expect::final_result(), Duration::from_secs(1))
                .await
        };
        let script = async {
            assert_eq!(helpers::read_command(&mut peer).await, "AT");
            peer.write_all(b"\r\nOK\r\n").await.unwrap();
        };

        let (first, second, ()) = tokio::join!(first, second, script);
        assert!(first.unwrap().is_ok());
        assert!(second.unwrap_err().is_busy());
    }

    #[tokio::test]
    async fn timeout_frees_the_slot() {
        let (session, mut peer) = helpers::scripted();

        let err = session
            .transact_bytes(b"AT\r\n", Expect::final_result(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(!session.is_busy());
        assert_eq!(helpers::read_command(&mut peer).await, "AT");

        // A late answer to the abandoned command is not taken as a reply
        peer.write_all(b"\r\nOK\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let next = session.transact_bytes(b"ATE0\r\n", Expect::final_result(), Duration::from_secs(1));
        let script = async {
            assert_eq!(helpers::read_command(&mut peer).await, "ATE0");
            peer.write_all(b"\r\nOK\r\n").await.unwrap();
        };
        let (reply, ()) = tokio::join!(next, script);
        assert_eq!(reply.unwrap().command, "ATE0");
    }

    #[tokio::test]
    async fn stale_result_before_echo_is_not_the_reply() {
        let (session, mut peer) = helpers::scripted_with(helpers::fast_config());

        let err = session
            .transact_bytes(b"AT\r\n", Expect::final_result(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(helpers::read_command(&mut peer).await, "AT");

        // The answer to AT only shows up once the next command is on its way
        let next = session.transact_bytes(b"ATE0\r\n", Expect::final_result(), Duration::from_secs(1));
        let script = async {
            assert_eq!(helpers::read_command(&mut peer).await, "ATE0");
            peer.write_all(b"\r\nERROR\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            peer.write_all(b"ATE0\r\r\n\r\nOK\r\n").await.unwrap();
        };
        let (reply, ()) = tokio::join!(next, script);
        let reply = reply.unwrap();
        assert_eq!(reply.command, "ATE0");
        assert_eq!(reply.text(), "OK");
        assert!(session.flags().contains(EventBits::TRANSACTION_OK));
    }

    #[tokio::test]
    async fn stalled_write_fails_within_the_timeout() {
        // The peer never reads, so the pipe fills after a few bytes
        let (host, _peer) = tokio::io::duplex(8);
        let session = Session::start(host, helpers::fast_config());
        let command = format!(
            "AT+HTTPPARA=\"URL\",\"http://example.com/{}\"\r\n",
            "a".repeat(64)
        );

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            session.transact_bytes(command.as_bytes(), Expect::final_result(), Duration::from_millis(100)),
        )
        .await
        .expect("write was not bounded by the transaction timeout");
        assert!(matches!(result, Err(EngineError::Transport(_))));
        assert!(!session.is_busy());

        tokio::time::timeout(Duration::from_secs(2), session.stop())
            .await
            .expect("bridge loop stuck in the write")
            .unwrap();
    }

    #[tokio::test]
    async fn silent_modem_times_out() {
        let (session, cmd_tx, _handle) = helpers::simulated(helpers::quiet_modem());
        cmd_tx.send(VirtualModemCommand::SetSilent(true)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = session
            .transact_bytes(b"AT\r\n", Expect::final_result(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TimedOut { waited_ms: 100 }));

        cmd_tx.send(VirtualModemCommand::SetSilent(false)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.probe().await.unwrap();
    }
}

// ============================================================================
// Notification Tests
// ============================================================================

mod notification_tests {
    use super::*;

    #[tokio::test]
    async fn notification_during_transaction_is_dispatched_first() {
        let (session, mut peer) = helpers::scripted();
        session.enable_call_events();
        let mut events = session.subscribe();

        let command = CallCommand::dial("+5581999999999").unwrap();
        let dial = session.transact(&command, Duration::from_secs(1));
        let script = async {
            assert_eq!(helpers::read_command(&mut peer).await, "ATD+5581999999999;");
            peer.write_all(b"\r\nRING\r\n\r\nOK\r\n").await.unwrap();
        };

        let (reply, ()) = tokio::join!(dial, script);
        let reply = reply.unwrap();
        assert!(reply.lines.is_empty());
        assert_eq!(reply.text(), "OK");

        let events = helpers::drain(&mut events);
        let ring = events
            .iter()
            .position(|e| e.kind() == Some(&EventKind::Ring))
            .expect("RING was not dispatched");
        let done = events
            .iter()
            .position(|e| matches!(e, SessionEvent::TransactionCompleted { .. }))
            .expect("transaction not reported");
        assert!(ring < done);
        assert!(session.flags().contains(EventBits::RING));
    }

    #[tokio::test]
    async fn unregistered_line_joins_the_reply() {
        let (session, mut peer) = helpers::scripted();

        let dial = session.transact(&CallCommand::Answer, Duration::from_secs(1));
        let script = async {
            helpers::read_command(&mut peer).await;
            peer.write_all(b"\r\nRING\r\n\r\nOK\r\n").await.unwrap();
        };

        let (reply, ()) = tokio::join!(dial, script);
        assert_eq!(reply.unwrap().lines, vec!["RING"]);
        assert!(!session.flags().contains(EventBits::RING));
    }

    #[tokio::test]
    async fn http_action_notification_is_decoded() {
        let (session, mut peer) = helpers::scripted();
        session.register_decoders(&at_protocol::urc::HTTP_NOTIFICATIONS);
        let mut events = session.subscribe();

        peer.write_all(b"\r\n+HTTPACTION: 0,200,1024\r\n").await.unwrap();
        session
            .wait(EventBits::HTTP_ACTION, Duration::from_secs(1))
            .await
            .unwrap();

        let event = helpers::drain(&mut events)
            .into_iter()
            .find_map(|e| match e {
                SessionEvent::Notification { name, args, kind } => Some((name, args, kind)),
                _ => None,
            })
            .unwrap();
        assert_eq!(event.0, "+HTTPACTION");
        assert_eq!(event.1, vec!["0", "200", "1024"]);
        assert_eq!(
            event.2,
            EventKind::HttpAction {
                method: at_protocol::http::HttpMethod::Get,
                status: 200,
                length: 1024,
            }
        );
        // Consumed by the wait
        assert!(!session.flags().contains(EventBits::HTTP_ACTION));
    }

    #[tokio::test]
    async fn unknown_notification_is_ignored() {
        let (session, mut peer) = helpers::scripted();
        let mut events = session.subscribe();

        peer.write_all(b"\r\n+CUSD: 0,\"hello\",15\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(helpers::drain(&mut events).is_empty());
        assert!(session.flags().is_empty());
    }

    #[tokio::test]
    async fn malformed_notification_is_reported() {
        let (session, mut peer) = helpers::scripted();
        session.enable_call_events();
        let mut events = session.subscribe();

        peer.write_all(b"\r\n+CLIP: \r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let events = helpers::drain(&mut events);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Error { .. })));
        assert!(!session.flags().contains(EventBits::CALLER_ID));
    }

    #[tokio::test]
    async fn wait_needs_every_bit() {
        let (session, mut peer) = helpers::scripted();
        let a = EventBits::feature(0).unwrap();
        let b = EventBits::feature(1).unwrap();
        session.register_custom("+A", a);
        session.register_custom("+B", b);

        let wait = session.wait(a | b, Duration::from_secs(1));
        let script = async {
            peer.write_all(b"\r\n+B: 1\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert!(session.flags().contains(b));
            peer.write_all(b"\r\n+A: 1\r\n").await.unwrap();
        };

        let (result, ()) = tokio::join!(wait, script);
        assert!(result.unwrap().contains(a | b));
        assert!(!session.flags().intersects(a | b));
    }

    #[tokio::test]
    async fn disabling_a_group_keeps_other_handlers() {
        let (session, mut peer) = helpers::scripted();
        session.enable_call_events();
        let bit = EventBits::feature(3).unwrap();
        session.register_custom("RING", bit);
        session.disable_call_events();

        peer.write_all(b"\r\nRING\r\n").await.unwrap();
        session.wait(bit, Duration::from_secs(1)).await.unwrap();
        assert!(!session.flags().contains(EventBits::RING));
    }

    #[tokio::test]
    async fn unregistered_name_stops_dispatch() {
        let (session, mut peer) = helpers::scripted();
        let bit = EventBits::feature(2).unwrap();
        let id = session.register_custom("+X", bit);
        assert!(session.unregister(id));

        peer.write_all(b"\r\n+X\r\n").await.unwrap();
        assert!(session
            .wait(bit, Duration::from_millis(50))
            .await
            .unwrap_err()
            .is_timeout());
    }
}

// ============================================================================
// Feature Flow Tests
// ============================================================================

mod feature_tests {
    use super::*;

    #[tokio::test]
    async fn bring_up_waits_for_boot_sequence() {
        let (session, cmd_tx, _handle) = helpers::simulated(VirtualModem::new("Boot"));

        let boot = session.bring_up(Duration::from_secs(2));
        let power_on = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cmd_tx.send(VirtualModemCommand::Boot).await.unwrap();
        };

        let (result, ()) = tokio::join!(boot, power_on);
        result.unwrap();
        assert!(!session.flags().intersects(EventBits::BOOT));
    }

    #[tokio::test]
    async fn bring_up_times_out_without_boot() {
        let (session, _cmd_tx, _handle) = helpers::simulated(helpers::quiet_modem());
        let err = session.bring_up(Duration::from_millis(100)).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn incoming_call_flow() {
        let (session, cmd_tx, _handle) = helpers::simulated(VirtualModem::new("Call"));
        session.enable_call_events();
        session.set_caller_id(true).await.unwrap();
        let mut events = session.subscribe();

        cmd_tx
            .send(VirtualModemCommand::Ring {
                number: "+5581999999999".into(),
            })
            .await
            .unwrap();
        session.wait_for_ring(Duration::from_secs(1)).await.unwrap();
        session
            .wait(EventBits::CALLER_ID, Duration::from_secs(1))
            .await
            .unwrap();

        let caller = helpers::drain(&mut events).into_iter().find_map(|e| match e.kind() {
            Some(EventKind::CallerId { number, number_type }) => Some((number.clone(), *number_type)),
            _ => None,
        });
        assert_eq!(caller, Some(("+5581999999999".to_string(), 145)));

        session.answer().await.unwrap();
        cmd_tx.send(VirtualModemCommand::HangUpRemote).await.unwrap();
        session
            .wait(EventBits::NO_CARRIER, Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dial_failure_token_is_rejected() {
        let mut modem = helpers::quiet_modem();
        modem.set_dial_failure(Some("BUSY"));
        let (session, _cmd_tx, _handle) = helpers::simulated(modem);

        match session.dial("+5581999999999").await {
            Err(EngineError::Rejected { reason, .. }) => assert_eq!(reason, "BUSY"),
            other => panic!("expected BUSY, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_sms_flow() {
        let (session, _cmd_tx, handle) = helpers::simulated(VirtualModem::new("Sms"));
        session.enable_sms_events();
        session.set_sms_format(SmsFormat::Text).await.unwrap();

        let reference = session.send_sms("+5581999999999", "hello").await.unwrap();
        assert_eq!(reference, 1);
        assert!(session.flags().contains(EventBits::SMS_SENT));

        let host = session.stop().await.unwrap();
        drop(host);
        let modem = handle.await.unwrap().unwrap();
        assert_eq!(
            modem.sent_messages(),
            &[("+5581999999999".to_string(), "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn send_sms_rejects_ctrl_z_in_text() {
        let (session, _cmd_tx, _handle) = helpers::simulated(helpers::quiet_modem());
        let err = session.send_sms("123", "bad\x1a").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidCommand(_)));
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn incoming_sms_flow() {
        let (session, cmd_tx, _handle) = helpers::simulated(helpers::quiet_modem());
        session.enable_sms_events();

        let wait = session.wait_for_sms(Duration::from_secs(1));
        let deliver = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cmd_tx
                .send(VirtualModemCommand::ReceiveSms {
                    sender: "+5581988887777".into(),
                    text: "ping".into(),
                })
                .await
                .unwrap();
        };
        let (stored, ()) = tokio::join!(wait, deliver);
        let (storage, index) = stored.unwrap();
        assert_eq!(storage, "SM");

        let message = session.read_sms(index).await.unwrap();
        assert_eq!(message.text, "ping");
        session
            .delete_sms(index, at_protocol::sms::DeleteFlag::Index)
            .await
            .unwrap();
        assert!(session.read_sms(index).await.is_err());
    }

    #[tokio::test]
    async fn http_get_over_bearer() {
        let mut modem = helpers::quiet_modem();
        modem.set_http_response(200, "hello world");
        let (session, _cmd_tx, _handle) = helpers::simulated(modem);

        session
            .set_bearer_param(at_protocol::bearer::BearerParam::Apn, "internet")
            .await
            .unwrap();
        session.open_bearer().await.unwrap();
        let info = session.query_bearer().await.unwrap();
        assert_eq!(info.status, at_protocol::bearer::BearerStatus::Connected);
        assert!(info.address.is_some());

        let profile = session.bearer_profile().await.unwrap();
        assert_eq!(
            profile.get(at_protocol::bearer::BearerParam::Apn),
            Some("internet")
        );

        session.http_init().await.unwrap();
        let (status, body) = session
            .http_get("http://example.com", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, "hello world");

        let params = session.http_params().await.unwrap();
        assert_eq!(
            params.get(at_protocol::http::HttpParam::Url),
            Some("http://example.com")
        );
        assert_eq!(params.get(at_protocol::http::HttpParam::Cid), Some("1"));

        session.http_terminate().await.unwrap();
        session.close_bearer().await.unwrap();
    }

    #[tokio::test]
    async fn http_without_bearer_reports_network_error() {
        let (session, _cmd_tx, _handle) = helpers::simulated(helpers::quiet_modem());
        session.http_init().await.unwrap();

        let response = session
            .http_action(at_protocol::http::HttpMethod::Get, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response.status, at_sim::modem::NETWORK_ERROR_STATUS);
        assert_eq!(response.length, 0);
    }
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn stop_returns_the_transport() {
        let (session, mut peer) = helpers::scripted();
        let mut state = session.bridge_state();

        let mut host = session.stop().await.unwrap();
        assert_eq!(*state.borrow_and_update(), at_engine::BridgeState::Stopped);

        // The transport is still usable after the loop has let go of it
        host.write_all(b"AT\r\n").await.unwrap();
        assert_eq!(helpers::read_command(&mut peer).await, "AT");
    }

    #[tokio::test]
    async fn raw_write_does_not_open_a_transaction() {
        let (session, mut peer) = helpers::scripted();

        session.send_raw(b"AT+CPOWD=1\r\n").await.unwrap();
        assert_eq!(helpers::read_command(&mut peer).await, "AT+CPOWD=1");
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn stop_ends_an_outstanding_transaction() {
        let (session, mut peer) = helpers::scripted();
        let started = tokio::time::Instant::now();

        let pending = session.transact_bytes(b"AT\r\n", Expect::final_result(), Duration::from_secs(5));
        let shutdown = async {
            assert_eq!(helpers::read_command(&mut peer).await, "AT");
            tokio::time::sleep(Duration::from_millis(20)).await;
            session.close().await;
        };

        let (result, ()) = tokio::join!(pending, shutdown);
        assert!(matches!(result, Err(EngineError::Stopped)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!session.is_busy());
        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_published() {
        let (session, _peer) = helpers::scripted();
        let mut events = session.subscribe();
        session.stop().await.unwrap();

        let events = helpers::drain(&mut events);
        assert!(matches!(events.last(), Some(SessionEvent::Stopped)));
    }

    #[tokio::test]
    async fn closed_link_is_reported() {
        let (session, peer) = helpers::scripted();
        let mut events = session.subscribe();
        drop(peer);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(helpers::drain(&mut events)
            .iter()
            .any(|e| matches!(e, SessionEvent::Error { .. })));

        // Nothing can answer any more
        let result = session
            .transact_bytes(b"AT\r\n", Expect::final_result(), Duration::from_millis(50))
            .await;
        assert!(result.is_err());
        assert!(!session.is_busy());
    }
}

//! Bridge loop
//!
//! The one task per session that owns the transport. It is the only writer
//! to the modem and the only producer into the correlator and flag bus;
//! callers talk to it through a command channel.
//!
//! # Cycle
//!
//! ```text
//! Idle -> Reading -> Dispatching -> Idle ...      (Stopped on teardown)
//! ```
//!
//! Reads use a short timeout so a stop request is noticed promptly even on a
//! silent line. Every received line is routed in arrival order:
//!
//! 1. offered to the correlator when a transaction is outstanding
//! 2. otherwise (or when the correlator declines it) dispatched through the
//!    registry, which raises the event's bits and publishes it
//!
//! Errors on a single read or line are logged and published, never fatal.
//! Writes carry the caller's deadline, so a stalled transport cannot keep the
//! loop from serving stop requests.

use std::io::{self, ErrorKind};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use at_protocol::{EventBits, Line, LineCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::correlator::{Correlator, Offer};
use crate::events::SessionEvent;
use crate::features::GroupRegistrations;
use crate::flags::FlagBus;
use crate::registry::EventRegistry;
use crate::read_lock;

/// Observable state of the bridge loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Between cycles, or the link has closed
    Idle,
    /// Waiting for bytes from the transport
    Reading,
    /// Routing received lines
    Dispatching,
    /// Terminated
    Stopped,
}

/// Requests handled by the bridge loop
#[derive(Debug)]
pub enum BridgeCommand {
    /// Write bytes to the modem
    Write {
        /// Bytes to write
        data: Vec<u8>,
        /// Give up on the write at this point
        deadline: Instant,
        /// Completion of the write
        reply: oneshot::Sender<io::Result<()>>,
    },
    /// Stop the loop and hand back the transport
    Stop,
}

/// State shared between the bridge loop and session handles
#[derive(Debug)]
pub(crate) struct Shared {
    pub registry: RwLock<EventRegistry>,
    pub flags: FlagBus,
    pub correlator: Correlator,
    pub events: broadcast::Sender<SessionEvent>,
    pub state: watch::Sender<BridgeState>,
    pub groups: Mutex<GroupRegistrations>,
}

impl Shared {
    pub fn new(config: &SessionConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (state, _) = watch::channel(BridgeState::Idle);
        Self {
            registry: RwLock::new(EventRegistry::new()),
            flags: FlagBus::new(),
            correlator: Correlator::new(config.echo_filter),
            events,
            state,
            groups: Mutex::default(),
        }
    }

    pub fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// The bridge loop task state
pub(crate) struct BridgeLoop<T> {
    io: T,
    shared: Arc<Shared>,
    codec: LineCodec,
    buffer: Vec<u8>,
    poll_interval: Duration,
    link_open: bool,
}

impl<T> BridgeLoop<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: T, shared: Arc<Shared>, config: &SessionConfig) -> Self {
        Self {
            io,
            shared,
            codec: LineCodec::with_max_line_len(config.max_line_len),
            buffer: vec![0u8; config.read_buffer_size.max(1)],
            poll_interval: config.poll_interval(),
            link_open: true,
        }
    }

    fn enter(&self, state: BridgeState) {
        self.shared.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Run until a stop request (or the command channel closes)
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<BridgeCommand>) -> T {
        info!("Starting bridge loop");

        loop {
            if self.link_open {
                self.enter(BridgeState::Reading);
            }

            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(BridgeCommand::Write { data, deadline, reply }) => {
                            let result = tokio::time::timeout_at(deadline, self.write(&data))
                                .await
                                .unwrap_or_else(|_| {
                                    Err(io::Error::new(ErrorKind::TimedOut, "write timed out"))
                                });
                            if let Err(e) = &result {
                                warn!("Write error: {}", e);
                            }
                            let _ = reply.send(result);
                        }
                        Some(BridgeCommand::Stop) | None => {
                            info!("Stop requested for bridge loop");
                            break;
                        }
                    }
                }

                result = tokio::time::timeout(
                    self.poll_interval,
                    self.io.read(&mut self.buffer)
                ), if self.link_open => {
                    match result {
                        Ok(Ok(0)) => {
                            warn!("Modem link closed");
                            self.link_open = false;
                            self.enter(BridgeState::Idle);
                            self.shared.publish(SessionEvent::Error {
                                source: "bridge".to_string(),
                                message: "link closed by peer".to_string(),
                            });
                        }
                        Ok(Ok(n)) => {
                            let data = self.buffer[..n].to_vec();
                            self.handle_data(&data);
                        }
                        Ok(Err(e)) => {
                            // Serial drivers report an idle line this way
                            if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) {
                                continue;
                            }
                            warn!("Read error: {}", e);
                            self.shared.publish(SessionEvent::Error {
                                source: "bridge".to_string(),
                                message: format!("Read error: {}", e),
                            });
                            tokio::time::sleep(self.poll_interval).await;
                        }
                        Err(_) => {} // Poll timeout, continue
                    }
                }
            }
        }

        // Anyone still waiting on a reply gets Stopped instead of a timeout
        self.shared.correlator.cancel();
        self.enter(BridgeState::Stopped);
        self.shared.publish(SessionEvent::Stopped);
        info!("Bridge loop ended");
        self.io
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.io.write_all(data).await?;
        self.io.flush().await?;
        debug!("Wrote {} bytes: {:02X?}", data.len(), data);
        self.shared.publish(SessionEvent::DataOut {
            data: data.to_vec(),
        });
        Ok(())
    }

    fn handle_data(&mut self, data: &[u8]) {
        self.enter(BridgeState::Dispatching);
        debug!("Read {} bytes: {:?}", data.len(), String::from_utf8_lossy(data));
        self.shared.publish(SessionEvent::DataIn {
            data: data.to_vec(),
        });

        self.codec.push_bytes(data);
        while let Some(line) = self.codec.next_line() {
            route_line(&self.shared, &line);
        }
        self.enter(BridgeState::Idle);
    }
}

/// Route one line to the correlator or the registry
pub(crate) fn route_line(shared: &Shared, line: &Line) {
    let registered = read_lock(&shared.registry).contains(line.name());

    match shared.correlator.offer(line, registered) {
        Offer::Idle | Offer::Declined | Offer::BeforeEcho => dispatch_line(shared, line),
        Offer::Resolved { command, terminal } => {
            let bit = if terminal.is_ok() {
                EventBits::TRANSACTION_OK
            } else {
                EventBits::TRANSACTION_ERROR
            };
            shared.flags.set(bit);
            debug!("Transaction {:?} ended with {:?}", command, terminal);
            shared.publish(SessionEvent::TransactionCompleted { command, terminal });
        }
        Offer::Echo | Offer::Accumulated => trace!("Reply line {:?}", line.raw()),
    }
}

fn dispatch_line(shared: &Shared, line: &Line) {
    let result = read_lock(&shared.registry).dispatch(line.name(), line.args());

    match result {
        None => debug!("Unrecognized notification {:?}", line.raw()),
        Some(Err(e)) => {
            warn!("Malformed notification {:?}: {}", line.raw(), e);
            shared.publish(SessionEvent::Error {
                source: line.name().to_string(),
                message: e.to_string(),
            });
        }
        Some(Ok(kind)) => {
            shared.flags.set(kind.bits());
            debug!("Dispatched {:?} as {:?}", line.name(), kind);
            shared.publish(SessionEvent::Notification {
                name: line.name().to_string(),
                args: line.args().to_vec(),
                kind,
            });
        }
    }
}

//! Session lifecycle and the transaction / wait API
//!
//! A [`Session`] is created once per modem. [`Session::start`] spawns the
//! bridge loop over any async byte stream; [`Session::stop`] asks it to
//! finish, waits for the task to end and returns the transport, so the
//! transport is never released while the loop might still read from it.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use at_protocol::misc::BasicCommand;
use at_protocol::urc::{self, Decoder};
use at_protocol::{EncodeCommand, EventBits, EventKind, ParseError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_serial::SerialStream;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeCommand, BridgeLoop, BridgeState, Shared};
use crate::config::{SerialSettings, SessionConfig};
use crate::correlator::{Expect, Reply};
use crate::error::{EngineError, Result};
use crate::events::SessionEvent;
use crate::registry::{NotificationHandler, RegistrationId};
use crate::write_lock;

/// Handle to one running modem session
pub struct Session<T> {
    pub(crate) shared: Arc<Shared>,
    cmd_tx: mpsc::Sender<BridgeCommand>,
    task: JoinHandle<T>,
    config: SessionConfig,
}

impl Session<SerialStream> {
    /// Open a serial port and start a session on it
    pub fn open(serial: &SerialSettings, config: SessionConfig) -> Result<Self> {
        let stream = serial.open()?;
        info!("Opened {} at {} baud", serial.port, serial.baud_rate);
        Ok(Self::start(stream, config))
    }
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Start a session over any async byte stream
    ///
    /// For tests and simulation, use `DuplexStream` from `tokio::io::duplex()`.
    pub fn start(io: T, config: SessionConfig) -> Self {
        let shared = Arc::new(Shared::new(&config));
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_queue.max(1));
        let bridge = BridgeLoop::new(io, shared.clone(), &config);
        let task = tokio::spawn(bridge.run(cmd_rx));

        Self {
            shared,
            cmd_tx,
            task,
            config,
        }
    }
}

impl<T> Session<T> {
    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------------

    /// Send a command and wait for a reply ending in a final result code
    pub async fn transact(&self, command: &impl EncodeCommand, timeout: Duration) -> Result<Reply> {
        self.transact_bytes(&command.encode(), Expect::final_result(), timeout)
            .await
    }

    /// Send a command and wait for a reply of the given shape
    pub async fn transact_with(
        &self,
        command: &impl EncodeCommand,
        expect: Expect,
        timeout: Duration,
    ) -> Result<Reply> {
        self.transact_bytes(&command.encode(), expect, timeout).await
    }

    /// Send raw command bytes and wait for the reply
    ///
    /// Fails with [`EngineError::Busy`] if another transaction is outstanding,
    /// [`EngineError::TimedOut`] if no terminal line arrives in time (the slot
    /// is freed), and [`EngineError::Rejected`] if the modem answers with an
    /// error. The timeout covers the write as well: a transport that does not
    /// take the bytes in time fails with [`EngineError::Transport`].
    pub async fn transact_bytes(
        &self,
        command: &[u8],
        expect: Expect,
        timeout: Duration,
    ) -> Result<Reply> {
        let deadline = Instant::now() + timeout;
        let ticket = self.shared.correlator.begin(command, expect)?;
        self.shared
            .flags
            .clear(EventBits::TRANSACTION_OK | EventBits::TRANSACTION_ERROR);
        debug!("Transaction {:?} started", ticket.command());

        // Dropping the ticket on a failed write frees the slot
        self.write(command.to_vec(), deadline).await?;
        match ticket
            .await_reply(deadline.saturating_duration_since(Instant::now()))
            .await
        {
            Ok(reply) => reply.into_result(),
            Err(e) if e.is_timeout() => Err(EngineError::timed_out(timeout)),
            Err(e) => Err(e),
        }
    }

    /// Write bytes without opening a transaction
    ///
    /// Bounded by the configured command timeout.
    pub async fn send_raw(&self, data: &[u8]) -> Result<()> {
        self.write(data.to_vec(), Instant::now() + self.config.command_timeout())
            .await
    }

    async fn write(&self, data: Vec<u8>, deadline: Instant) -> Result<()> {
        let request = async {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.cmd_tx
                .send(BridgeCommand::Write {
                    data,
                    deadline,
                    reply: reply_tx,
                })
                .await
                .map_err(|_| EngineError::Stopped)?;
            reply_rx.await.map_err(|_| EngineError::Stopped)??;
            Ok::<(), EngineError>(())
        };

        // Covers a full command queue as well as a stalled transport
        tokio::time::timeout_at(deadline, request)
            .await
            .unwrap_or_else(|_| {
                warn!("Write not completed before its deadline");
                Err(EngineError::Transport(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "write timed out",
                )))
            })
    }

    // -------------------------------------------------------------------------
    // Notification handlers
    // -------------------------------------------------------------------------

    /// Register a handler for a notification name
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: impl NotificationHandler + 'static,
    ) -> RegistrationId {
        write_lock(&self.shared.registry).register(name, handler)
    }

    /// Register a handler that raises `bits` and reports the raw arguments
    pub fn register_custom(&self, name: impl Into<String>, bits: EventBits) -> RegistrationId {
        let name = name.into();
        let event_name = name.clone();
        self.register(name, move |args: &[String]| -> std::result::Result<EventKind, ParseError> {
            Ok(EventKind::Custom {
                name: event_name.clone(),
                args: args.to_vec(),
                bits,
            })
        })
    }

    /// Register a list of built-in decoders
    pub fn register_decoders(&self, decoders: &[(&str, Decoder)]) -> Vec<RegistrationId> {
        let mut registry = write_lock(&self.shared.registry);
        decoders
            .iter()
            .map(|(name, decoder)| registry.register(*name, *decoder))
            .collect()
    }

    /// Remove a registration
    pub fn unregister(&self, id: RegistrationId) -> bool {
        write_lock(&self.shared.registry).unregister(id)
    }

    /// Remove the registration currently answering for `name`
    pub fn unregister_name(&self, name: &str) -> bool {
        write_lock(&self.shared.registry).unregister_name(name)
    }

    // -------------------------------------------------------------------------
    // Event bits and subscriptions
    // -------------------------------------------------------------------------

    /// Wait until every bit in `mask` is raised, then consume them
    pub async fn wait(&self, mask: EventBits, timeout: Duration) -> Result<EventBits> {
        self.shared.flags.wait(mask, timeout).await
    }

    /// Currently raised bits
    pub fn flags(&self) -> EventBits {
        self.shared.flags.snapshot()
    }

    /// Clear bits without waiting
    pub fn clear_flags(&self, bits: EventBits) {
        self.shared.flags.clear(bits);
    }

    /// Subscribe to the session event stream
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Watch the bridge loop state
    pub fn bridge_state(&self) -> watch::Receiver<BridgeState> {
        self.shared.state.subscribe()
    }

    /// Whether a transaction is outstanding
    pub fn is_busy(&self) -> bool {
        self.shared.correlator.is_pending()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Wait for the module boot sequence
    ///
    /// Registers the boot notifications, probes the link with `AT` and waits
    /// until ready, full functionality, SIM ready, call ready and SMS ready
    /// have all been reported, in any order. The boot handlers are removed
    /// again whatever the outcome.
    pub async fn bring_up(&self, timeout: Duration) -> Result<()> {
        info!("Waiting up to {:?} for module boot", timeout);
        let ids = self.register_decoders(&urc::BOOT_NOTIFICATIONS);

        // The answer does not matter, a booting module may not reply yet
        if let Err(e) = self
            .transact(&BasicCommand::Attention, self.config.command_timeout())
            .await
        {
            debug!("Boot probe failed: {}", e);
        }

        let result = self.wait(EventBits::BOOT, timeout).await;
        for id in ids {
            self.unregister(id);
        }

        match result {
            Ok(_) => {
                info!("Module ready");
                Ok(())
            }
            Err(e) => {
                warn!("Module did not finish booting: {}", e);
                Err(e)
            }
        }
    }

    /// Ask the bridge loop to stop without waiting for it
    ///
    /// Usable while transactions are outstanding; their callers get
    /// [`EngineError::Stopped`]. [`Session::stop`] still has to be called to
    /// get the transport back.
    pub async fn close(&self) {
        if self.cmd_tx.send(BridgeCommand::Stop).await.is_err() {
            debug!("Bridge loop already gone");
        }
    }

    /// Stop the bridge loop and return the transport
    pub async fn stop(self) -> Result<T> {
        info!("Stopping session");
        // The loop may already be gone if the channel closed
        let _ = self.cmd_tx.send(BridgeCommand::Stop).await;
        self.task
            .await
            .map_err(|e| EngineError::BridgeFailed(e.to_string()))
    }
}

impl<T> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &*self.shared.state.borrow())
            .field("flags", &self.shared.flags.snapshot())
            .field("busy", &self.shared.correlator.is_pending())
            .finish()
    }
}

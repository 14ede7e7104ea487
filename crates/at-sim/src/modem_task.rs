//! Virtual modem actor task
//!
//! Serves a [`VirtualModem`] over an async byte stream. The task uses a
//! select! loop to:
//! - read bytes from the host and feed them to the modem
//! - apply scripted events (boot, incoming call, new SMS) from a channel
//! - write whatever output the modem produced, split into chunks when the
//!   modem is configured with a chunk size

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::VirtualModem;

/// Pause between chunks so the host sees them as separate reads
const CHUNK_GAP: Duration = Duration::from_millis(2);

/// Commands that can be sent to a virtual modem actor
#[derive(Debug, Clone)]
pub enum VirtualModemCommand {
    /// Emit the power-on notification sequence
    Boot,
    /// Signal an incoming call
    Ring {
        /// Caller number reported in `+CLIP`
        number: String,
    },
    /// The remote party hangs up
    HangUpRemote,
    /// Store a new message and announce it with `+CMTI`
    ReceiveSms {
        /// Sender number
        sender: String,
        /// Message text
        text: String,
    },
    /// Send an arbitrary line
    Inject(String),
    /// Stop answering commands
    SetSilent(bool),
    /// Shutdown the virtual modem actor
    Shutdown,
}

/// Run the virtual modem actor task
///
/// Returns the modem when the stream closes or a shutdown is requested, so
/// callers can inspect its final state.
pub async fn run_virtual_modem_task<S>(
    mut stream: S,
    mut modem: VirtualModem,
    mut cmd_rx: mpsc::Receiver<VirtualModemCommand>,
) -> io::Result<VirtualModem>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1024];
    info!("Starting virtual modem task for {}", modem.id());

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual modem stream closed for {}", modem.id());
                        break;
                    }
                    Ok(n) => {
                        debug!(
                            "Virtual modem {} received {} bytes: {:?}",
                            modem.id(), n, String::from_utf8_lossy(&buf[..n])
                        );
                        modem.feed(&buf[..n]);
                    }
                    Err(e) => {
                        warn!("Virtual modem {} stream error: {}", modem.id(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualModemCommand::Boot) => modem.boot(),
                    Some(VirtualModemCommand::Ring { number }) => modem.ring(&number),
                    Some(VirtualModemCommand::HangUpRemote) => modem.hang_up_remote(),
                    Some(VirtualModemCommand::ReceiveSms { sender, text }) => {
                        modem.receive_sms(&sender, &text);
                    }
                    Some(VirtualModemCommand::Inject(line)) => modem.inject(&line),
                    Some(VirtualModemCommand::SetSilent(silent)) => modem.set_silent(silent),
                    Some(VirtualModemCommand::Shutdown) => {
                        info!("Shutdown requested for virtual modem {}", modem.id());
                        break;
                    }
                    None => {
                        debug!("Command channel closed for virtual modem {}", modem.id());
                        break;
                    }
                }
            }
        }

        flush_output(&mut stream, &mut modem).await?;
    }

    info!("Virtual modem task ended for {}", modem.id());
    Ok(modem)
}

async fn flush_output<S>(stream: &mut S, modem: &mut VirtualModem) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let chunk_size = modem.chunk_size();
    while let Some(output) = modem.take_output() {
        match chunk_size {
            Some(size) => {
                for chunk in output.chunks(size) {
                    stream.write_all(chunk).await?;
                    stream.flush().await?;
                    tokio::time::sleep(CHUNK_GAP).await;
                }
            }
            None => {
                stream.write_all(&output).await?;
                stream.flush().await?;
            }
        }
    }
    Ok(())
}

/// Spawn a virtual modem on one end of an in-memory duplex pipe
///
/// Returns the host end of the pipe, the command sender and the task handle.
pub fn spawn_virtual_modem(
    modem: VirtualModem,
) -> (
    DuplexStream,
    mpsc::Sender<VirtualModemCommand>,
    JoinHandle<io::Result<VirtualModem>>,
) {
    let (host, device) = tokio::io::duplex(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let handle = tokio::spawn(run_virtual_modem_task(device, modem, cmd_rx));
    (host, cmd_tx, handle)
}

//! AT Modem Monitor
//!
//! Command line tool for SIM800-style modems: waits for the module to boot,
//! prints every notification and transaction, and runs single operations
//! (raw AT commands, calls, SMS, HTTP). `--simulate` runs everything against
//! the virtual modem instead of a serial port.

mod output;
mod ports;
mod settings;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use at_engine::{Expect, SerialSettings, Session, SessionEvent};
use at_protocol::bearer::BearerParam;
use at_protocol::sms::SmsFormat;
use at_sim::{spawn_virtual_modem, VirtualModem, VirtualModemCommand};
use clap::{Parser, Subcommand};
use settings::Settings;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Delay before the simulated module starts its boot sequence
const SIM_BOOT_DELAY: Duration = Duration::from_millis(200);

/// AT modem monitor
#[derive(Parser)]
#[command(name = "at-monitor", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3). Defaults to the saved port.
    #[arg(long)]
    port: Option<String>,

    /// Baud rate. Defaults to the saved rate.
    #[arg(long)]
    baud: Option<u32>,

    /// Talk to the built-in virtual modem instead of a serial port.
    #[arg(long)]
    simulate: bool,

    /// Print events as JSON lines.
    #[arg(long)]
    json: bool,

    /// Also print raw traffic.
    #[arg(long)]
    traffic: bool,

    /// Do not wait for the boot notifications first.
    #[arg(long)]
    no_boot: bool,

    /// Save port and baud rate as the new defaults.
    #[arg(long)]
    save: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports.
    Ports,

    /// Print events until interrupted (the default).
    Watch,

    /// Send one AT command and print the reply.
    At {
        /// Command text without terminator, e.g. "AT+CSQ".
        command: String,

        /// Reply deadline in milliseconds.
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
    },

    /// Dial a number and hang up on Ctrl-C.
    Dial {
        /// Number to call.
        number: String,
    },

    /// Send a text message.
    Sms {
        /// Recipient number.
        number: String,
        /// Message text.
        text: String,
    },

    /// Fetch a URL over GPRS.
    HttpGet {
        /// URL to fetch.
        url: String,

        /// Access point name. Defaults to the saved APN.
        #[arg(long)]
        apn: Option<String>,

        /// Request deadline in seconds.
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "at_monitor=info,at_protocol=info,at_engine=info,at_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load();
    if let Some(port) = &cli.port {
        settings.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        settings.baud_rate = baud;
    }
    settings.show_traffic |= cli.traffic;
    settings.wait_for_boot &= !cli.no_boot;

    if cli.save {
        let path = settings.save()?;
        info!("Saved settings to {}", path.display());
    }

    let command = cli.command.unwrap_or(Command::Watch);
    if let Command::Ports = command {
        for port in ports::list_ports() {
            println!("{}", port.display_label());
        }
        return Ok(());
    }

    if cli.simulate {
        run_simulated(&settings, command, cli.json).await
    } else {
        run_serial(&settings, command, cli.json).await
    }
}

async fn run_serial(settings: &Settings, command: Command, json: bool) -> Result<()> {
    if settings.port.is_empty() {
        bail!("no serial port given, use --port or --simulate");
    }
    let serial = SerialSettings {
        baud_rate: settings.baud_rate,
        ..SerialSettings::new(settings.port.clone())
    };
    let session = Session::open(&serial, settings.session.clone())
        .with_context(|| format!("failed to open {}", serial.port))?;

    let printer = tokio::spawn(print_events(session.subscribe(), json, settings.show_traffic));
    let result = run(&session, settings, command).await;

    session.stop().await?;
    let _ = printer.await;
    result
}

async fn run_simulated(settings: &Settings, command: Command, json: bool) -> Result<()> {
    let modem = VirtualModem::from_config(settings.simulator.clone());
    info!("Simulating {}", modem.id());
    let (host, sim_tx, sim_task) = spawn_virtual_modem(modem);
    let session = Session::start(host, settings.session.clone());

    let printer = tokio::spawn(print_events(session.subscribe(), json, settings.show_traffic));
    let power_on = async {
        tokio::time::sleep(SIM_BOOT_DELAY).await;
        if sim_tx.send(VirtualModemCommand::Boot).await.is_err() {
            warn!("Virtual modem is gone before boot");
        }
    };
    let (result, ()) = tokio::join!(run(&session, settings, command), power_on);

    // Closing the stream ends the virtual modem
    drop(session.stop().await?);
    drop(sim_tx);
    let _ = sim_task.await;
    let _ = printer.await;
    result
}

async fn run<T>(session: &Session<T>, settings: &Settings, command: Command) -> Result<()> {
    if settings.wait_for_boot {
        session
            .bring_up(session.config().boot_timeout())
            .await
            .context("modem did not finish booting")?;
    }

    match command {
        Command::Ports | Command::Watch => {
            session.enable_call_events();
            session.enable_sms_events();
            info!("Watching, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
        Command::At {
            command,
            timeout_ms,
        } => {
            let mut bytes = command.into_bytes();
            bytes.extend_from_slice(at_protocol::TERMINATOR);
            let reply = session
                .transact_bytes(&bytes, Expect::final_result(), Duration::from_millis(timeout_ms))
                .await?;
            println!("{}", reply.text());
        }
        Command::Dial { number } => {
            session.enable_call_events();
            session.dial(&number).await?;
            println!("Calling {}, press Ctrl-C to hang up", number);
            tokio::signal::ctrl_c().await?;
            session.hang_up().await?;
        }
        Command::Sms { number, text } => {
            session.set_sms_format(SmsFormat::Text).await?;
            let reference = session.send_sms(&number, &text).await?;
            println!("Sent to {}, reference {}", number, reference);
        }
        Command::HttpGet {
            url,
            apn,
            timeout_secs,
        } => {
            let apn = apn.unwrap_or_else(|| settings.apn.clone());
            session
                .set_bearer_param(BearerParam::ConnectionType, "GPRS")
                .await?;
            if !apn.is_empty() {
                session.set_bearer_param(BearerParam::Apn, &apn).await?;
            }
            session.open_bearer().await.context("failed to open bearer")?;
            session.http_init().await?;

            let result = session
                .http_get(&url, Duration::from_secs(timeout_secs))
                .await;

            // Release the HTTP service and bearer even when the request failed
            if let Err(e) = session.http_terminate().await {
                warn!("HTTP terminate failed: {}", e);
            }
            if let Err(e) = session.close_bearer().await {
                warn!("Bearer close failed: {}", e);
            }

            let (status, body) = result?;
            println!("HTTP {}", status);
            println!("{}", body);
        }
    }
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>, json: bool, traffic: bool) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if event.is_traffic() && !traffic {
                    continue;
                }
                if json {
                    println!("{}", output::to_json(&event));
                } else {
                    println!("{}", output::render(&event));
                }
                if matches!(event, SessionEvent::Stopped) {
                    break;
                }
            }
            Err(RecvError::Lagged(n)) => warn!("Event printer lagged by {} events", n),
            Err(RecvError::Closed) => break,
        }
    }
}

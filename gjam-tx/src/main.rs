//! GNSS Jammer Transmitter (gjam-tx) - Main entry point
//!
//! Replays a jammer waveform from the storage root through the software radio
//! and takes operator commands on stdin. Logs go to stderr so stdout can carry
//! IQ data (`--output -`).

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gjam_common::config::{find_config_file, resolve_root_folder, ROOT_FOLDER_ENV};
use gjam_common::events::{EventBus, GjamEvent};
use gjam_tx::config::{GnssBand, JammerType, TxGain, TxSettings};
use gjam_tx::radio::{open_sink, PacedRadio, Radio};
use gjam_tx::replay::{spawn_underrun_monitor, FileOpener, SampleProcessor};
use gjam_tx::session::{
    run_session, ConsoleCommand, SessionCommand, SessionDeps, SessionHandle, TransmitSession,
};
use gjam_tx::storage::DirectoryStorage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for gjam-tx
#[derive(Parser, Debug)]
#[command(name = "gjam-tx")]
#[command(about = "GNSS jammer IQ replay transmitter")]
#[command(version)]
struct Args {
    /// Storage root containing GNSS_JAMMER/BIN_FILES (overrides GJAM_ROOT_FOLDER and config)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML settings file
    #[arg(short, long, env = "GJAM_CONFIG")]
    config: Option<PathBuf>,

    /// IQ output: '-' for stdout, 'null' to discard, or a file/FIFO path
    #[arg(short, long, default_value = "null")]
    output: String,

    /// GNSS band (L1, L2, L5)
    #[arg(short, long)]
    band: Option<GnssBand>,

    /// Jammer type (LWF, LN, TRI, TW, TICK)
    #[arg(short, long)]
    jammer: Option<JammerType>,

    /// TX gain in dB (0-47)
    #[arg(short, long)]
    gain: Option<TxGain>,

    /// Stop at end of file instead of looping
    #[arg(long)]
    no_loop: bool,

    /// Start transmitting immediately
    #[arg(long)]
    autostart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gjam_tx=info,gjam_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    info!(
        "Starting gjam-tx v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut settings =
        TxSettings::load(args.config.as_deref()).context("Failed to load transmit settings")?;
    if let Some(band) = args.band {
        settings.band = band;
    }
    if let Some(jammer) = args.jammer {
        settings.jammer = jammer;
    }
    if let Some(gain) = args.gain {
        settings.gain = gain;
    }
    if args.no_loop {
        settings.loop_on_completion = false;
    }

    let config_file = args.config.clone().or_else(|| find_config_file().ok());
    let root = resolve_root_folder(
        args.root_folder.as_deref(),
        ROOT_FOLDER_ENV,
        config_file.as_deref(),
    );
    info!("Storage root: {}", root.display());

    // Software radio owns the tick handler
    let (processor, processor_handle) = SampleProcessor::new(SampleProcessor::low_water_for(
        settings.chunk_size,
        settings.tick_bytes(),
    ));
    let sink = open_sink(&args.output).context("Failed to open IQ output")?;
    let radio = Arc::new(
        PacedRadio::spawn(processor, sink, settings.tick_bytes(), settings.tick_period())
            .context("Failed to start software radio")?,
    );

    let events = EventBus::new(100);
    let event_log = tokio::spawn(log_events(events.subscribe()));
    let monitor_shutdown = spawn_underrun_monitor(
        processor_handle.shared_stats(),
        events.clone(),
        Duration::from_millis(settings.monitor_interval_ms),
        tokio::runtime::Handle::current(),
    );

    let deps = SessionDeps {
        radio: Arc::clone(&radio) as Arc<dyn Radio>,
        storage: Arc::new(DirectoryStorage::new(root)),
        opener: Arc::new(FileOpener),
        processor: processor_handle,
        events,
    };
    let (session, notices) = TransmitSession::new(settings, deps);
    let (handle, task) = run_session(session, notices);

    if args.autostart {
        handle.send(SessionCommand::Start).await?;
    }

    eprintln!("{}", ConsoleCommand::usage());
    run_console(&handle).await?;

    handle.shutdown().await.ok();
    let session = task.await.context("Session task failed")?;
    info!("Session {} stopped", session.id());

    monitor_shutdown.store(true, Ordering::Relaxed);
    radio.shutdown();
    event_log.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Read commands from stdin until quit, end of input plus a signal, or a signal
async fn run_console(handle: &SessionHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<ConsoleCommand>() {
                        Ok(ConsoleCommand::Quit) => break,
                        Ok(command) => dispatch(handle, command).await?,
                        Err(e) => eprintln!("{}\n{}", e, ConsoleCommand::usage()),
                    }
                }
                Ok(None) => {
                    info!("Console input closed; Ctrl+C to exit");
                    (&mut shutdown).await;
                    break;
                }
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    break;
                }
            },
        }
    }

    Ok(())
}

async fn dispatch(handle: &SessionHandle, command: ConsoleCommand) -> gjam_tx::Result<()> {
    let session_command = match command {
        ConsoleCommand::Start => SessionCommand::Start,
        ConsoleCommand::Stop => SessionCommand::Stop,
        ConsoleCommand::Toggle => SessionCommand::Toggle,
        ConsoleCommand::Gain { gain } => SessionCommand::SetGain(gain),
        ConsoleCommand::Band { band } => SessionCommand::SelectBand(band),
        ConsoleCommand::Jammer { jammer } => SessionCommand::SelectJammer(jammer),
        ConsoleCommand::Loop { enabled } => SessionCommand::SetLoop(enabled),
        ConsoleCommand::Status => {
            let snapshot = handle.status().await?;
            eprintln!("{}", snapshot);
            return Ok(());
        }
        ConsoleCommand::Help => {
            eprintln!("{}", ConsoleCommand::usage());
            return Ok(());
        }
        ConsoleCommand::Quit => SessionCommand::Shutdown,
    };
    handle.send(session_command).await
}

/// Mirror bus events into the debug log as JSON
async fn log_events(mut rx: broadcast::Receiver<GjamEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => debug!("event: {}", json),
                Err(e) => warn!("Failed to serialize event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Event log lagged, skipped {} events", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

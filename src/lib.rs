mod utils;

pub mod alerts;
pub mod channels;
pub mod error;
pub mod history;
pub mod monitor;
pub mod posture;
pub mod settings;
pub mod store;
pub mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tokio::sync::{broadcast, Mutex};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use alerts::ProcessLauncher;
use history::HistoryLog;
use monitor::{run_render_loop, run_tick_loop, MonitorConfig, MonitorEvent, PostureMonitor};
use posture::{PostureStatus, DEFAULT_GOOD_THRESHOLD};
use settings::{parse_server, SettingsStore, UserSettings};

pub use error::{MonitorError, MonitorResult};

const SETTINGS_FILE: &str = "app_settings.json";
const HISTORY_FILE: &str = "posture_stats.json";
const INSTANCE_PORT: u16 = 12345;

#[derive(Debug, Parser)]
#[command(name = "posture-monitor", about = "Seat-pressure posture monitor", version)]
pub struct Cli {
    /// Device host; defaults to the last server used.
    #[arg(long)]
    pub host: Option<String>,

    /// Device port; defaults to the last port used.
    #[arg(long)]
    pub port: Option<u16>,

    /// Device as `host:port`, e.g. one of the saved servers.
    #[arg(long, conflicts_with_all = ["host", "port"])]
    pub server: Option<String>,

    /// Where settings and history live.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Foreground tick period in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub tick_ms: u64,

    /// Summed pressure at or above which posture counts as good.
    #[arg(long, default_value_t = DEFAULT_GOOD_THRESHOLD)]
    pub threshold: f64,

    /// Do not launch the periodic reminder program.
    #[arg(long)]
    pub no_reminder: bool,

    /// Persist the start-on-login preference.
    #[arg(long)]
    pub autostart: Option<bool>,

    /// Local port held to keep a second monitor from starting.
    #[arg(long, default_value_t = INSTANCE_PORT)]
    pub instance_port: u16,

    /// Write the history log as CSV to this path and exit.
    #[arg(long)]
    pub export_csv: Option<PathBuf>,
}

fn data_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => dirs::data_dir()
            .map(|dir| dir.join("posture-monitor"))
            .ok_or_else(|| anyhow!("no data directory on this platform; pass --data-dir")),
    }
}

/// Pick the device from `--server`, `--host`/`--port`, or the last server used.
fn resolve_server(cli: &Cli, saved: &UserSettings) -> Result<(String, u16)> {
    if let Some(entry) = &cli.server {
        return parse_server(entry).ok_or_else(|| anyhow!("--server expects host:port, got {entry:?}"));
    }
    let host = cli.host.clone().unwrap_or_else(|| saved.host.clone());
    if host.is_empty() {
        bail!("no device host given and none saved; pass --host or --server");
    }
    Ok((host, cli.port.unwrap_or(saved.port)))
}

/// Binds a loopback port for as long as the returned listener lives.
fn claim_single_instance(port: u16) -> Result<std::net::TcpListener> {
    std::net::TcpListener::bind(("127.0.0.1", port)).with_context(|| {
        format!("another posture monitor is already running (port {port} is taken)")
    })
}

pub async fn run(cli: Cli) -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("posture monitor starting up...");

    let data_dir = data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let _instance = claim_single_instance(cli.instance_port)?;

    let settings = Arc::new(SettingsStore::new(data_dir.join(SETTINGS_FILE))?);
    if let Some(enabled) = cli.autostart {
        settings.set_autostart(enabled)?;
    }
    let history = HistoryLog::load_or_empty(data_dir.join(HISTORY_FILE));

    if let Some(target) = &cli.export_csv {
        let rows = history.export_csv(target)?;
        info!("exported {rows} rows to {}", target.display());
        return Ok(());
    }

    let (host, port) = resolve_server(&cli, &settings.snapshot())?;

    let config = MonitorConfig {
        good_threshold: cli.threshold,
        tick_interval: Duration::from_millis(cli.tick_ms.max(1)),
        reminder_enabled: !cli.no_reminder,
        ..Default::default()
    };

    let mut monitor = PostureMonitor::new(&config, settings, history, Arc::new(ProcessLauncher));
    let events = monitor.subscribe();
    let mut connection = monitor.watch_connection();
    let store = monitor.store();

    monitor
        .connect(&host, port)
        .await
        .with_context(|| format!("could not reach device at {host}:{port}"))?;

    let monitor = Arc::new(Mutex::new(monitor));
    let cancel_token = CancellationToken::new();

    let ticker = tokio::spawn(run_tick_loop(
        monitor.clone(),
        config.tick_interval,
        cancel_token.clone(),
    ));
    let renderer = tokio::spawn(run_render_loop(store, config.tick_interval, cancel_token.clone()));
    let status_line = tokio::spawn(log_status(events, cancel_token.clone()));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("interrupted, shutting down");
        }
        _ = connection.wait_for(|state| !state.is_connected()) => {
            // No automatic reconnect: the user restarts against the device.
            warn!("device connection ended; restart to reconnect");
        }
    }

    cancel_token.cancel();
    for task in [ticker, renderer, status_line] {
        if let Err(err) = task.await {
            warn!("background task ended abnormally: {err}");
        }
    }

    let mut monitor = monitor.lock().await;
    // Records decoded before the stream ended still get classified and logged.
    let flushed = monitor.shutdown().await?;
    if !flushed.classified.is_empty() {
        info!("recorded {} readings received before shutdown", flushed.classified.len());
    }
    Ok(())
}

/// Logs what a status bar and history table would show.
async fn log_status(mut events: broadcast::Receiver<MonitorEvent>, cancel_token: CancellationToken) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(MonitorEvent::Classified(event)) => match event.status {
                    PostureStatus::Good => info!("posture good (total pressure {})", event.pressure_label()),
                    PostureStatus::Bad => warn!("posture bad (total pressure {})", event.pressure_label()),
                },
                Ok(MonitorEvent::ConnectionStateChanged(state)) => info!("connection: {state:?}"),
                Ok(MonitorEvent::AlertFired(fired)) => info!("{:?} notifier started", fired.kind),
                Ok(MonitorEvent::Error(err)) if err.is_recoverable() => warn!("{err}"),
                Ok(MonitorEvent::Error(err)) => error!("{err}"),
                Ok(MonitorEvent::RecordReceived(_)) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("status log fell behind, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = cancel_token.cancelled() => break,
        }
    }
}

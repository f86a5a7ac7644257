//! wallpaper-hotkey-daemon: standalone global hotkey process
//!
//! Listens for the wallpaper manager hotkey and runs the configured
//! action each time it fires. Keeps running without the hotkey when no
//! X11 display is available.
//!
//! Signals:
//! - SIGINT / SIGTERM: stop the hook and exit
//! - SIGUSR1: log a health snapshot

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wallpaper_hotkey::lifecycle::{ProcessSignal, ShutdownSignal};
use wallpaper_hotkey::{detect_source, Config, DaemonState, HealthStatus, HotkeyDaemon};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    let _log_guard = init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "wallpaper-hotkey-daemon starting"
    );
    info!(hotkey = %config.hotkey, display = ?config.display, "configuration loaded");

    // Handlers go in before the hook so an early signal still cleans up
    let mut signals = ShutdownSignal::new().context("failed to install signal handlers")?;

    let daemon = Arc::new(HotkeyDaemon::new(detect_source(&config)));

    let action = config.action.clone();
    let mut dispatcher = daemon
        .register_hotkey(config.hotkey, move || on_hotkey(action.as_deref()))
        .context("failed to register hotkey")?;
    let deliveries = dispatcher.deliveries();

    match daemon.start().context("failed to start hotkey daemon")? {
        DaemonState::Running => info!(hotkey = %config.hotkey, "hotkey listener started"),
        state => warn!(%state, "continuing without hotkey support"),
    }

    let report = || {
        let health = HealthStatus::capture(&daemon, deliveries.load(Ordering::Relaxed));
        match serde_json::to_string(&health) {
            Ok(json) => info!(health = %json, "health status"),
            Err(e) => error!(?e, "failed to serialize health status"),
        }
    };
    report();

    info!("daemon initialized, entering main loop");

    // The main thread is the consumer: the hotkey callback only ever runs here
    loop {
        tokio::select! {
            _ = dispatcher.run() => {}

            signal = signals.recv() => match signal {
                ProcessSignal::ReportHealth => report(),
                ProcessSignal::Shutdown => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    let stopping = Arc::clone(&daemon);
    let state = tokio::task::spawn_blocking(move || stopping.stop())
        .await
        .context("hotkey shutdown task failed")?;
    info!(%state, "hotkey daemon stopped");
    report();

    info!("wallpaper-hotkey-daemon stopped");

    Ok(())
}

/// Console plus file logging; the returned guard flushes the file on drop
fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let file_error = match config.ensure_dirs() {
        Ok(()) => {
            let file_name = config
                .log_file
                .file_name()
                .map(|name| name.to_os_string())
                .unwrap_or_else(|| "hotkey-daemon.log".into());
            let file_appender = tracing_appender::rolling::never(&config.data_dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            return Some(guard);
        }
        Err(e) => e,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .init();
    warn!(error = %file_error, "file logging disabled");
    None
}

/// Hotkey callback; runs on the consumer thread and must not block
fn on_hotkey(action: Option<&[String]>) {
    let Some((program, args)) = action.and_then(|argv| argv.split_first()) else {
        info!("hotkey pressed");
        return;
    };

    match tokio::process::Command::new(program).args(args).spawn() {
        Ok(child) => info!(program = %program, pid = ?child.id(), "hotkey action launched"),
        Err(e) => error!(program = %program, error = %e, "failed to launch hotkey action"),
    }
}

//! Headless session host for stdin/stdout JSON communication.
//!
//! Runs the session controller, watches the backend state file, and speaks
//! the newline-delimited JSON host protocol on stdin/stdout.
//!
//! All tracing/diagnostic output goes to stderr and a daily log file so that
//! stdout remains a clean JSON protocol channel.

use anyhow::Context;
use ghostwire::bridge::{ProcessRunner, StateFileWatcher};
use ghostwire::config::GhostwireConfig;
use ghostwire::host::{HostRouter, run_stdio_bridge};
use ghostwire::session::{SessionServices, session_channel};
use ghostwire::{app_dirs, platform};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = app_dirs::logs_dir();
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&log_dir, "ghostwire-host.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    let config_path = GhostwireConfig::default_config_path();
    let config = GhostwireConfig::load_or_default(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    tracing::info!(config = %config_path.display(), "ghostwire-host starting");

    let services = SessionServices {
        backend: Arc::new(ProcessRunner::from_config(&config.runner)),
        driver: platform::create_input_driver(),
        surface: platform::create_surface(),
    };
    let state_file = config.state_file.clone();
    let (session, controller) = session_channel(config, services);
    let controller_handle = tokio::spawn(controller.run());

    let mut watcher = None;
    if state_file.enabled {
        let mut file_watcher = StateFileWatcher::new(state_file.resolved_path());
        let handle = session.clone();
        let started = file_watcher.start(move |update| {
            if let Err(e) = handle.post_backend_state(update) {
                tracing::warn!(error = %e, "backend state update dropped");
            }
        });
        match started {
            Ok(()) => watcher = Some(file_watcher),
            Err(e) => tracing::warn!(error = %e, "state file watcher unavailable"),
        }
    }

    let result = run_stdio_bridge(HostRouter::new(session)).await;

    if let Some(mut watcher) = watcher {
        watcher.stop();
    }
    let _ = controller_handle.await;

    result.map_err(|e| {
        tracing::error!(error = %e, "ghostwire-host exited with error");
        anyhow::anyhow!("ghostwire-host failed: {e}")
    })?;

    tracing::info!("ghostwire-host shut down cleanly");
    Ok(())
}

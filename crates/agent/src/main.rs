//! `carspeed-agent` -- vehicle speed telemetry daemon.
//!
//! Subscribes to `Vehicle.Speed` on the signal bus, smooths and
//! classifies every reading, raises driver alerts and appends each
//! processed reading to a rotating CSV log.
//!
//! # Environment variables
//!
//! | Variable          | Required | Default                        | Description                 |
//! |-------------------|----------|--------------------------------|-----------------------------|
//! | `CARSPEED_CONFIG` | no       | `/etc/carspeedboy/config.json` | JSON configuration file     |
//! | `AFB_URL`         | no       | from config                    | Signal bus WebSocket URL    |
//! | `AFB_TOKEN`       | no       | from config                    | Signal bus bearer token     |
//! | `RUST_LOG`        | no       | `logging.level` from config    | `tracing` filter directives |

use std::time::Duration;

use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carspeed_agent::{AppConfig, Pipeline};
use carspeed_events::{EventBus, PipelineEvent, PipelineEventKind};
use carspeed_vss::StreamClient;

/// Floor for the data freshness check interval.
const MIN_FRESHNESS_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = AppConfig::path_from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| AppConfig::log_filter_for(&config_path).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = AppConfig::load(&config_path);
    config.apply_env_overrides();

    tracing::info!(
        url = %config.afb.url,
        signal = %config.afb.signal_path,
        window_size = config.smoothing.window_size,
        log_dir = %config.logging.log_dir.display(),
        "Starting carspeed-agent",
    );

    let bus = EventBus::default();
    let reporter = tokio::spawn(report_events(bus.subscribe()));
    let mut pipeline = Pipeline::from_config(&config, bus);

    let stream_config = config.stream_config();
    let freshness_interval = stream_config.data_timeout.max(MIN_FRESHNESS_INTERVAL);
    let (mut client, events) = StreamClient::new(stream_config);

    if let Err(e) = client.initialize(&config.afb.url, &config.afb.token) {
        tracing::error!(error = %e, "Cannot start signal bus client");
        std::process::exit(1);
    }

    let mut pipeline_task = tokio::spawn(async move { pipeline.run(events).await });
    let mut freshness = tokio::time::interval(freshness_interval);
    let mut data_valid = false;
    let mut terminal_error = None;
    let mut pipeline_done = false;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            result = &mut pipeline_task => {
                pipeline_done = true;
                match result {
                    Ok(error) => terminal_error = error,
                    Err(e) => tracing::error!(error = %e, "Pipeline task failed"),
                }
                break;
            }
            _ = freshness.tick() => {
                let valid = client.is_data_valid();
                if valid != data_valid {
                    if valid {
                        tracing::info!("Speed data is fresh");
                    } else {
                        tracing::warn!(state = ?client.state(), "No fresh speed data");
                    }
                    data_valid = valid;
                }
            }
        }
    }

    client.shutdown().await;
    // Closes the event channel so the pipeline drains and stops.
    drop(client);
    if !pipeline_done {
        match pipeline_task.await {
            Ok(error) => terminal_error = terminal_error.or(error),
            Err(e) => tracing::error!(error = %e, "Pipeline task failed"),
        }
    }
    let _ = reporter.await;

    if let Some(message) = terminal_error {
        tracing::error!(error = %message, "carspeed-agent stopped");
        std::process::exit(1);
    }
    tracing::info!("carspeed-agent stopped");
}

/// Resolve on SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

/// Log what the pipeline publishes until the bus goes away.
async fn report_events(mut events: broadcast::Receiver<PipelineEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match event.kind {
                PipelineEventKind::StateChanged { old, new } => {
                    tracing::info!(%old, %new, "Severity state changed");
                }
                PipelineEventKind::AlertTriggered { level, message } => {
                    tracing::warn!(level = level.as_str(), message = %message, "Driver alert");
                }
                PipelineEventKind::AlertCleared => tracing::info!("Driver alert cleared"),
                PipelineEventKind::LogRotated { path } => {
                    tracing::info!(path = %path.display(), "Speed log rotated");
                }
                kind => tracing::trace!(?kind, "Pipeline event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event reporter lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

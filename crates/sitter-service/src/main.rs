//! Sitter Service
//!
//! Shared-account occupancy tracker with recurring Discord status
//! broadcasts.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize logging (text or JSON)
//! 3. Load the snapshot file (refuse to start on a corrupt file)
//! 4. Build the Discord delivery client
//! 5. Build the broadcast scheduler and occupancy service
//! 6. Resume broadcast tasks for held groups
//! 7. Wait for shutdown signal, then stop every broadcast task
//!
//! The binary registers no chat commands. The occupancy service is built
//! only to resume broadcasts; a command transport drives it through
//! `OccupancyService` from the library.

#![warn(clippy::pedantic)]

use std::sync::Arc;
use std::time::Duration;

use sitter_service::broadcast::{BroadcastContext, BroadcastScheduler};
use sitter_service::clock::{ServerTime, SystemClock};
use sitter_service::config::{Config, LogFormat};
use sitter_service::delivery::DiscordDelivery;
use sitter_service::occupancy::{JsonFileStore, OccupancyService, OccupancyStore};
use sitter_service::render::MessageRenderer;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound on waiting for broadcast tasks at shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first so the log format is known
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(config.log_format);

    info!("Starting Sitter Service");
    info!(
        state_file = %config.state_file.display(),
        server_utc_offset_minutes = config.server_utc_offset_minutes,
        default_interval_minutes = config.intervals.default_minutes,
        min_interval_minutes = config.intervals.min_minutes,
        delivery_timeout_seconds = config.delivery_timeout_seconds,
        discord_api_base_url = %config.discord_api_base_url,
        resume_broadcasts = config.resume_broadcasts,
        "Configuration loaded successfully"
    );

    let server_time = ServerTime::from_offset_minutes(config.server_utc_offset_minutes)
        .ok_or_else(|| {
            format!(
                "Invalid server UTC offset: {} minutes",
                config.server_utc_offset_minutes
            )
        })?;

    let snapshots = Arc::new(JsonFileStore::new(config.state_file.clone()));
    let store = OccupancyStore::load(snapshots).await.map_err(|e| {
        error!(error = %e, "Failed to load occupancy state");
        e
    })?;

    let delivery = DiscordDelivery::new(
        config.discord_api_base_url.clone(),
        config.discord_token.clone(),
        config.delivery_timeout(),
    )
    .map_err(|e| {
        error!(error = %e, "Failed to build Discord delivery client");
        e
    })?;

    let scheduler = Arc::new(BroadcastScheduler::new(BroadcastContext {
        store: Arc::new(store),
        delivery: Arc::new(delivery),
        clock: Arc::new(SystemClock),
        renderer: MessageRenderer::new(server_time),
        intervals: config.intervals,
        delivery_timeout: config.delivery_timeout(),
    }));
    let service = OccupancyService::new(Arc::clone(&scheduler));

    if config.resume_broadcasts {
        service.resume_broadcasts().await;
    }

    info!("Sitter Service running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, stopping broadcast tasks...");
    scheduler.shutdown(SHUTDOWN_DEADLINE).await;

    info!("Sitter Service shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sitter_service=info".into());

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; without them the service
/// cannot shut down gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

//! # station-node
//!
//! Daemon hosting a Geogram station node.
//!
//! This binary provides:
//! - **Station service** facade: create/start/stop the local station,
//!   manage remote references, stream state changes
//! - **Storage engine** with quota enforcement and retention sweeps
//! - **Channel manager** for internet HTTP(S), local-network hotspot, and
//!   radio transports
//! - **Certificate lifecycle** with automatic renewal

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use station_net::{
    spawn_renewal_task, CertificateAuthority, CertificateManager, ChannelManager, HttpAuthority,
    SelfSignedAuthority, SoftApBackend,
};
use station_node::{EventBus, StationService};
use station_store::{spawn_retention_sweeper, StorageEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,station_node=debug")),
        )
        .init();

    info!("Starting Geogram station node v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Resolve data directory
    // -----------------------------------------------------------------------
    let data_dir = std::env::var("GEOGRAM_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./station-data"));
    tokio::fs::create_dir_all(&data_dir).await?;
    info!(path = %data_dir.display(), "Using data directory");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Storage engine; the persisted station config (if any) replaces these
    // defaults when the service restores its manifest.
    let engine = Arc::new(StorageEngine::new(Default::default()));

    // Certificate authority: self-signed is opt-in for offline deployments.
    let authority: Arc<dyn CertificateAuthority> =
        if std::env::var("GEOGRAM_SELF_SIGNED_CERTS").is_ok() {
            info!("Using self-signed certificate authority");
            Arc::new(SelfSignedAuthority)
        } else {
            Arc::new(HttpAuthority::new())
        };
    let certs = Arc::new(CertificateManager::new(authority));

    let channels = Arc::new(ChannelManager::new(
        certs.clone(),
        Arc::new(SoftApBackend::default()),
    ));

    let bus = Arc::new(EventBus::new());
    let service = StationService::new(
        engine.clone(),
        channels,
        certs.clone(),
        bus,
        data_dir,
    )
    .await?;

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Hourly retention sweep over stored records
    spawn_retention_sweeper(engine, Duration::from_secs(3600));

    // Certificate renewal check twice a day
    spawn_renewal_task(certs, Duration::from_secs(12 * 3600));

    // Periodic stats snapshot for subscribers
    {
        let service = service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                if let Err(e) = service.publish_stats().await {
                    // No station configured yet; nothing to report.
                    tracing::debug!(error = %e, "Stats snapshot skipped");
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // 5. Resume the station if it was running when the process last exited
    // -----------------------------------------------------------------------
    match service.intended_running().await {
        Ok(true) => {
            if let Err(e) = service.start().await {
                error!(error = %e, "Station failed to resume, staying up for management");
            }
        }
        Ok(false) => info!("Station configured but not set to run"),
        Err(_) => info!("No station configured yet"),
    }

    // -----------------------------------------------------------------------
    // 6. Run until shutdown
    // -----------------------------------------------------------------------
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");
    match service.stop().await {
        Ok(()) => info!("Station stopped cleanly"),
        Err(station_node::NodeError::NotRunning) | Err(station_node::NodeError::NoStation) => {}
        Err(e) => error!(error = %e, "Error during shutdown"),
    }
    Ok(())
}

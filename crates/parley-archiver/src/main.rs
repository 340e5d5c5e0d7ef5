//! # Parley Archiver
//!
//! Reads chat messages from the durable queue and appends them to a log
//! file, acknowledging each entry only after it has been written.
//!
//! ```bash
//! PARLEY_ARCHIVER_CONFIG=/etc/parley/archiver.toml parley-archiver
//! ```

mod archive;
mod config;
mod runner;

use anyhow::{Context, Result};
use archive::ArchiveLog;
use parley_broker::StreamConsumer;
use runner::Archiver;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_archiver=info,parley_broker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::ArchiverConfig::load()?;

    let log = ArchiveLog::open(&config.archive.log_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open archive log: {}",
                config.archive.log_path.display()
            )
        })?;

    let consumer = StreamConsumer::new(&config.broker, config.archive.consumer_name.clone())
        .context("Invalid broker configuration")?;

    info!(
        queue = %config.broker.queue,
        group = %config.broker.consumer_group,
        consumer = %consumer.name(),
        log = %log.path().display(),
        "Starting archiver"
    );

    let archiver = Archiver::new(consumer, log, config.archive);
    archiver.run(shutdown_signal()).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

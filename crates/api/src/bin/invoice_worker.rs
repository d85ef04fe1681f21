//! Invoice worker entry point.
//!
//! Consumes the PostgreSQL invoice queue until SIGINT/SIGTERM. A job being
//! processed when the signal arrives is finished first.

use api::config::Config;
use api::error::StartupError;
use api::shutdown::shutdown_signal;
use api::{bootstrap, telemetry};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = Config::from_env();
    telemetry::init_tracing(&config);
    // Counters are recorded but not served; the API process exposes /metrics
    let _metrics = telemetry::install_metrics()?;

    let worker = bootstrap::build_worker(&config).await?;
    tracing::info!(
        queue = %config.invoice_queue_name,
        max_deliveries = config.worker.max_deliveries,
        documents_dir = %config.documents.dir.display(),
        "starting invoice worker"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await;
    Ok(())
}

//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::error::StartupError;
use api::shutdown::shutdown_signal;
use api::{bootstrap, telemetry};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    telemetry::init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = telemetry::install_metrics()?;

    // 3. Connect stores and wire the saga
    let state = Arc::new(bootstrap::build_state(&config).await?);

    // 4. An in-memory queue is only reachable from this process
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = if config.in_memory() {
        let worker = bootstrap::embedded_worker(&state, &config);
        tracing::info!("running the invoice worker in-process");
        Some(tokio::spawn(async move { worker.run(shutdown_rx).await }))
    } else {
        None
    };

    // 5. Build the application and start the server
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 6. Let an in-flight invoice job finish
    let _ = shutdown_tx.send(true);
    if let Some(worker) = worker
        && let Err(e) = worker.await
    {
        tracing::error!(error = %e, "invoice worker task failed");
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

//! Tracing and metrics setup shared by both binaries.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};
use crate::error::StartupError;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when both are present.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let (text, json) = match config.log_format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

/// Installs the Prometheus recorder and returns its render handle.
pub fn install_metrics() -> Result<PrometheusHandle, StartupError> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use saga::WorkerConfig;

/// Log output format, selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Where invoice documents are written and how their URLs are signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentsConfig {
    pub dir: PathBuf,
    pub base_url: String,
    pub signing_secret: String,
    pub url_ttl: Duration,
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: order ledger and invoice queue; in-memory when unset
/// - `CATALOG_DATABASE_URL`: inventory store; falls back to `DATABASE_URL`
/// - `CATALOG_SERVICE_URL`: remote catalog; the local store is used when unset
/// - `ORDER_SERVICE_URL`: completion callback target for the worker
/// - `INVOICE_QUEUE_NAME`, `POLL_INTERVAL_SECONDS`,
///   `VISIBILITY_TIMEOUT_SECONDS`, `MAX_DELIVERIES`
/// - `DOCUMENTS_DIR`, `DOCUMENTS_BASE_URL`, `DOCUMENT_SIGNING_SECRET`,
///   `DOCUMENT_URL_TTL_DAYS`
/// - `SEED_PRODUCTS_FILE`: JSON products loaded into an empty catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub catalog_database_url: Option<String>,
    pub catalog_service_url: Option<String>,
    pub order_service_url: Option<String>,
    pub invoice_queue_name: String,
    pub worker: WorkerConfig,
    pub documents: DocumentsConfig,
    pub seed_products_file: Option<PathBuf>,
}

pub const DEFAULT_SIGNING_SECRET: &str = "local-development-secret";

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| var(key).and_then(|v| v.trim().parse::<u64>().ok());

        let worker = WorkerConfig {
            poll_interval: parsed("POLL_INTERVAL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.worker.poll_interval),
            visibility_timeout: parsed("VISIBILITY_TIMEOUT_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.worker.visibility_timeout),
            max_deliveries: parsed("MAX_DELIVERIES")
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.worker.max_deliveries),
            url_ttl: parsed("DOCUMENT_URL_TTL_DAYS")
                .and_then(|days| days.checked_mul(24 * 60 * 60))
                .map(Duration::from_secs)
                .unwrap_or(defaults.worker.url_ttl),
        };

        let documents = DocumentsConfig {
            dir: var("DOCUMENTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.documents.dir),
            base_url: var("DOCUMENTS_BASE_URL").unwrap_or(defaults.documents.base_url),
            signing_secret: var("DOCUMENT_SIGNING_SECRET")
                .unwrap_or(defaults.documents.signing_secret),
            url_ttl: worker.url_ttl,
        };

        let database_url = var("DATABASE_URL");
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            catalog_database_url: var("CATALOG_DATABASE_URL").or_else(|| database_url.clone()),
            database_url,
            catalog_service_url: var("CATALOG_SERVICE_URL"),
            order_service_url: var("ORDER_SERVICE_URL"),
            invoice_queue_name: var("INVOICE_QUEUE_NAME").unwrap_or(defaults.invoice_queue_name),
            worker,
            documents,
            seed_products_file: var("SEED_PRODUCTS_FILE").map(PathBuf::from),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when orders and the queue live in process memory.
    pub fn in_memory(&self) -> bool {
        self.database_url.is_none()
    }
}

impl Default for Config {
    fn default() -> Self {
        let worker = WorkerConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            catalog_database_url: None,
            catalog_service_url: None,
            order_service_url: None,
            invoice_queue_name: "invoices".to_string(),
            documents: DocumentsConfig {
                dir: PathBuf::from("data/invoices"),
                base_url: "http://localhost:3000/documents".to_string(),
                signing_secret: DEFAULT_SIGNING_SECRET.to_string(),
                url_ttl: worker.url_ttl,
            },
            worker,
            seed_products_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.invoice_queue_name, "invoices");
        assert!(config.in_memory());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn empty_environment_matches_defaults() {
        assert_eq!(from_pairs(&[]), Config::default());
    }

    #[test]
    fn worker_settings_are_read() {
        let config = from_pairs(&[
            ("POLL_INTERVAL_SECONDS", "2"),
            ("VISIBILITY_TIMEOUT_SECONDS", "45"),
            ("MAX_DELIVERIES", "3"),
            ("DOCUMENT_URL_TTL_DAYS", "7"),
        ]);
        assert_eq!(config.worker.poll_interval, Duration::from_secs(2));
        assert_eq!(config.worker.visibility_timeout, Duration::from_secs(45));
        assert_eq!(config.worker.max_deliveries, 3);
        assert_eq!(config.documents.url_ttl, Duration::from_secs(7 * 86_400));
    }

    #[test]
    fn catalog_database_falls_back_to_database_url() {
        let config = from_pairs(&[("DATABASE_URL", "postgres://orders")]);
        assert_eq!(config.catalog_database_url.as_deref(), Some("postgres://orders"));
        assert!(!config.in_memory());

        let split = from_pairs(&[
            ("DATABASE_URL", "postgres://orders"),
            ("CATALOG_DATABASE_URL", "postgres://catalog"),
        ]);
        assert_eq!(split.catalog_database_url.as_deref(), Some("postgres://catalog"));
    }

    #[test]
    fn seed_file_is_optional() {
        assert_eq!(Config::default().seed_products_file, None);
        let config = from_pairs(&[("SEED_PRODUCTS_FILE", "seed/products.json")]);
        assert_eq!(config.seed_products_file, Some(PathBuf::from("seed/products.json")));
    }

    #[test]
    fn invalid_numbers_keep_defaults() {
        let config = from_pairs(&[("PORT", "http"), ("MAX_DELIVERIES", "0")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.worker.max_deliveries, 5);
    }

    #[test]
    fn oversized_url_ttl_keeps_default() {
        let config = from_pairs(&[("DOCUMENT_URL_TTL_DAYS", "18446744073709551615")]);
        assert_eq!(config.documents.url_ttl, Config::default().documents.url_ttl);
    }

    #[test]
    fn log_format_switch() {
        assert_eq!(from_pairs(&[("LOG_FORMAT", "JSON")]).log_format, LogFormat::Json);
        assert_eq!(from_pairs(&[("LOG_FORMAT", "pretty")]).log_format, LogFormat::Text);
    }
}

//! Builds stores, the saga and the invoice worker from [`Config`].
//!
//! Each store is backed by PostgreSQL when its database URL is set and by
//! process memory otherwise.

use std::sync::Arc;
use std::time::Duration;

use catalog::{InventoryStore, PostgresInventoryStore};
use ledger::{InMemoryOrderLedger, OrderLedger, PostgresOrderLedger};
use saga::{
    CatalogGateway, FilesystemDocumentStore, HttpCatalogGateway, HttpInvoiceCallback,
    InMemoryInvoiceQueue, InvoiceCallback, InvoiceQueue, InvoiceWorker, LedgerCallback,
    LocalCatalogGateway, PostgresInvoiceQueue, TextInvoiceRenderer, UrlSigner,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::AppState;
use crate::config::{Config, DEFAULT_SIGNING_SECRET};
use crate::error::StartupError;
use crate::seed;

pub const CATALOG_TIMEOUT: Duration = Duration::from_secs(5);
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// The invoice worker as wired by the binaries.
pub type Worker = InvoiceWorker<
    Arc<dyn InvoiceQueue>,
    TextInvoiceRenderer,
    FilesystemDocumentStore,
    Arc<dyn InvoiceCallback>,
>;

async fn connect(url: &str) -> Result<PgPool, StartupError> {
    Ok(PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?)
}

/// Filesystem document store signing URLs with the configured secret.
pub fn document_store(config: &Config) -> FilesystemDocumentStore {
    if config.documents.signing_secret == DEFAULT_SIGNING_SECRET {
        tracing::warn!("DOCUMENT_SIGNING_SECRET is not set, using the development secret");
    }
    FilesystemDocumentStore::new(
        config.documents.dir.clone(),
        config.documents.base_url.clone(),
        UrlSigner::new(&config.documents.signing_secret),
    )
}

async fn invoice_queue(pool: PgPool, config: &Config) -> Result<Arc<dyn InvoiceQueue>, StartupError> {
    let queue = PostgresInvoiceQueue::new(pool, config.invoice_queue_name.clone());
    queue.run_migrations().await?;
    Ok(Arc::new(queue))
}

/// Connects every store and wires the order saga.
pub async fn build_state(config: &Config) -> Result<AppState, StartupError> {
    let orders_pool = match &config.database_url {
        Some(url) => Some(connect(url).await?),
        None => None,
    };

    let catalog_pool = match (&config.catalog_database_url, &orders_pool) {
        (Some(url), Some(pool)) if config.database_url.as_ref() == Some(url) => Some(pool.clone()),
        (Some(url), _) => Some(connect(url).await?),
        (None, _) => None,
    };

    let seed_products = match &config.seed_products_file {
        Some(path) => seed::load(path).await?,
        None => Vec::new(),
    };

    let inventory: Arc<dyn InventoryStore> = match catalog_pool {
        Some(pool) => {
            let store = PostgresInventoryStore::new(pool);
            store.run_migrations().await?;
            let inserted = seed::into_postgres(&store, &seed_products).await?;
            if inserted > 0 {
                tracing::info!(inserted, "seeded empty catalog");
            }
            Arc::new(store)
        }
        None => {
            if seed_products.is_empty() {
                tracing::warn!(
                    "in-memory catalog is empty, set SEED_PRODUCTS_FILE to load products"
                );
            } else {
                tracing::info!(products = seed_products.len(), "seeded in-memory catalog");
            }
            Arc::new(seed::into_memory(&seed_products))
        }
    };

    let gateway: Arc<dyn CatalogGateway> = match &config.catalog_service_url {
        Some(url) => {
            tracing::info!(%url, "using remote catalog service");
            Arc::new(HttpCatalogGateway::new(url.as_str(), CATALOG_TIMEOUT)?)
        }
        None => Arc::new(LocalCatalogGateway::new(inventory.clone())),
    };

    let (ledger, queue): (Arc<dyn OrderLedger>, Arc<dyn InvoiceQueue>) = match orders_pool {
        Some(pool) => {
            let ledger = PostgresOrderLedger::new(pool.clone());
            ledger.run_migrations().await?;
            (Arc::new(ledger), invoice_queue(pool, config).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, orders and invoice jobs are kept in memory");
            (
                Arc::new(InMemoryOrderLedger::new()),
                Arc::new(InMemoryInvoiceQueue::new()),
            )
        }
    };

    Ok(AppState::new(inventory, gateway, ledger, queue).with_documents(document_store(config)))
}

/// Worker sharing the API process's queue and ledger.
///
/// Used when the queue lives in memory, where no separate worker process
/// could reach it.
pub fn embedded_worker(state: &AppState, config: &Config) -> Worker {
    let callback: Arc<dyn InvoiceCallback> = Arc::new(LedgerCallback::new(state.ledger().clone()));
    InvoiceWorker::new(
        state.queue().clone(),
        TextInvoiceRenderer,
        document_store(config),
        callback,
        config.worker.clone(),
    )
}

/// Standalone worker: PostgreSQL queue, completion over HTTP when
/// `ORDER_SERVICE_URL` is set and straight into the ledger otherwise.
pub async fn build_worker(config: &Config) -> Result<Worker, StartupError> {
    let url = config.database_url.as_deref().ok_or_else(|| {
        StartupError::Config("DATABASE_URL is required for the invoice worker".to_string())
    })?;
    let pool = connect(url).await?;
    let queue = invoice_queue(pool.clone(), config).await?;

    let callback: Arc<dyn InvoiceCallback> = match &config.order_service_url {
        Some(url) => {
            tracing::info!(%url, "reporting invoices to the order service");
            Arc::new(HttpInvoiceCallback::new(url.as_str(), CALLBACK_TIMEOUT)?)
        }
        None => {
            let ledger = PostgresOrderLedger::new(pool);
            ledger.run_migrations().await?;
            Arc::new(LedgerCallback::new(ledger))
        }
    };

    Ok(InvoiceWorker::new(
        queue,
        TextInvoiceRenderer,
        document_store(config),
        callback,
        config.worker.clone(),
    ))
}

//! HTTP API for the catalog, the order saga and invoice documents.
//!
//! Provides REST endpoints for products and orders, with structured
//! logging (tracing) and Prometheus metrics. The same crate builds the
//! `invoice-worker` binary.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod routes;
pub mod seed;
pub mod shutdown;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use catalog::InventoryStore;
use ledger::OrderLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    CatalogGateway, FilesystemDocumentStore, InvoiceQueue, LocalCatalogGateway, OrderOrchestrator,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// The order saga as wired into the API.
pub type Orchestrator =
    OrderOrchestrator<Arc<dyn CatalogGateway>, Arc<dyn OrderLedger>, Arc<dyn InvoiceQueue>>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub inventory: Arc<dyn InventoryStore>,
    pub orchestrator: Orchestrator,
    pub documents: Option<FilesystemDocumentStore>,
}

impl AppState {
    /// Wires the saga over the given stores.
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        gateway: Arc<dyn CatalogGateway>,
        ledger: Arc<dyn OrderLedger>,
        queue: Arc<dyn InvoiceQueue>,
    ) -> Self {
        Self {
            inventory,
            orchestrator: OrderOrchestrator::new(gateway, ledger, queue),
            documents: None,
        }
    }

    /// Wires the saga with the catalog running in the same process.
    pub fn local(
        inventory: Arc<dyn InventoryStore>,
        ledger: Arc<dyn OrderLedger>,
        queue: Arc<dyn InvoiceQueue>,
    ) -> Self {
        let gateway: Arc<dyn CatalogGateway> =
            Arc::new(LocalCatalogGateway::new(inventory.clone()));
        Self::new(inventory, gateway, ledger, queue)
    }

    /// Serves signed document URLs from `documents`.
    pub fn with_documents(mut self, documents: FilesystemDocumentStore) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn ledger(&self) -> &Arc<dyn OrderLedger> {
        self.orchestrator.ledger()
    }

    pub fn queue(&self) -> &Arc<dyn InvoiceQueue> {
        self.orchestrator.queue()
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/products", get(routes::products::list))
        .route("/products/{id}", get(routes::products::get))
        .route("/products/code/{code}", get(routes::products::get_by_code))
        .route("/products/check-stock", post(routes::products::check_stock))
        .route("/products/reserve", post(routes::products::reserve))
        .route("/products/release", post(routes::products::release))
        .route("/orders", post(routes::orders::create).get(routes::orders::list))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/status", patch(routes::orders::update_status))
        .route("/orders/{id}/invoice", post(routes::orders::record_invoice))
        .route("/documents/{name}", get(routes::documents::download))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

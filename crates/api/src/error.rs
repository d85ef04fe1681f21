//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use catalog::CatalogError;
use ledger::LedgerError;
use saga::{CatalogErrorBody, OrderError, QueueError};
use serde_json::json;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// A signed URL did not verify.
    Forbidden(String),
    /// Catalog route failure.
    Catalog(CatalogError),
    /// Order placement failure.
    Order(OrderError),
    /// Order ledger failure.
    Ledger(LedgerError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ApiError::Catalog(err) => catalog_error_to_response(&err),
            ApiError::Order(err) => order_error_to_response(err),
            ApiError::Ledger(err) => ledger_error_to_response(&err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Status code the catalog routes use for each error.
pub fn catalog_status(err: &CatalogError) -> StatusCode {
    match err {
        CatalogError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::InsufficientStock { .. } => StatusCode::CONFLICT,
        CatalogError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        e if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn catalog_error_to_response(err: &CatalogError) -> (StatusCode, serde_json::Value) {
    let status = catalog_status(err);
    if status.is_server_error() {
        tracing::error!(error = %err, "catalog request failed");
    }
    let body = serde_json::to_value(CatalogErrorBody::from_error(err))
        .unwrap_or_else(|_| json!({ "error": err.to_string() }));
    (status, body)
}

fn order_error_to_response(err: OrderError) -> (StatusCode, serde_json::Value) {
    let message = err.to_string();
    match err {
        OrderError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
        OrderError::Availability { unavailable } => (
            StatusCode::CONFLICT,
            json!({ "error": message, "unavailable_items": unavailable }),
        ),
        OrderError::Reservation(e) => (
            StatusCode::CONFLICT,
            json!({ "error": message, "product_id": e.product_id() }),
        ),
        OrderError::Persistence { compensated, .. } => {
            tracing::error!(error = %message, compensated, "order persistence failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": message, "stock_released": compensated }),
            )
        }
        OrderError::UpstreamUnavailable { service, .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "error": message, "service": service }),
        ),
    }
}

fn ledger_error_to_response(err: &LedgerError) -> (StatusCode, serde_json::Value) {
    let status = match err {
        LedgerError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InvalidStatus(_) | LedgerError::InvalidQuantity { .. } => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::InvalidTransition { .. } | LedgerError::DuplicateOrderNumber(_) => {
            StatusCode::CONFLICT
        }
        e if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "order ledger request failed");
    }
    (status, json!({ "error": err.to_string() }))
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::Catalog(err)
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Errors that stop a binary from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Catalog setup failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Order ledger setup failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Invoice queue setup failed: {0}")]
    Queue(#[from] QueueError),

    #[error("Invoice callback setup failed: {0}")]
    Callback(#[from] saga::CallbackError),

    #[error("Seed file is not valid JSON: {0}")]
    Seed(#[from] serde_json::Error),

    #[error("Metrics setup failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

//! Saga and worker error types.

use catalog::{CatalogError, LineAvailability};
use ledger::LedgerError;
use serde::Serialize;
use thiserror::Error;

use crate::OrderId;

/// Why an order could not be placed.
///
/// Every variant is terminal for the request. Only `Persistence` can follow
/// a committed reservation, and it records whether the compensating release
/// went through.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request itself is malformed. Nothing was touched.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// At least one line cannot be satisfied according to the stock check.
    #[error("Some products are not available")]
    Availability { unavailable: Vec<LineAvailability> },

    /// The catalog rejected the reservation. No stock changed.
    #[error("Stock reservation failed: {0}")]
    Reservation(CatalogError),

    /// The order could not be stored after stock was reserved.
    #[error("Failed to persist order: {reason}")]
    Persistence { reason: String, compensated: bool },

    /// A collaborator could not be reached.
    #[error("{service} unavailable: {reason}")]
    UpstreamUnavailable {
        service: &'static str,
        reason: String,
    },
}

impl OrderError {
    pub(crate) fn upstream(service: &'static str, reason: impl ToString) -> Self {
        OrderError::UpstreamUnavailable {
            service,
            reason: reason.to_string(),
        }
    }
}

/// A non-fatal problem after the order was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishWarning {
    pub order_id: OrderId,
    pub message: String,
}

/// Errors from the invoice queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The message was re-leased since this receipt was issued.
    #[error("Pop receipt for message {message_id} is no longer valid")]
    ReceiptMismatch { message_id: i64 },

    /// The queue could not be reached.
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from rendering or storing invoice documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Invalid document name: {0}")]
    InvalidName(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the invoice completion callback.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    /// The order service answered with an unexpected status.
    #[error("Callback rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Order service unavailable: {0}")]
    Unavailable(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Why one invoice job could not be completed.
///
/// Never reaches an order-creation caller; the worker logs it and leaves
/// the message for redelivery.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to decode invoice job: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to render invoice: {0}")]
    Render(DocumentError),

    #[error("Failed to store invoice: {0}")]
    DocumentStore(DocumentError),

    #[error("Completion callback failed: {0}")]
    Callback(#[from] CallbackError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl WorkerError {
    /// Short label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Decode(_) => "decode",
            WorkerError::Render(_) => "render",
            WorkerError::DocumentStore(_) => "document_store",
            WorkerError::Callback(_) => "callback",
            WorkerError::Queue(_) => "queue",
        }
    }
}

use thiserror::Error;

use crate::{OrderId, OrderStatus, ProductId};

/// Errors that can occur when interacting with the order ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No order exists with the given ID.
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    /// A status string is not one of pending, processing, completed.
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// The requested status change is not allowed.
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A line item quantity is zero or does not fit the ledger.
    #[error("Invalid quantity for product {product_id}: {quantity}")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// Another order already carries this order number.
    #[error("Duplicate order number: {0}")]
    DuplicateOrderNumber(String),

    /// A stored row holds a value the ledger never writes.
    #[error("Corrupted order record: {0}")]
    Corrupted(String),

    /// The ledger could not be reached.
    #[error("Order ledger unavailable: {0}")]
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

impl LedgerError {
    /// Returns true for connectivity failures as opposed to rejected writes.
    pub fn is_unavailable(&self) -> bool {
        match self {
            LedgerError::Unavailable(_) => true,
            LedgerError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

/// Result type for order ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

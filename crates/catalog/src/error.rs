use thiserror::Error;

use crate::ProductId;

/// Errors that can occur when interacting with the inventory store.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A requested product does not exist. Fails the whole reservation.
    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    /// A product does not hold enough stock. Fails the whole reservation;
    /// no other line is touched.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// The request itself is malformed (empty, zero quantity).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The store could not be reached (network failure, timeout, outage).
    #[error("Inventory store unavailable: {0}")]
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

impl CatalogError {
    /// Returns true if the error means "store down" rather than "request
    /// rejected", so callers can tell the two apart.
    pub fn is_unavailable(&self) -> bool {
        match self {
            CatalogError::Unavailable(_) => true,
            CatalogError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }

    /// The product that caused a rejected reservation, if any.
    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            CatalogError::ProductNotFound(id) => Some(*id),
            CatalogError::InsufficientStock { product_id, .. } => Some(*product_id),
            _ => None,
        }
    }
}

/// Result type for inventory store operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_distinguished_from_rejection() {
        assert!(CatalogError::Unavailable("timeout".into()).is_unavailable());
        assert!(CatalogError::Database(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(!CatalogError::ProductNotFound(ProductId::new(1)).is_unavailable());
    }

    #[test]
    fn rejected_reservations_name_the_product() {
        let err = CatalogError::InsufficientStock {
            product_id: ProductId::new(2),
            requested: 3,
            available: 0,
        };
        assert_eq!(err.product_id(), Some(ProductId::new(2)));
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product 2: requested 3, available 0"
        );
    }
}

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    CatalogError, MAX_QUANTITY, Product, ProductId, Release, Reservation, ReservationId, Result,
    StockCheck, StockLine,
};

/// Core trait for inventory store implementations.
///
/// The store owns per-product stock counters. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Reports availability, price and name for each requested line.
    ///
    /// Read-only and unlocked; the answer is advisory and must be re-checked
    /// by [`InventoryStore::reserve_stock`].
    async fn check_stock(&self, lines: &[StockLine]) -> Result<StockCheck>;

    /// Atomically reserves every line or none of them.
    ///
    /// Lines naming the same product are merged. Rows are locked in
    /// ascending product-id order before any check, then every line is
    /// validated and only if all pass are quantities decremented. On
    /// failure nothing is mutated and the first failing product (in id
    /// order) is reported.
    async fn reserve_stock(
        &self,
        reservation_id: ReservationId,
        lines: &[StockLine],
    ) -> Result<Reservation>;

    /// Adds stock back for each line. Never fails on "too much stock";
    /// unknown products are skipped.
    ///
    /// With a `reservation_id`, a second release under the same ID is a
    /// no-op reporting `already_released`.
    async fn release_stock(
        &self,
        reservation_id: Option<ReservationId>,
        lines: &[StockLine],
    ) -> Result<Release>;

    /// Loads a product by ID.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Loads a product by its unique code.
    async fn get_product_by_code(&self, code: &str) -> Result<Option<Product>>;

    /// Lists all products ordered by ID.
    async fn list_products(&self) -> Result<Vec<Product>>;
}

#[async_trait]
impl<T: InventoryStore + ?Sized> InventoryStore for Arc<T> {
    async fn check_stock(&self, lines: &[StockLine]) -> Result<StockCheck> {
        (**self).check_stock(lines).await
    }

    async fn reserve_stock(
        &self,
        reservation_id: ReservationId,
        lines: &[StockLine],
    ) -> Result<Reservation> {
        (**self).reserve_stock(reservation_id, lines).await
    }

    async fn release_stock(
        &self,
        reservation_id: Option<ReservationId>,
        lines: &[StockLine],
    ) -> Result<Release> {
        (**self).release_stock(reservation_id, lines).await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        (**self).get_product(id).await
    }

    async fn get_product_by_code(&self, code: &str) -> Result<Option<Product>> {
        (**self).get_product_by_code(code).await
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        (**self).list_products().await
    }
}

/// Validates request lines before they reach a store.
pub fn validate_lines(lines: &[StockLine]) -> Result<()> {
    merge_lines(lines).map(|_| ())
}

/// Validates request lines and merges them with [`StockLine::merge`].
pub fn merge_lines(lines: &[StockLine]) -> Result<Vec<StockLine>> {
    if lines.is_empty() {
        return Err(CatalogError::InvalidRequest(
            "Expected at least one item".to_string(),
        ));
    }

    if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
        return Err(CatalogError::InvalidRequest(format!(
            "Quantity for product {} must be at least 1",
            line.product_id
        )));
    }

    if let Some(line) = lines.iter().find(|l| l.quantity > MAX_QUANTITY) {
        return Err(CatalogError::InvalidRequest(format!(
            "Quantity for product {} must be at most {MAX_QUANTITY}",
            line.product_id
        )));
    }

    StockLine::merge(lines).ok_or_else(|| {
        CatalogError::InvalidRequest(format!(
            "Combined quantity for a product must be at most {MAX_QUANTITY}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_is_rejected() {
        assert!(matches!(
            validate_lines(&[]),
            Err(CatalogError::InvalidRequest(_))
        ));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let lines = [StockLine::new(ProductId::new(1), 1), StockLine::new(ProductId::new(2), 0)];
        let err = validate_lines(&lines).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid request: Quantity for product 2 must be at least 1"
        );
    }

    #[test]
    fn oversized_quantity_is_rejected() {
        let lines = [StockLine::new(ProductId::new(4), MAX_QUANTITY + 1)];
        let err = validate_lines(&lines).unwrap_err();
        assert!(err.to_string().contains("Quantity for product 4 must be at most"));
    }

    #[test]
    fn duplicate_lines_may_not_sum_past_the_bound() {
        let lines = [
            StockLine::new(ProductId::new(1), 3),
            StockLine::new(ProductId::new(1), MAX_QUANTITY),
        ];
        assert!(matches!(
            merge_lines(&lines),
            Err(CatalogError::InvalidRequest(msg)) if msg.starts_with("Combined quantity")
        ));
    }

    #[test]
    fn positive_quantities_pass() {
        assert!(validate_lines(&[StockLine::new(ProductId::new(1), 3)]).is_ok());
    }
}

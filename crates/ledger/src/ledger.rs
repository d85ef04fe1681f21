use std::sync::Arc;

use async_trait::async_trait;

use crate::{NewOrder, Order, OrderId, OrderStatus, Result};

/// Core trait for order ledger implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Inserts an order and all of its items in one transaction.
    ///
    /// The stored order is `Pending`, has no `pdf_url` and a total equal to
    /// the sum of its line totals. Either everything is written or nothing.
    async fn create_order(&self, order: NewOrder) -> Result<Order>;

    /// Loads an order with its items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists all orders, newest first.
    async fn list_orders(&self) -> Result<Vec<Order>>;

    /// Moves an order to `status`, optionally attaching a document URL.
    ///
    /// A URL is only stored when the order has none yet.
    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        pdf_url: Option<String>,
    ) -> Result<Order>;

    /// Records the invoice document for an order.
    ///
    /// Idempotent: once the order is completed with a URL, further calls
    /// return it unchanged, even with a different URL.
    async fn update_invoice(
        &self,
        id: OrderId,
        pdf_url: String,
        status: OrderStatus,
    ) -> Result<Order>;
}

#[async_trait]
impl<T: OrderLedger + ?Sized> OrderLedger for Arc<T> {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        (**self).create_order(order).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        (**self).get_order(id).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        (**self).list_orders().await
    }

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        pdf_url: Option<String>,
    ) -> Result<Order> {
        (**self).update_status(id, status, pdf_url).await
    }

    async fn update_invoice(
        &self,
        id: OrderId,
        pdf_url: String,
        status: OrderStatus,
    ) -> Result<Order> {
        (**self).update_invoice(id, pdf_url, status).await
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    LedgerError, NewOrder, Order, OrderId, OrderItem, OrderLedger, OrderStatus, Result,
};

/// In-memory order ledger.
///
/// Uses a single `RwLock` over all orders; every write holds it for the full
/// operation, so each call is atomic. Useful for tests and development.
#[derive(Clone)]
pub struct InMemoryOrderLedger {
    orders: Arc<RwLock<BTreeMap<OrderId, Order>>>,
    next_order_id: Arc<AtomicI64>,
    next_item_id: Arc<AtomicI64>,
    fail_on_create: Arc<AtomicBool>,
    unavailable: Arc<AtomicBool>,
}

impl Default for InMemoryOrderLedger {
    fn default() -> Self {
        Self {
            orders: Arc::default(),
            next_order_id: Arc::new(AtomicI64::new(1)),
            next_item_id: Arc::new(AtomicI64::new(1)),
            fail_on_create: Arc::default(),
            unavailable: Arc::default(),
        }
    }
}

impl InMemoryOrderLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures `create_order` to fail, as if the insert transaction
    /// had been rolled back.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Simulates an outage: every operation fails with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored orders.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Returns true if no order has been stored.
    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(
                "order ledger unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn modify<F>(&self, id: OrderId, apply: F) -> Result<Order>
    where
        F: FnOnce(&mut Order) -> Result<bool> + Send,
    {
        self.ensure_available()?;
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(LedgerError::OrderNotFound(id))?;

        // Apply to a copy so a rejected update leaves the stored order as is
        let mut updated = order.clone();
        if apply(&mut updated)? {
            *order = updated;
        }
        Ok(order.clone())
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrderLedger {
    #[tracing::instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        self.ensure_available()?;
        order.check_quantities()?;
        if self.fail_on_create.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(
                "order insert rolled back by simulated failure".to_string(),
            ));
        }

        let mut orders = self.orders.write().await;
        if orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(LedgerError::DuplicateOrderNumber(
                order.order_number.to_string(),
            ));
        }

        let now = Utc::now();
        let id = OrderId::new(self.next_order_id.fetch_add(1, Ordering::SeqCst));
        let total_price = order.total_price();
        let items = order
            .items
            .into_iter()
            .map(|item| OrderItem {
                id: self.next_item_id.fetch_add(1, Ordering::SeqCst),
                product_id: item.product.product_id,
                total_price: item.total_price(),
                product_code: item.product.code,
                product_name: item.product.name,
                quantity: item.quantity,
                unit_price: item.product.unit_price,
            })
            .collect();

        let stored = Order {
            id,
            order_number: order.order_number,
            customer_id: order.customer_id,
            customer_name: order.customer_name,
            status: OrderStatus::Pending,
            total_price,
            pdf_url: None,
            created_at: now,
            updated_at: now,
            items,
        };
        orders.insert(id, stored.clone());

        tracing::debug!(order_id = %id, "order stored");
        Ok(stored)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.ensure_available()?;
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        self.ensure_available()?;
        Ok(self.orders.read().await.values().rev().cloned().collect())
    }

    #[tracing::instrument(skip(self, pdf_url))]
    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        pdf_url: Option<String>,
    ) -> Result<Order> {
        self.modify(id, |order| order.apply_status(status, pdf_url, Utc::now()))
            .await
    }

    #[tracing::instrument(skip(self, pdf_url))]
    async fn update_invoice(
        &self,
        id: OrderId,
        pdf_url: String,
        status: OrderStatus,
    ) -> Result<Order> {
        self.modify(id, |order| {
            let changed = order.apply_invoice(pdf_url, status, Utc::now())?;
            if !changed {
                tracing::info!(order_id = %id, "invoice already recorded");
            }
            Ok(changed)
        })
        .await
    }
}

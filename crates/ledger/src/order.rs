//! Order records and the status lifecycle.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, MAX_QUANTITY, Money, OrderId, OrderNumber, ProductId, ProductSnapshot};

/// The status of an order.
///
/// ```text
/// Pending ──► Processing ──► Completed
///    │                          ▲
///    └──────────────────────────┘
/// ```
///
/// The creation saga leaves orders `Pending`; the invoice callback moves them
/// to `Completed`. `Processing` is only ever set through a manual status
/// update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Completed,
}

impl OrderStatus {
    /// Returns true if an order in this status may move to `next`.
    ///
    /// Re-applying the current status is always allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Pending)
                | (Pending, Processing)
                | (Pending, Completed)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Completed, Completed)
        )
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            other => Err(LedgerError::InvalidStatus(other.to_string())),
        }
    }
}

/// A line of an order. Code, name and unit price are copied from the
/// catalog when the order is placed and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub product_id: ProductId,
    pub product_code: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
}

impl OrderItem {
    /// The catalog snapshot this line was priced from.
    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot::new(
            self.product_id,
            self.product_code.clone(),
            self.product_name.clone(),
            self.unit_price,
        )
    }
}

/// A persisted order with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: String,
    pub customer_name: String,
    pub status: OrderStatus,
    pub total_price: Money,
    pub pdf_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Sum of the line totals. Always equal to `total_price`.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(|i| i.total_price).sum()
    }

    /// Returns true once the invoice has been recorded.
    pub fn has_invoice(&self) -> bool {
        self.status == OrderStatus::Completed && self.pdf_url.is_some()
    }

    /// Applies a status update in place. Returns false when nothing changed.
    ///
    /// `pdf_url` is write-once: it is only taken when the order has none.
    pub fn apply_status(
        &mut self,
        status: OrderStatus,
        pdf_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        if !self.status.can_transition_to(status) {
            return Err(LedgerError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }

        let attach = self.pdf_url.is_none() && pdf_url.is_some();
        if self.status == status && !attach {
            return Ok(false);
        }

        self.status = status;
        if attach {
            self.pdf_url = pdf_url;
        }
        self.updated_at = now;
        Ok(true)
    }

    /// Applies the invoice callback in place. Returns false when the invoice
    /// had already been recorded, in which case the order is untouched.
    pub fn apply_invoice(
        &mut self,
        pdf_url: String,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        if self.has_invoice() {
            return Ok(false);
        }
        self.apply_status(status, Some(pdf_url), now)
    }
}

/// One line of an order about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product: ProductSnapshot,
    pub quantity: u32,
}

impl NewOrderItem {
    pub fn new(product: ProductSnapshot, quantity: u32) -> Self {
        Self { product, quantity }
    }

    /// `unit_price * quantity`.
    pub fn total_price(&self) -> Money {
        self.product.unit_price.multiply(self.quantity)
    }
}

/// Input of [`crate::OrderLedger::create_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub customer_id: String,
    pub customer_name: String,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    /// Creates a new order input with a freshly generated order number.
    pub fn new(
        customer_id: impl Into<String>,
        customer_name: impl Into<String>,
        items: Vec<NewOrderItem>,
    ) -> Self {
        Self {
            order_number: OrderNumber::generate(),
            customer_id: customer_id.into(),
            customer_name: customer_name.into(),
            items,
        }
    }

    /// Replaces the generated order number.
    pub fn with_order_number(mut self, order_number: OrderNumber) -> Self {
        self.order_number = order_number;
        self
    }

    /// Sum of the line totals.
    pub fn total_price(&self) -> Money {
        self.items.iter().map(NewOrderItem::total_price).sum()
    }

    /// Rejects items whose quantity is zero or above [`MAX_QUANTITY`].
    pub fn check_quantities(&self) -> Result<(), LedgerError> {
        match self
            .items
            .iter()
            .find(|item| item.quantity == 0 || item.quantity > MAX_QUANTITY)
        {
            Some(item) => Err(LedgerError::InvalidQuantity {
                product_id: item.product.product_id,
                quantity: item.quantity,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: i64, cents: i64) -> ProductSnapshot {
        ProductSnapshot::new(ProductId::new(id), format!("PROD-{id:03}"), "Item", Money::from_cents(cents))
    }

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_forward_transitions_are_allowed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn test_backward_transitions_are_rejected() {
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_same_status_is_allowed() {
        for status in [OrderStatus::Pending, OrderStatus::Processing, OrderStatus::Completed] {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn test_status_parses_and_serializes_lowercase() {
        assert_eq!("completed".parse::<OrderStatus>().unwrap(), OrderStatus::Completed);
        assert!(matches!(
            "shipped".parse::<OrderStatus>(),
            Err(LedgerError::InvalidStatus(s)) if s == "shipped"
        ));
        assert_eq!(serde_json::to_string(&OrderStatus::Processing).unwrap(), "\"processing\"");
    }

    fn pending_order() -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(1),
            order_number: OrderNumber::new("ORD-20260101-ABCDEF12"),
            customer_id: "cust-1".into(),
            customer_name: "Ada".into(),
            status: OrderStatus::Pending,
            total_price: Money::from_cents(1000),
            pdf_url: None,
            created_at: now,
            updated_at: now,
            items: vec![],
        }
    }

    #[test]
    fn test_invoice_is_recorded_once() {
        let mut order = pending_order();
        let later = order.updated_at + chrono::Duration::seconds(5);

        assert!(order.apply_invoice("https://docs/a".into(), OrderStatus::Completed, later).unwrap());
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.pdf_url.as_deref(), Some("https://docs/a"));

        let snapshot = order.clone();
        let much_later = later + chrono::Duration::seconds(5);
        assert!(!order.apply_invoice("https://docs/b".into(), OrderStatus::Completed, much_later).unwrap());
        assert_eq!(order, snapshot);
    }

    #[test]
    fn test_status_update_keeps_existing_url() {
        let mut order = pending_order();
        order.pdf_url = Some("https://docs/a".into());
        let now = Utc::now();

        assert!(order.apply_status(OrderStatus::Processing, Some("https://docs/b".into()), now).unwrap());
        assert_eq!(order.pdf_url.as_deref(), Some("https://docs/a"));
        assert!(!order.apply_status(OrderStatus::Processing, None, now).unwrap());
    }

    #[test]
    fn test_status_update_rejects_going_backwards() {
        let mut order = pending_order();
        order.status = OrderStatus::Completed;
        let err = order.apply_status(OrderStatus::Pending, None, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransition { from: OrderStatus::Completed, to: OrderStatus::Pending }
        ));
    }

    #[test]
    fn test_new_order_total_is_sum_of_lines() {
        let order = NewOrder::new(
            "cust-1",
            "Ada",
            vec![
                NewOrderItem::new(snapshot(1, 1000), 2),
                NewOrderItem::new(snapshot(2, 250), 3),
            ],
        );
        assert_eq!(order.total_price(), Money::from_cents(2750));
        assert!(order.order_number.is_well_formed());
    }

    #[test]
    fn quantities_must_fit_the_ledger() {
        let ok = NewOrder::new("c1", "Ada", vec![NewOrderItem::new(snapshot(1, 1), MAX_QUANTITY)]);
        assert!(ok.check_quantities().is_ok());

        let too_big = NewOrder::new(
            "c1",
            "Ada",
            vec![
                NewOrderItem::new(snapshot(1, 1), 1),
                NewOrderItem::new(snapshot(2, 1), MAX_QUANTITY + 1),
            ],
        );
        assert!(matches!(
            too_big.check_quantities(),
            Err(LedgerError::InvalidQuantity { product_id, .. }) if product_id == ProductId::new(2)
        ));

        let zero = NewOrder::new("c1", "Ada", vec![NewOrderItem::new(snapshot(1, 1), 0)]);
        assert!(zero.check_quantities().is_err());
    }
}

//! The invoice job carried by the invoice queue.

use chrono::{DateTime, Utc};
use ledger::{Order, OrderItem};
use serde::{Deserialize, Serialize};

use crate::{Money, OrderId, OrderNumber, ProductId};

/// One line of an invoice job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub product_id: ProductId,
    pub product_code: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
}

impl From<&OrderItem> for InvoiceLine {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            product_code: item.product_code.clone(),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
        }
    }
}

/// Everything the worker needs to produce an invoice.
///
/// Built once from the persisted order and immutable afterwards; the queue
/// may deliver the same job more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceJob {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: String,
    pub customer_name: String,
    pub items: Vec<InvoiceLine>,
    pub total_price: Money,
    pub created_at: DateTime<Utc>,
}

impl InvoiceJob {
    /// Name of the stored document: `<order_number>.pdf`.
    pub fn document_name(&self) -> String {
        self.order_number.document_name()
    }

    /// Serializes the job as a queue message body.
    pub fn to_body(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a queue message body.
    pub fn from_body(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}

impl From<&Order> for InvoiceJob {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            customer_id: order.customer_id.clone(),
            customer_name: order.customer_name.clone(),
            items: order.items.iter().map(InvoiceLine::from).collect(),
            total_price: order.total_price,
            created_at: order.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::OrderStatus;

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(7),
            order_number: OrderNumber::new("ORD-20260101-1A2B3C4D"),
            customer_id: "cust-1".into(),
            customer_name: "Ada".into(),
            status: OrderStatus::Pending,
            total_price: Money::from_cents(3000),
            pdf_url: None,
            created_at: now,
            updated_at: now,
            items: vec![OrderItem {
                id: 1,
                product_id: ProductId::new(1),
                product_code: "PROD-001".into(),
                product_name: "Laptop".into(),
                quantity: 3,
                unit_price: Money::from_cents(1000),
                total_price: Money::from_cents(3000),
            }],
        }
    }

    #[test]
    fn test_job_copies_order_fields() {
        let job = InvoiceJob::from(&order());
        assert_eq!(job.order_id, OrderId::new(7));
        assert_eq!(job.items.len(), 1);
        assert_eq!(job.items[0].total_price, Money::from_cents(3000));
        assert_eq!(job.document_name(), "ORD-20260101-1A2B3C4D.pdf");
    }

    #[test]
    fn test_body_uses_flat_wire_fields() {
        let body = InvoiceJob::from(&order()).to_body().unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["order_id"], 7);
        assert_eq!(value["order_number"], "ORD-20260101-1A2B3C4D");
        assert_eq!(value["items"][0]["unit_price"], 1000);
        assert_eq!(value["total_price"], 3000);
    }

    #[test]
    fn test_garbage_body_does_not_parse() {
        assert!(InvoiceJob::from_body("{not json").is_err());
        assert!(InvoiceJob::from_body(r#"{"order_id": 1}"#).is_err());
    }
}

//! Catalog entities and the results of check/reserve/release.

use chrono::{DateTime, Utc};
use common::ProductSnapshot;
use serde::{Deserialize, Serialize};

use crate::{Money, ProductId, ReservationId};

/// A live catalog product.
///
/// `stock_quantity` never drops below zero and only changes through
/// reserve/release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub code: String,
    pub name: String,
    pub image_url: Option<String>,
    pub price: Money,
    pub stock_quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a new product with the given initial stock.
    pub fn new(
        id: impl Into<ProductId>,
        code: impl Into<String>,
        name: impl Into<String>,
        price: Money,
        stock_quantity: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            code: code.into(),
            name: name.into(),
            image_url: None,
            price,
            stock_quantity: stock_quantity.max(0),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the immutable snapshot an order line records.
    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot::new(self.id, self.code.clone(), self.name.clone(), self.price)
    }
}

/// Availability of one requested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAvailability {
    pub product_id: ProductId,
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub price: Option<Money>,
    pub requested_quantity: u32,
    pub available_quantity: Option<i64>,
    pub available: bool,
    pub reason: Option<String>,
}

impl LineAvailability {
    /// Line for a product the catalog does not know.
    pub fn not_found(product_id: ProductId, requested_quantity: u32) -> Self {
        Self {
            product_id,
            product_code: None,
            product_name: None,
            price: None,
            requested_quantity,
            available_quantity: None,
            available: false,
            reason: Some("Product not found".to_string()),
        }
    }

    /// Line evaluated against a product's current stock.
    pub fn for_product(product: &Product, requested_quantity: u32) -> Self {
        let available = product.stock_quantity >= i64::from(requested_quantity);
        Self {
            product_id: product.id,
            product_code: Some(product.code.clone()),
            product_name: Some(product.name.clone()),
            price: Some(product.price),
            requested_quantity,
            available_quantity: Some(product.stock_quantity),
            available,
            reason: (!available).then(|| {
                format!(
                    "Insufficient stock. Available: {}, Requested: {}",
                    product.stock_quantity, requested_quantity
                )
            }),
        }
    }

    /// Price/name snapshot for an available line.
    pub fn snapshot(&self) -> Option<ProductSnapshot> {
        match (&self.product_code, &self.product_name, self.price) {
            (Some(code), Some(name), Some(price)) => Some(ProductSnapshot::new(
                self.product_id,
                code.clone(),
                name.clone(),
                price,
            )),
            _ => None,
        }
    }
}

/// Result of a stock check. Advisory: may be stale by the time a
/// reservation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCheck {
    pub all_available: bool,
    pub items: Vec<LineAvailability>,
}

impl StockCheck {
    /// Builds a check result, deriving `all_available` from the lines.
    pub fn from_lines(items: Vec<LineAvailability>) -> Self {
        Self {
            all_available: items.iter().all(|i| i.available),
            items,
        }
    }

    /// Lines that cannot be satisfied.
    pub fn unavailable(&self) -> Vec<LineAvailability> {
        self.items.iter().filter(|i| !i.available).cloned().collect()
    }
}

/// One line of a committed reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedLine {
    pub product_id: ProductId,
    pub product_code: String,
    pub product_name: String,
    pub reserved_quantity: u32,
    pub remaining_stock: i64,
}

/// A committed all-or-nothing reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub products: Vec<ReservedLine>,
}

/// One line of a stock release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasedLine {
    pub product_id: ProductId,
    pub product_code: String,
    pub product_name: String,
    pub released_quantity: u32,
    pub new_stock: i64,
}

/// Result of a stock release.
///
/// `already_released` is set when the correlation ID had been released
/// before; in that case no stock changed and `products` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub reservation_id: Option<ReservationId>,
    pub already_released: bool,
    pub products: Vec<ReleasedLine>,
}

impl Release {
    /// A release that was skipped because its correlation ID was seen before.
    pub fn duplicate(reservation_id: ReservationId) -> Self {
        Self {
            reservation_id: Some(reservation_id),
            already_released: true,
            products: Vec::new(),
        }
    }
}

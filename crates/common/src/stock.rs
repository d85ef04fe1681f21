//! Reservation lines and product snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Money, ProductId};

/// Largest quantity a single line, or the merged lines of one product, may
/// carry. Order items store quantities in a 32-bit signed column.
pub const MAX_QUANTITY: u32 = i32::MAX as u32;

/// One `(product, quantity)` pair of a check/reserve/release request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl StockLine {
    /// Creates a new stock line.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }

    /// Merges lines naming the same product and orders them by ascending
    /// product id.
    ///
    /// Stores lock rows in this order, which keeps concurrent reservations
    /// over overlapping product sets deadlock-free.
    ///
    /// Returns `None` when a merged quantity would exceed [`MAX_QUANTITY`].
    pub fn merge(lines: &[StockLine]) -> Option<Vec<StockLine>> {
        let mut merged: BTreeMap<ProductId, u32> = BTreeMap::new();
        for line in lines {
            let quantity = merged.entry(line.product_id).or_default();
            *quantity = quantity
                .checked_add(line.quantity)
                .filter(|q| *q <= MAX_QUANTITY)?;
        }
        Some(
            merged
                .into_iter()
                .map(|(product_id, quantity)| StockLine {
                    product_id,
                    quantity,
                })
                .collect(),
        )
    }
}

/// Immutable copy of the catalog fields an order line needs.
///
/// Captured at stock-check time and stored on the order item, so later
/// catalog edits never alter historical orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub code: String,
    pub name: String,
    pub unit_price: Money,
}

impl ProductSnapshot {
    /// Creates a new snapshot.
    pub fn new(
        product_id: impl Into<ProductId>,
        code: impl Into<String>,
        name: impl Into<String>,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            code: code.into(),
            name: name.into(),
            unit_price,
        }
    }
}

//! Loads starting products from the JSON file named by `SEED_PRODUCTS_FILE`.
//!
//! The file holds an array of `{ "code", "name", "price_cents",
//! "stock_quantity" }` objects. The in-memory catalog numbers them from 1 in
//! file order; the PostgreSQL catalog is only seeded while it is empty.

use std::collections::HashSet;
use std::path::Path;

use catalog::{
    InMemoryInventoryStore, InventoryStore, Money, PostgresInventoryStore, Product, ProductId,
};
use serde::Deserialize;

use crate::error::StartupError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedProduct {
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    pub stock_quantity: i64,
}

/// Reads and checks a seed file.
pub async fn load(path: &Path) -> Result<Vec<SeedProduct>, StartupError> {
    let bytes = tokio::fs::read(path).await?;
    let products: Vec<SeedProduct> = serde_json::from_slice(&bytes)?;
    check(&products)?;
    Ok(products)
}

fn check(products: &[SeedProduct]) -> Result<(), StartupError> {
    let mut codes = HashSet::with_capacity(products.len());
    for product in products {
        if product.code.trim().is_empty() || product.name.trim().is_empty() {
            return Err(StartupError::Config(
                "seed products need a code and a name".to_string(),
            ));
        }
        if product.price_cents < 0 || product.stock_quantity < 0 {
            return Err(StartupError::Config(format!(
                "seed product {} has a negative price or stock",
                product.code
            )));
        }
        if !codes.insert(product.code.as_str()) {
            return Err(StartupError::Config(format!(
                "seed product code {} appears twice",
                product.code
            )));
        }
    }
    Ok(())
}

/// Builds an in-memory catalog holding `products`.
pub fn into_memory(products: &[SeedProduct]) -> InMemoryInventoryStore {
    InMemoryInventoryStore::with_products((1..).zip(products).map(|(id, seed)| {
        Product::new(
            ProductId::new(id),
            seed.code.as_str(),
            seed.name.as_str(),
            Money::from_cents(seed.price_cents),
            seed.stock_quantity,
        )
    }))
}

/// Inserts `products` when the catalog has none yet. Returns how many were
/// inserted.
pub async fn into_postgres(
    store: &PostgresInventoryStore,
    products: &[SeedProduct],
) -> Result<usize, StartupError> {
    if products.is_empty() || !store.list_products().await?.is_empty() {
        return Ok(0);
    }
    for seed in products {
        store
            .insert_product(
                &seed.code,
                &seed.name,
                Money::from_cents(seed.price_cents),
                seed.stock_quantity,
            )
            .await?;
    }
    Ok(products.len())
}

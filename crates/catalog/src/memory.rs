use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    CatalogError, InventoryStore, LineAvailability, Product, ProductId, Release, ReleasedLine,
    Reservation, ReservationId, ReservedLine, Result, StockCheck, StockLine, merge_lines,
    validate_lines,
};

/// In-memory inventory store.
///
/// Each product sits behind its own mutex. Reservations lock the mutexes of
/// every referenced product in ascending id order and hold them all while
/// validating and decrementing, which gives the same per-product
/// serializability as `SELECT ... FOR UPDATE` in the PostgreSQL store.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    products: Arc<RwLock<BTreeMap<ProductId, Arc<Mutex<Product>>>>>,
    releases: Arc<Mutex<HashSet<ReservationId>>>,
    unavailable: Arc<AtomicBool>,
    fail_on_release: Arc<AtomicBool>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given products.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let map = products
            .into_iter()
            .map(|p| (p.id, Arc::new(Mutex::new(p))))
            .collect();
        Self {
            products: Arc::new(RwLock::new(map)),
            ..Self::default()
        }
    }

    /// Inserts or replaces a product.
    pub async fn insert_product(&self, product: Product) {
        self.products
            .write()
            .await
            .insert(product.id, Arc::new(Mutex::new(product)));
    }

    /// Returns the current stock of a product.
    pub async fn stock_of(&self, id: ProductId) -> Option<i64> {
        let handle = self.products.read().await.get(&id).cloned()?;
        let product = handle.lock().await;
        Some(product.stock_quantity)
    }

    /// Simulates an outage: every operation fails with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Configures release calls to fail with `Unavailable`.
    pub fn set_fail_on_release(&self, fail: bool) {
        self.fail_on_release.store(fail, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable(
                "inventory store unavailable".to_string(),
            ));
        }
        Ok(())
    }

    /// Locks the given products in ascending id order.
    ///
    /// `lines` must already be merged and sorted. A product that does not
    /// exist pairs with `None`, so callers can report failures in id order.
    async fn lock_in_order(
        &self,
        lines: &[StockLine],
    ) -> Vec<(StockLine, Option<OwnedMutexGuard<Product>>)> {
        let handles: Vec<_> = {
            let products = self.products.read().await;
            lines
                .iter()
                .map(|line| (*line, products.get(&line.product_id).cloned()))
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for (line, handle) in handles {
            let guard = match handle {
                Some(handle) => Some(handle.lock_owned().await),
                None => None,
            };
            guards.push((line, guard));
        }
        guards
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn check_stock(&self, lines: &[StockLine]) -> Result<StockCheck> {
        self.ensure_available()?;
        validate_lines(lines)?;

        let products = self.products.read().await;
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let item = match products.get(&line.product_id) {
                Some(handle) => LineAvailability::for_product(&*handle.lock().await, line.quantity),
                None => LineAvailability::not_found(line.product_id, line.quantity),
            };
            items.push(item);
        }

        Ok(StockCheck::from_lines(items))
    }

    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn reserve_stock(
        &self,
        reservation_id: ReservationId,
        lines: &[StockLine],
    ) -> Result<Reservation> {
        self.ensure_available()?;

        let merged = merge_lines(lines)?;
        let guards = self.lock_in_order(&merged).await;

        // Validate everything before touching anything
        let mut locked = Vec::with_capacity(guards.len());
        for (line, product) in guards {
            let Some(product) = product else {
                metrics::counter!("stock_reservations_rejected_total").increment(1);
                return Err(CatalogError::ProductNotFound(line.product_id));
            };
            if product.stock_quantity < i64::from(line.quantity) {
                metrics::counter!("stock_reservations_rejected_total").increment(1);
                return Err(CatalogError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available: product.stock_quantity,
                });
            }
            locked.push((line, product));
        }

        let now = Utc::now();
        let products = locked
            .iter_mut()
            .map(|(line, product)| {
                product.stock_quantity -= i64::from(line.quantity);
                product.updated_at = now;
                ReservedLine {
                    product_id: product.id,
                    product_code: product.code.clone(),
                    product_name: product.name.clone(),
                    reserved_quantity: line.quantity,
                    remaining_stock: product.stock_quantity,
                }
            })
            .collect();

        metrics::counter!("stock_reservations_total").increment(1);
        tracing::debug!(%reservation_id, "stock reserved");

        Ok(Reservation {
            reservation_id,
            products,
        })
    }

    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn release_stock(
        &self,
        reservation_id: Option<ReservationId>,
        lines: &[StockLine],
    ) -> Result<Release> {
        self.ensure_available()?;
        if self.fail_on_release.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable(
                "release rejected by simulated outage".to_string(),
            ));
        }
        let merged = merge_lines(lines)?;

        // Held for the whole release so check-and-record is atomic per ID
        let mut released_ids = self.releases.lock().await;
        if let Some(id) = reservation_id
            && released_ids.contains(&id)
        {
            tracing::info!(reservation_id = %id, "duplicate release ignored");
            return Ok(Release::duplicate(id));
        }

        let handles: Vec<_> = {
            let products = self.products.read().await;
            merged
                .iter()
                .filter_map(|line| {
                    products
                        .get(&line.product_id)
                        .cloned()
                        .map(|handle| (*line, handle))
                })
                .collect()
        };

        let now = Utc::now();
        let mut released = Vec::with_capacity(handles.len());
        for (line, handle) in handles {
            let mut product = handle.lock().await;
            product.stock_quantity += i64::from(line.quantity);
            product.updated_at = now;
            released.push(ReleasedLine {
                product_id: product.id,
                product_code: product.code.clone(),
                product_name: product.name.clone(),
                released_quantity: line.quantity,
                new_stock: product.stock_quantity,
            });
        }

        if let Some(id) = reservation_id {
            released_ids.insert(id);
        }

        metrics::counter!("stock_releases_total").increment(1);

        Ok(Release {
            reservation_id,
            already_released: false,
            products: released,
        })
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        self.ensure_available()?;
        let Some(handle) = self.products.read().await.get(&id).cloned() else {
            return Ok(None);
        };
        let product = handle.lock().await.clone();
        Ok(Some(product))
    }

    async fn get_product_by_code(&self, code: &str) -> Result<Option<Product>> {
        self.ensure_available()?;
        for handle in self.products.read().await.values() {
            let product = handle.lock().await;
            if product.code == code {
                return Ok(Some(product.clone()));
            }
        }
        Ok(None)
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        self.ensure_available()?;
        let products = self.products.read().await;
        let mut result = Vec::with_capacity(products.len());
        for handle in products.values() {
            result.push(handle.lock().await.clone());
        }
        Ok(result)
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    CatalogError, InventoryStore, LineAvailability, Money, Product, ProductId, Release,
    ReleasedLine, Reservation, ReservationId, ReservedLine, Result, StockCheck, StockLine,
    merge_lines, validate_lines,
};

const PRODUCT_COLUMNS: &str =
    "id, code, name, image_url, price_cents, stock_quantity, created_at, updated_at";

/// PostgreSQL-backed inventory store.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL inventory store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the catalog migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        let mut migrator = sqlx::migrate!("../../migrations/catalog");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await?;
        Ok(())
    }

    /// Inserts a product and returns it with its assigned ID.
    ///
    /// Catalog maintenance lives outside the saga; this exists for seeding.
    pub async fn insert_product(
        &self,
        code: &str,
        name: &str,
        price: Money,
        stock_quantity: i64,
    ) -> Result<Product> {
        let row = sqlx::query(&format!(
            "INSERT INTO products (code, name, price_cents, stock_quantity) \
             VALUES ($1, $2, $3, $4) RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(code)
        .bind(name)
        .bind(price.cents())
        .bind(stock_quantity)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            image_url: row.try_get("image_url")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock_quantity: row.try_get("stock_quantity")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn product_ids(lines: &[StockLine]) -> Vec<i64> {
        lines.iter().map(|l| l.product_id.as_i64()).collect()
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn check_stock(&self, lines: &[StockLine]) -> Result<StockCheck> {
        validate_lines(lines)?;

        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(Self::product_ids(lines))
        .fetch_all(&self.pool)
        .await?;

        let products: HashMap<ProductId, Product> = rows
            .into_iter()
            .map(|row| Self::row_to_product(row).map(|p| (p.id, p)))
            .collect::<Result<_>>()?;

        let items = lines
            .iter()
            .map(|line| match products.get(&line.product_id) {
                Some(product) => LineAvailability::for_product(product, line.quantity),
                None => LineAvailability::not_found(line.product_id, line.quantity),
            })
            .collect();

        Ok(StockCheck::from_lines(items))
    }

    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn reserve_stock(
        &self,
        reservation_id: ReservationId,
        lines: &[StockLine],
    ) -> Result<Reservation> {
        let merged = merge_lines(lines)?;

        let mut tx = self.pool.begin().await?;

        // Row locks are taken in ascending id order
        let rows = sqlx::query(
            r#"
            SELECT id, stock_quantity
            FROM products
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(Self::product_ids(&merged))
        .fetch_all(&mut *tx)
        .await?;

        let mut locked: HashMap<i64, i64> = HashMap::with_capacity(rows.len());
        for row in rows {
            locked.insert(row.try_get("id")?, row.try_get("stock_quantity")?);
        }

        // Dropping `tx` on an early return rolls back and releases the locks
        for line in &merged {
            let Some(&stock) = locked.get(&line.product_id.as_i64()) else {
                metrics::counter!("stock_reservations_rejected_total").increment(1);
                return Err(CatalogError::ProductNotFound(line.product_id));
            };
            if stock < i64::from(line.quantity) {
                metrics::counter!("stock_reservations_rejected_total").increment(1);
                return Err(CatalogError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available: stock,
                });
            }
        }

        let mut products = Vec::with_capacity(merged.len());
        for line in &merged {
            let row = sqlx::query(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity - $1, updated_at = NOW()
                WHERE id = $2
                RETURNING id, code, name, stock_quantity
                "#,
            )
            .bind(i64::from(line.quantity))
            .bind(line.product_id.as_i64())
            .fetch_one(&mut *tx)
            .await?;

            products.push(ReservedLine {
                product_id: ProductId::new(row.try_get("id")?),
                product_code: row.try_get("code")?,
                product_name: row.try_get("name")?,
                reserved_quantity: line.quantity,
                remaining_stock: row.try_get("stock_quantity")?,
            });
        }

        tx.commit().await?;

        metrics::counter!("stock_reservations_total").increment(1);
        tracing::info!(%reservation_id, products = products.len(), "stock reserved");

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
        let merged = merge_lines(lines)?;

        let mut tx = self.pool.begin().await?;

        if let Some(id) = reservation_id {
            let recorded = sqlx::query(
                "INSERT INTO stock_releases (reservation_id) VALUES ($1) ON CONFLICT DO NOTHING",
            )
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

            if recorded.rows_affected() == 0 {
                tracing::info!(reservation_id = %id, "duplicate release ignored");
                return Ok(Release::duplicate(id));
            }
        }

        let mut released = Vec::with_capacity(merged.len());
        for line in &merged {
            let row = sqlx::query(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity + $1, updated_at = NOW()
                WHERE id = $2
                RETURNING id, code, name, stock_quantity
                "#,
            )
            .bind(i64::from(line.quantity))
            .bind(line.product_id.as_i64())
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = row {
                released.push(ReleasedLine {
                    product_id: ProductId::new(row.try_get("id")?),
                    product_code: row.try_get("code")?,
                    product_name: row.try_get("name")?,
                    released_quantity: line.quantity,
                    new_stock: row.try_get("stock_quantity")?,
                });
            }
        }

        tx.commit().await?;

        metrics::counter!("stock_releases_total").increment(1);
        tracing::info!(products = released.len(), "stock released");

        Ok(Release {
            reservation_id,
            already_released: false,
            products: released,
        })
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn get_product_by_code(&self, code: &str) -> Result<Option<Product>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }
}

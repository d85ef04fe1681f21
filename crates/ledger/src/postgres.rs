use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    LedgerError, Money, NewOrder, Order, OrderId, OrderItem, OrderLedger, OrderNumber,
    OrderStatus, ProductId, Result,
};

const ORDER_COLUMNS: &str = "id, order_number, customer_id, customer_name, status, \
     total_price_cents, pdf_url, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, product_code, product_name, quantity, \
     unit_price_cents, total_price_cents";

/// PostgreSQL-backed order ledger.
#[derive(Clone)]
pub struct PostgresOrderLedger {
    pool: PgPool,
}

impl PostgresOrderLedger {
    /// Creates a new PostgreSQL order ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the order ledger migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        let mut migrator = sqlx::migrate!("../../migrations/orders");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            order_number: OrderNumber::new(row.try_get::<String, _>("order_number")?),
            customer_id: row.try_get("customer_id")?,
            customer_name: row.try_get("customer_name")?,
            status: status.parse()?,
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            pdf_url: row.try_get("pdf_url")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            items: Vec::new(),
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let quantity: i32 = row.try_get("quantity")?;
        let product_id = ProductId::new(row.try_get("product_id")?);
        let quantity = u32::try_from(quantity).map_err(|_| {
            LedgerError::Corrupted(format!(
                "order item for product {product_id} has quantity {quantity}"
            ))
        })?;
        Ok(OrderItem {
            id: row.try_get("id")?,
            product_id,
            product_code: row.try_get("product_code")?,
            product_name: row.try_get("product_name")?,
            quantity,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
        })
    }

    /// Loads the items of the given orders and attaches them.
    async fn attach_items<'e, E>(executor: E, orders: &mut [Order]) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        if orders.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = orders.iter().map(|o| o.id.as_i64()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(executor)
        .await?;

        let mut by_order: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let order_id: i64 = row.try_get("order_id")?;
            by_order
                .entry(order_id)
                .or_default()
                .push(Self::row_to_item(row)?);
        }

        for order in orders.iter_mut() {
            order.items = by_order.remove(&order.id.as_i64()).unwrap_or_default();
        }
        Ok(())
    }

    /// Locks an order row for the rest of the transaction.
    async fn lock_order(tx: &mut Transaction<'_, Postgres>, id: OrderId) -> Result<Order> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_i64())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(LedgerError::OrderNotFound(id))?;

        let mut orders = vec![Self::row_to_order(&row)?];
        Self::attach_items(&mut **tx, &mut orders).await?;
        orders.pop().ok_or(LedgerError::OrderNotFound(id))
    }

    /// Persists status and URL; the stored timestamp is read back so the
    /// returned order matches what a later load sees.
    async fn write_status(tx: &mut Transaction<'_, Postgres>, order: &mut Order) -> Result<()> {
        let row = sqlx::query(
            "UPDATE orders SET status = $2, pdf_url = $3, updated_at = $4 \
             WHERE id = $1 RETURNING updated_at",
        )
        .bind(order.id.as_i64())
        .bind(order.status.as_str())
        .bind(order.pdf_url.as_deref())
        .bind(order.updated_at)
        .fetch_one(&mut **tx)
        .await?;
        order.updated_at = row.try_get("updated_at")?;
        Ok(())
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
    }
}

#[async_trait]
impl OrderLedger for PostgresOrderLedger {
    #[tracing::instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        order.check_quantities()?;
        let total_price = order.total_price();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(&format!(
            "INSERT INTO orders (order_number, customer_id, customer_name, status, total_price_cents) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.order_number.as_str())
        .bind(&order.customer_id)
        .bind(&order.customer_name)
        .bind(OrderStatus::Pending.as_str())
        .bind(total_price.cents())
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) if Self::is_unique_violation(&e) => {
                return Err(LedgerError::DuplicateOrderNumber(
                    order.order_number.to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        let mut stored = Self::row_to_order(&row)?;

        for item in &order.items {
            let quantity =
                i32::try_from(item.quantity).map_err(|_| LedgerError::InvalidQuantity {
                    product_id: item.product.product_id,
                    quantity: item.quantity,
                })?;
            let row = sqlx::query(&format!(
                "INSERT INTO order_items \
                 (order_id, product_id, product_code, product_name, quantity, unit_price_cents, total_price_cents) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {ITEM_COLUMNS}"
            ))
            .bind(stored.id.as_i64())
            .bind(item.product.product_id.as_i64())
            .bind(&item.product.code)
            .bind(&item.product.name)
            .bind(quantity)
            .bind(item.product.unit_price.cents())
            .bind(item.total_price().cents())
            .fetch_one(&mut *tx)
            .await?;
            stored.items.push(Self::row_to_item(&row)?);
        }

        // Dropping `tx` on any early return rolls the whole order back
        tx.commit().await?;

        tracing::debug!(order_id = %stored.id, "order stored");
        Ok(stored)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut orders = vec![Self::row_to_order(&row)?];
        Self::attach_items(&self.pool, &mut orders).await?;
        Ok(orders.pop())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        Self::attach_items(&self.pool, &mut orders).await?;
        Ok(orders)
    }

    #[tracing::instrument(skip(self, pdf_url))]
    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        pdf_url: Option<String>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = Self::lock_order(&mut tx, id).await?;

        if order.apply_status(status, pdf_url, Utc::now())? {
            Self::write_status(&mut tx, &mut order).await?;
        }
        tx.commit().await?;
        Ok(order)
    }

    #[tracing::instrument(skip(self, pdf_url))]
    async fn update_invoice(
        &self,
        id: OrderId,
        pdf_url: String,
        status: OrderStatus,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = Self::lock_order(&mut tx, id).await?;

        if order.apply_invoice(pdf_url, status, Utc::now())? {
            Self::write_status(&mut tx, &mut order).await?;
        } else {
            tracing::info!(order_id = %id, "invoice already recorded");
        }
        tx.commit().await?;
        Ok(order)
    }
}

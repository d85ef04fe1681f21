use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::QueueError;
use crate::services::queue::{DeadLetter, InvoiceQueue, QueueMessage};

/// PostgreSQL-backed invoice queue.
///
/// Receivers lease the oldest visible row with `FOR UPDATE SKIP LOCKED`, so
/// concurrent workers never receive the same lease.
#[derive(Clone)]
pub struct PostgresInvoiceQueue {
    pool: PgPool,
    queue_name: String,
}

impl PostgresInvoiceQueue {
    /// Creates a queue handle for the named channel.
    pub fn new(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Runs the queue migrations.
    pub async fn run_migrations(&self) -> Result<(), QueueError> {
        let mut migrator = sqlx::migrate!("../../migrations/queue");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await?;
        Ok(())
    }

    /// Messages moved to the dead-letter table, oldest first.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, QueueError> {
        let rows = sqlx::query(
            r#"
            SELECT id, body, dequeue_count, reason, dead_lettered_at
            FROM invoice_queue_dead_letter
            WHERE queue_name = $1
            ORDER BY id
            "#,
        )
        .bind(&self.queue_name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DeadLetter {
                    id: row.try_get("id")?,
                    body: row.try_get("body")?,
                    dequeue_count: Self::dequeue_count(row)?,
                    reason: row.try_get("reason")?,
                    dead_lettered_at: row.try_get("dead_lettered_at")?,
                })
            })
            .collect()
    }

    fn dequeue_count(row: &PgRow) -> Result<u32, QueueError> {
        let count: i32 = row.try_get("dequeue_count")?;
        Ok(u32::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl InvoiceQueue for PostgresInvoiceQueue {
    async fn send(&self, body: String) -> Result<i64, QueueError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO invoice_queue (queue_name, body) VALUES ($1, $2) RETURNING id",
        )
        .bind(&self.queue_name)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn receive(
        &self,
        visibility_timeout: Duration,
    ) -> Result<Option<QueueMessage>, QueueError> {
        let receipt = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            UPDATE invoice_queue
            SET visible_at = NOW() + make_interval(secs => $2),
                dequeue_count = dequeue_count + 1,
                pop_receipt = $3
            WHERE id = (
                SELECT id
                FROM invoice_queue
                WHERE queue_name = $1 AND visible_at <= NOW()
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, body, enqueued_at, dequeue_count
            "#,
        )
        .bind(&self.queue_name)
        .bind(visibility_timeout.as_secs_f64())
        .bind(receipt)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(QueueMessage {
                id: row.try_get("id")?,
                body: row.try_get("body")?,
                pop_receipt: receipt,
                dequeue_count: Self::dequeue_count(&row)?,
                enqueued_at: row.try_get("enqueued_at")?,
            })
        })
        .transpose()
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let result = sqlx::query("DELETE FROM invoice_queue WHERE id = $1 AND pop_receipt = $2")
            .bind(message.id)
            .bind(message.pop_receipt)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::ReceiptMismatch {
                message_id: message.id,
            });
        }
        Ok(())
    }

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<(), QueueError> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            r#"
            WITH removed AS (
                DELETE FROM invoice_queue
                WHERE id = $1 AND pop_receipt = $2
                RETURNING id, queue_name, body, enqueued_at, dequeue_count
            )
            INSERT INTO invoice_queue_dead_letter
                (id, queue_name, body, enqueued_at, dequeue_count, reason)
            SELECT id, queue_name, body, enqueued_at, dequeue_count, $3
            FROM removed
            "#,
        )
        .bind(message.id)
        .bind(message.pop_receipt)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            return Err(QueueError::ReceiptMismatch {
                message_id: message.id,
            });
        }

        tx.commit().await?;
        Ok(())
    }
}

//! Invoice queue: at-least-once delivery with a visibility timeout.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::QueueError;

/// A leased message.
///
/// Only the holder of the latest `pop_receipt` may delete the message. Once
/// the visibility timeout lapses the message is leased again with a new
/// receipt and a higher `dequeue_count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: i64,
    pub body: String,
    pub pop_receipt: Uuid,
    pub dequeue_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// A message removed from the live queue after repeated failed deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadLetter {
    pub id: i64,
    pub body: String,
    pub dequeue_count: u32,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// A durable at-least-once channel of invoice jobs.
#[async_trait]
pub trait InvoiceQueue: Send + Sync {
    /// Appends a message and returns its ID.
    async fn send(&self, body: String) -> Result<i64, QueueError>;

    /// Leases the oldest visible message, hiding it for `visibility_timeout`.
    async fn receive(&self, visibility_timeout: Duration)
    -> Result<Option<QueueMessage>, QueueError>;

    /// Deletes a leased message. Fails with `ReceiptMismatch` if the lease
    /// has since passed to another consumer.
    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Moves a leased message to the dead-letter store.
    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<(), QueueError>;
}

#[async_trait]
impl<T: InvoiceQueue + ?Sized> InvoiceQueue for Arc<T> {
    async fn send(&self, body: String) -> Result<i64, QueueError> {
        (**self).send(body).await
    }

    async fn receive(
        &self,
        visibility_timeout: Duration,
    ) -> Result<Option<QueueMessage>, QueueError> {
        (**self).receive(visibility_timeout).await
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        (**self).delete(message).await
    }

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<(), QueueError> {
        (**self).dead_letter(message, reason).await
    }
}

#[derive(Debug)]
struct Entry {
    id: i64,
    body: String,
    enqueued_at: DateTime<Utc>,
    visible_at: Instant,
    dequeue_count: u32,
    pop_receipt: Option<Uuid>,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<Entry>,
    dead_letters: Vec<DeadLetter>,
    next_id: i64,
}

impl QueueState {
    fn leased_index(&self, message: &QueueMessage) -> Result<usize, QueueError> {
        self.messages
            .iter()
            .position(|e| e.id == message.id && e.pop_receipt == Some(message.pop_receipt))
            .ok_or(QueueError::ReceiptMismatch {
                message_id: message.id,
            })
    }
}

/// In-memory invoice queue.
///
/// Visibility uses the tokio clock, so tests can pause and advance time.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInvoiceQueue {
    state: Arc<Mutex<QueueState>>,
    fail_on_send: Arc<AtomicBool>,
}

impl InMemoryInvoiceQueue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures `send` to fail with `Unavailable`.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.fail_on_send.store(fail, Ordering::SeqCst);
    }

    /// Number of live messages, leased or not.
    pub async fn len(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    /// Returns true if no live message is left.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.messages.is_empty()
    }

    /// Bodies of all live messages in queue order.
    pub async fn bodies(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .messages
            .iter()
            .map(|e| e.body.clone())
            .collect()
    }

    /// Messages moved to the dead-letter store.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.clone()
    }
}

#[async_trait]
impl InvoiceQueue for InMemoryInvoiceQueue {
    async fn send(&self, body: String) -> Result<i64, QueueError> {
        if self.fail_on_send.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable(
                "queue rejected message by simulated outage".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.messages.push_back(Entry {
            id,
            body,
            enqueued_at: Utc::now(),
            visible_at: Instant::now(),
            dequeue_count: 0,
            pop_receipt: None,
        });
        Ok(id)
    }

    async fn receive(
        &self,
        visibility_timeout: Duration,
    ) -> Result<Option<QueueMessage>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let Some(entry) = state.messages.iter_mut().find(|e| e.visible_at <= now) else {
            return Ok(None);
        };

        let receipt = Uuid::new_v4();
        entry.visible_at = now + visibility_timeout;
        entry.dequeue_count += 1;
        entry.pop_receipt = Some(receipt);

        Ok(Some(QueueMessage {
            id: entry.id,
            body: entry.body.clone(),
            pop_receipt: receipt,
            dequeue_count: entry.dequeue_count,
            enqueued_at: entry.enqueued_at,
        }))
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let index = state.leased_index(message)?;
        state.messages.remove(index);
        Ok(())
    }

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let index = state.leased_index(message)?;
        if let Some(entry) = state.messages.remove(index) {
            state.dead_letters.push(DeadLetter {
                id: entry.id,
                body: entry.body,
                dequeue_count: entry.dequeue_count,
                reason: reason.to_string(),
                dead_lettered_at: Utc::now(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VISIBILITY: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn empty_queue_returns_none() {
        let queue = InMemoryInvoiceQueue::new();
        assert!(queue.receive(VISIBILITY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn messages_are_delivered_in_order() {
        let queue = InMemoryInvoiceQueue::new();
        queue.send("a".into()).await.unwrap();
        queue.send("b".into()).await.unwrap();

        let first = queue.receive(VISIBILITY).await.unwrap().unwrap();
        let second = queue.receive(VISIBILITY).await.unwrap().unwrap();
        assert_eq!(first.body, "a");
        assert_eq!(second.body, "b");
        assert!(queue.receive(VISIBILITY).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn leased_message_reappears_after_visibility_timeout() {
        let queue = InMemoryInvoiceQueue::new();
        queue.send("job".into()).await.unwrap();

        let first = queue.receive(VISIBILITY).await.unwrap().unwrap();
        assert_eq!(first.dequeue_count, 1);
        assert!(queue.receive(VISIBILITY).await.unwrap().is_none());

        tokio::time::advance(VISIBILITY + Duration::from_millis(1)).await;

        let second = queue.receive(VISIBILITY).await.unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.dequeue_count, 2);
        assert_ne!(second.pop_receipt, first.pop_receipt);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_receipt_cannot_delete() {
        let queue = InMemoryInvoiceQueue::new();
        queue.send("job".into()).await.unwrap();

        let stale = queue.receive(VISIBILITY).await.unwrap().unwrap();
        tokio::time::advance(VISIBILITY + Duration::from_millis(1)).await;
        let fresh = queue.receive(VISIBILITY).await.unwrap().unwrap();

        let err = queue.delete(&stale).await.unwrap_err();
        assert!(matches!(err, QueueError::ReceiptMismatch { message_id } if message_id == stale.id));

        queue.delete(&fresh).await.unwrap();
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn dead_letter_moves_message_out_of_the_queue() {
        let queue = InMemoryInvoiceQueue::new();
        queue.send("garbage".into()).await.unwrap();

        let message = queue.receive(VISIBILITY).await.unwrap().unwrap();
        queue.dead_letter(&message, "undecodable").await.unwrap();

        assert!(queue.is_empty().await);
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body, "garbage");
        assert_eq!(dead[0].reason, "undecodable");
    }

    #[tokio::test]
    async fn failing_send_keeps_queue_empty() {
        let queue = InMemoryInvoiceQueue::new();
        queue.set_fail_on_send(true);
        assert!(matches!(
            queue.send("job".into()).await,
            Err(QueueError::Unavailable(_))
        ));
        assert!(queue.is_empty().await);
    }
}

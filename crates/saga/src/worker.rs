//! Invoice worker: turns queued invoice jobs into stored documents and
//! completed orders.

use std::time::Duration;

use tokio::sync::watch;
use tracing::Instrument;

use crate::error::{QueueError, WorkerError};
use crate::services::{DocumentRenderer, DocumentStore, InvoiceCallback, InvoiceQueue, QueueMessage};
use crate::{InvoiceJob, OrderId};

/// Worker tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
    /// How long a received message stays hidden from other consumers.
    pub visibility_timeout: Duration,
    /// Deliveries after which an undecodable message is dead-lettered.
    pub max_deliveries: u32,
    /// Lifetime of generated document URLs.
    pub url_ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            visibility_timeout: Duration::from_secs(30),
            max_deliveries: 5,
            url_ttl: Duration::from_secs(365 * 24 * 60 * 60),
        }
    }
}

/// What one poll of the queue did.
#[derive(Debug)]
pub enum PollOutcome {
    /// The queue had no visible message.
    Idle,
    /// The job was processed and its message deleted.
    Completed { order_id: OrderId, pdf_url: String },
    /// Processing failed; the message stays and is redelivered once its
    /// visibility timeout lapses.
    Retained { message_id: i64, error: WorkerError },
    /// The message could not be decoded too many times and was removed.
    DeadLettered { message_id: i64 },
}

/// Consumes invoice jobs one at a time.
///
/// Every step before the message delete is idempotent (same document name,
/// write-once completion), so a redelivered job converges to the same
/// order state.
pub struct InvoiceWorker<Q, R, D, C>
where
    Q: InvoiceQueue,
    R: DocumentRenderer,
    D: DocumentStore,
    C: InvoiceCallback,
{
    queue: Q,
    renderer: R,
    documents: D,
    callback: C,
    config: WorkerConfig,
}

impl<Q, R, D, C> InvoiceWorker<Q, R, D, C>
where
    Q: InvoiceQueue,
    R: DocumentRenderer,
    D: DocumentStore,
    C: InvoiceCallback,
{
    pub fn new(queue: Q, renderer: R, documents: D, callback: C, config: WorkerConfig) -> Self {
        Self {
            queue,
            renderer,
            documents,
            callback,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Receives at most one message and processes it.
    ///
    /// Only a failure to talk to the queue itself is returned as an error;
    /// job failures are reported as [`PollOutcome::Retained`].
    pub async fn process_next(&self) -> Result<PollOutcome, WorkerError> {
        let Some(message) = self.queue.receive(self.config.visibility_timeout).await? else {
            return Ok(PollOutcome::Idle);
        };

        let job = match InvoiceJob::from_body(&message.body) {
            Ok(job) => job,
            Err(e) => return self.reject_undecodable(&message, e).await,
        };

        let span = tracing::info_span!(
            "invoice_job",
            message_id = message.id,
            order_id = %job.order_id,
            order_number = %job.order_number,
            dequeue_count = message.dequeue_count,
        );
        self.process_job(&message, job).instrument(span).await
    }

    async fn process_job(
        &self,
        message: &QueueMessage,
        job: InvoiceJob,
    ) -> Result<PollOutcome, WorkerError> {
        match self.handle(&job).await {
            Ok(pdf_url) => {
                self.acknowledge(message).await?;
                metrics::counter!("invoice_jobs_processed_total").increment(1);
                tracing::info!("invoice job completed");
                Ok(PollOutcome::Completed {
                    order_id: job.order_id,
                    pdf_url,
                })
            }
            Err(error) => {
                metrics::counter!("invoice_jobs_failed_total", "kind" => error.kind())
                    .increment(1);
                tracing::warn!(%error, "invoice job failed, leaving message for redelivery");
                Ok(PollOutcome::Retained {
                    message_id: message.id,
                    error,
                })
            }
        }
    }

    /// Polls until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            visibility_timeout_secs = self.config.visibility_timeout.as_secs(),
            "invoice worker started"
        );

        while !*shutdown.borrow() {
            let idle = match self.process_next().await {
                Ok(PollOutcome::Idle) => true,
                Ok(_) => false,
                Err(e) => {
                    tracing::error!(error = %e, "failed to poll invoice queue");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("invoice worker stopped");
    }

    /// Render, store, sign, complete. Returns the document URL.
    async fn handle(&self, job: &InvoiceJob) -> Result<String, WorkerError> {
        let bytes = self.renderer.render(job).map_err(WorkerError::Render)?;

        let name = job.document_name();
        self.documents
            .put(&name, bytes, self.renderer.content_type())
            .await
            .map_err(WorkerError::DocumentStore)?;

        let pdf_url = self
            .documents
            .read_url(&name, self.config.url_ttl)
            .await
            .map_err(WorkerError::DocumentStore)?;

        let order = self.callback.complete(job.order_id, &pdf_url).await?;
        tracing::debug!(status = %order.status, "completion recorded");

        Ok(pdf_url)
    }

    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), WorkerError> {
        match self.queue.delete(message).await {
            Ok(()) => Ok(()),
            // Another consumer holds the lease now; it will find the order
            // already completed
            Err(QueueError::ReceiptMismatch { message_id }) => {
                tracing::warn!(message_id, "lease expired before delete");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reject_undecodable(
        &self,
        message: &QueueMessage,
        error: serde_json::Error,
    ) -> Result<PollOutcome, WorkerError> {
        metrics::counter!("invoice_jobs_failed_total", "kind" => "decode").increment(1);

        if message.dequeue_count >= self.config.max_deliveries {
            self.queue
                .dead_letter(message, &format!("undecodable invoice job: {error}"))
                .await?;
            metrics::counter!("invoice_jobs_dead_lettered_total").increment(1);
            tracing::error!(
                message_id = message.id,
                dequeue_count = message.dequeue_count,
                %error,
                "undecodable invoice job dead-lettered"
            );
            return Ok(PollOutcome::DeadLettered {
                message_id: message.id,
            });
        }

        tracing::error!(
            message_id = message.id,
            dequeue_count = message.dequeue_count,
            %error,
            "failed to decode invoice job"
        );
        Ok(PollOutcome::Retained {
            message_id: message.id,
            error: WorkerError::Decode(error),
        })
    }
}

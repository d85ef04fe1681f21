//! Order creation saga and invoice processing.
//!
//! Placing an order spans three independently owned stores with no shared
//! transaction:
//! 1. Check and reserve stock in the catalog
//! 2. Persist the order in the order ledger
//! 3. Enqueue an invoice job
//!
//! If persisting fails, the reservation is released. A failed enqueue
//! leaves the order in place and is reported as a warning.
//!
//! The [`InvoiceWorker`] consumes the queue at least once, stores a
//! document per order and reports completion back idempotently.

pub mod coordinator;
pub mod error;
pub mod job;
pub mod services;
pub mod state;
pub mod worker;

pub use common::{MAX_QUANTITY, Money, OrderId, OrderNumber, ProductId, ReservationId, StockLine};
pub use coordinator::{Compensation, OrderOrchestrator, OrderPlacement, PlaceOrder, PlaceOrderItem};
pub use error::{CallbackError, DocumentError, OrderError, PublishWarning, QueueError, WorkerError};
pub use job::{InvoiceJob, InvoiceLine};
pub use services::{
    CatalogErrorBody, CatalogGateway, DeadLetter, DocumentRenderer, DocumentStore,
    FilesystemDocumentStore, HttpCatalogGateway, HttpInvoiceCallback, InMemoryDocumentStore,
    InMemoryInvoiceQueue, InvoiceCallback, InvoiceQueue, InvoiceUpdate, LedgerCallback,
    LocalCatalogGateway, PostgresInvoiceQueue, QueueMessage, StockRequest, StoredDocument,
    TextInvoiceRenderer, UrlSigner,
};
pub use state::SagaStage;
pub use worker::{InvoiceWorker, PollOutcome, WorkerConfig};

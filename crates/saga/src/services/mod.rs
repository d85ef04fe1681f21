//! Collaborators of the order saga and the invoice worker.

pub mod callback;
pub mod documents;
pub mod gateway;
pub mod postgres_queue;
pub mod queue;

pub use self::callback::{HttpInvoiceCallback, InvoiceCallback, InvoiceUpdate, LedgerCallback};
pub use self::gateway::{
    CatalogErrorBody, CatalogGateway, HttpCatalogGateway, LocalCatalogGateway, StockRequest,
};
pub use self::documents::{
    DocumentRenderer, DocumentStore, FilesystemDocumentStore, InMemoryDocumentStore,
    StoredDocument, TextInvoiceRenderer, UrlSigner, validate_name,
};
pub use self::postgres_queue::PostgresInvoiceQueue;
pub use self::queue::{DeadLetter, InMemoryInvoiceQueue, InvoiceQueue, QueueMessage};

//! Invoice rendering and document storage.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::InvoiceJob;
use crate::error::DocumentError;

/// Turns an invoice job into document bytes.
pub trait DocumentRenderer: Send + Sync {
    /// MIME type of the rendered bytes.
    fn content_type(&self) -> &'static str;

    fn render(&self, job: &InvoiceJob) -> Result<Vec<u8>, DocumentError>;
}

impl<T: DocumentRenderer + ?Sized> DocumentRenderer for Arc<T> {
    fn content_type(&self) -> &'static str {
        (**self).content_type()
    }

    fn render(&self, job: &InvoiceJob) -> Result<Vec<u8>, DocumentError> {
        (**self).render(job)
    }
}

/// Renders a plain-text invoice.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextInvoiceRenderer;

impl DocumentRenderer for TextInvoiceRenderer {
    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn render(&self, job: &InvoiceJob) -> Result<Vec<u8>, DocumentError> {
        if job.items.is_empty() {
            return Err(DocumentError::Render(format!(
                "order {} has no lines",
                job.order_number
            )));
        }

        let mut out = String::new();
        let result: std::fmt::Result = (|| {
            writeln!(out, "INVOICE")?;
            writeln!(out)?;
            writeln!(out, "Order:    {}", job.order_number)?;
            writeln!(out, "Date:     {}", job.created_at.format("%Y-%m-%d %H:%M UTC"))?;
            writeln!(out, "Customer: {} ({})", job.customer_name, job.customer_id)?;
            writeln!(out)?;
            writeln!(
                out,
                "{:<12} {:<30} {:>5} {:>12} {:>12}",
                "Code", "Product", "Qty", "Unit", "Total"
            )?;
            for line in &job.items {
                writeln!(
                    out,
                    "{:<12} {:<30} {:>5} {:>12} {:>12}",
                    line.product_code,
                    line.product_name,
                    line.quantity,
                    line.unit_price.to_string(),
                    line.total_price.to_string()
                )?;
            }
            writeln!(out)?;
            writeln!(out, "TOTAL: {}", job.total_price)
        })();
        result.map_err(|e| DocumentError::Render(e.to_string()))?;

        Ok(out.into_bytes())
    }
}

/// Blob storage for rendered documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores a document, replacing any previous one with the same name.
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<(), DocumentError>;

    /// Returns a read-only URL for the document valid for `ttl`.
    async fn read_url(&self, name: &str, ttl: Duration) -> Result<String, DocumentError>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn put(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), DocumentError> {
        (**self).put(name, bytes, content_type).await
    }

    async fn read_url(&self, name: &str, ttl: Duration) -> Result<String, DocumentError> {
        (**self).read_url(name, ttl).await
    }
}

/// Rejects names that could escape the store's namespace.
pub fn validate_name(name: &str) -> Result<(), DocumentError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(DocumentError::InvalidName(name.to_string()))
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> i64 {
    now.timestamp()
        .saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-memory document store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<RwLock<HashMap<String, StoredDocument>>>,
    writes: Arc<AtomicUsize>,
    fail_on_put: Arc<AtomicBool>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures `put` to fail with `Unavailable`.
    pub fn set_fail_on_put(&self, fail: bool) {
        self.fail_on_put.store(fail, Ordering::SeqCst);
    }

    pub async fn get(&self, name: &str) -> Option<StoredDocument> {
        self.documents.read().await.get(name).cloned()
    }

    /// Names of all stored documents, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.documents.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of successful `put` calls, overwrites included.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), DocumentError> {
        validate_name(name)?;
        if self.fail_on_put.load(Ordering::SeqCst) {
            return Err(DocumentError::Unavailable(
                "document store rejected write by simulated outage".to_string(),
            ));
        }

        self.documents.write().await.insert(
            name.to_string(),
            StoredDocument {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_url(&self, name: &str, ttl: Duration) -> Result<String, DocumentError> {
        if !self.documents.read().await.contains_key(name) {
            return Err(DocumentError::NotFound(name.to_string()));
        }
        Ok(format!(
            "memory://invoices/{name}?expires={}",
            expiry(Utc::now(), ttl)
        ))
    }
}

/// Signs and verifies time-boxed document URLs.
///
/// The signature is SHA-256 over the secret, the document name and the
/// expiry timestamp, base64url encoded without padding.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    pub fn sign(&self, name: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(b"\n");
        hasher.update(name.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Returns true if `signature` matches and `expires` is not in the past
    /// relative to `now`.
    pub fn verify(&self, name: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        if expires < now.timestamp() {
            return false;
        }
        let expected = self.sign(name, expires);
        constant_time_eq::constant_time_eq(expected.as_bytes(), signature.as_bytes())
    }
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

/// Content type served for documents stored without one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Document store on the local filesystem.
///
/// Read URLs point at `base_url` and carry `expires` and `signature` query
/// parameters that [`FilesystemDocumentStore::verify`] checks. Each
/// document's content type sits next to it in a hidden `.<name>.type` file.
#[derive(Debug, Clone)]
pub struct FilesystemDocumentStore {
    root: PathBuf,
    base_url: String,
    signer: UrlSigner,
}

impl FilesystemDocumentStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>, signer: UrlSigner) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signer,
        }
    }

    /// Directory holding the documents.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Checks a read URL's signature and expiry.
    pub fn verify(&self, name: &str, expires: i64, signature: &str) -> bool {
        validate_name(name).is_ok() && self.signer.verify(name, expires, signature, Utc::now())
    }

    fn content_type_path(&self, name: &str) -> PathBuf {
        self.root.join(format!(".{name}.type"))
    }

    /// Reads a stored document and the content type it was stored with.
    pub async fn open(&self, name: &str) -> Result<StoredDocument, DocumentError> {
        validate_name(name)?;
        let bytes = match tokio::fs::read(self.root.join(name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocumentError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let content_type = match tokio::fs::read_to_string(self.content_type_path(name)).await {
            Ok(content_type) => content_type.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DEFAULT_CONTENT_TYPE.to_string(),
            Err(e) => return Err(e.into()),
        };

        Ok(StoredDocument {
            bytes,
            content_type,
        })
    }
}

#[async_trait]
impl DocumentStore for FilesystemDocumentStore {
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), DocumentError> {
        validate_name(name)?;
        tokio::fs::create_dir_all(&self.root).await?;

        // Write then rename so readers never observe a partial document
        let tmp = self.root.join(format!(".{name}.type.tmp"));
        tokio::fs::write(&tmp, content_type.as_bytes()).await?;
        tokio::fs::rename(&tmp, self.content_type_path(name)).await?;

        let tmp = self.root.join(format!(".{name}.tmp"));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, self.root.join(name)).await?;
        Ok(())
    }

    async fn read_url(&self, name: &str, ttl: Duration) -> Result<String, DocumentError> {
        validate_name(name)?;
        if !tokio::fs::try_exists(self.root.join(name)).await? {
            return Err(DocumentError::NotFound(name.to_string()));
        }

        let expires = expiry(Utc::now(), ttl);
        let signature = self.signer.sign(name, expires);
        Ok(format!(
            "{}/{name}?expires={expires}&signature={signature}",
            self.base_url
        ))
    }
}

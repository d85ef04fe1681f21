//! Invoice completion callback into the order ledger.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ledger::{LedgerError, Order, OrderLedger, OrderStatus};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::OrderId;
use crate::error::CallbackError;

/// Marks an order completed with its invoice URL.
///
/// Implementations must be idempotent: repeating a call for an order whose
/// invoice is recorded leaves the order unchanged.
#[async_trait]
pub trait InvoiceCallback: Send + Sync {
    async fn complete(&self, order_id: OrderId, pdf_url: &str) -> Result<Order, CallbackError>;
}

#[async_trait]
impl<T: InvoiceCallback + ?Sized> InvoiceCallback for Arc<T> {
    async fn complete(&self, order_id: OrderId, pdf_url: &str) -> Result<Order, CallbackError> {
        (**self).complete(order_id, pdf_url).await
    }
}

/// Body of `POST /orders/{id}/invoice`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceUpdate {
    pub pdf_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

impl InvoiceUpdate {
    pub fn completed(pdf_url: impl Into<String>) -> Self {
        Self {
            pdf_url: pdf_url.into(),
            status: Some(OrderStatus::Completed),
        }
    }

    /// Requested status; completed when omitted.
    pub fn status(&self) -> OrderStatus {
        self.status.unwrap_or(OrderStatus::Completed)
    }
}

/// Callback writing straight to an order ledger in the same process.
#[derive(Clone)]
pub struct LedgerCallback<L> {
    ledger: L,
}

impl<L: OrderLedger> LedgerCallback<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<L: OrderLedger> InvoiceCallback for LedgerCallback<L> {
    async fn complete(&self, order_id: OrderId, pdf_url: &str) -> Result<Order, CallbackError> {
        self.ledger
            .update_invoice(order_id, pdf_url.to_string(), OrderStatus::Completed)
            .await
            .map_err(|e| match e {
                LedgerError::OrderNotFound(id) => CallbackError::OrderNotFound(id),
                e if e.is_unavailable() => CallbackError::Unavailable(e.to_string()),
                e => CallbackError::Ledger(e),
            })
    }
}

/// Callback calling the order service over HTTP.
#[derive(Clone, Debug)]
pub struct HttpInvoiceCallback {
    client: Client,
    base_url: String,
}

impl HttpInvoiceCallback {
    /// Creates a callback against the order service at `base_url`; every
    /// call is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CallbackError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CallbackError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl InvoiceCallback for HttpInvoiceCallback {
    #[tracing::instrument(skip(self, pdf_url))]
    async fn complete(&self, order_id: OrderId, pdf_url: &str) -> Result<Order, CallbackError> {
        let response = self
            .client
            .post(format!("{}/orders/{}/invoice", self.base_url, order_id))
            .json(&InvoiceUpdate::completed(pdf_url))
            .send()
            .await
            .map_err(|e| CallbackError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| CallbackError::Unavailable(format!("invalid order response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%order_id, %status, %body, "invoice callback rejected");
        match status {
            StatusCode::NOT_FOUND => Err(CallbackError::OrderNotFound(order_id)),
            s if s.is_server_error() => Err(CallbackError::Unavailable(format!("{s}: {body}"))),
            s => Err(CallbackError::Rejected {
                status: s.as_u16(),
                body,
            }),
        }
    }
}

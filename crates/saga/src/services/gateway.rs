//! Catalog gateway: check/reserve/release as seen by the order saga.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog::{CatalogError, InventoryStore, Release, Reservation, StockCheck};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{ProductId, ReservationId, StockLine};

/// Network-facing facade over the inventory store.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    /// Advisory availability check.
    async fn check_stock(&self, lines: &[StockLine]) -> catalog::Result<StockCheck>;

    /// All-or-nothing reservation.
    async fn reserve_stock(
        &self,
        reservation_id: ReservationId,
        lines: &[StockLine],
    ) -> catalog::Result<Reservation>;

    /// Gives stock back. Repeating a release under the same ID is a no-op.
    async fn release_stock(
        &self,
        reservation_id: Option<ReservationId>,
        lines: &[StockLine],
    ) -> catalog::Result<Release>;
}

#[async_trait]
impl<T: CatalogGateway + ?Sized> CatalogGateway for Arc<T> {
    async fn check_stock(&self, lines: &[StockLine]) -> catalog::Result<StockCheck> {
        (**self).check_stock(lines).await
    }

    async fn reserve_stock(
        &self,
        reservation_id: ReservationId,
        lines: &[StockLine],
    ) -> catalog::Result<Reservation> {
        (**self).reserve_stock(reservation_id, lines).await
    }

    async fn release_stock(
        &self,
        reservation_id: Option<ReservationId>,
        lines: &[StockLine],
    ) -> catalog::Result<Release> {
        (**self).release_stock(reservation_id, lines).await
    }
}

/// Gateway calling an inventory store in the same process.
#[derive(Clone)]
pub struct LocalCatalogGateway<S> {
    store: S,
}

impl<S: InventoryStore> LocalCatalogGateway<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: InventoryStore> CatalogGateway for LocalCatalogGateway<S> {
    async fn check_stock(&self, lines: &[StockLine]) -> catalog::Result<StockCheck> {
        self.store.check_stock(lines).await
    }

    async fn reserve_stock(
        &self,
        reservation_id: ReservationId,
        lines: &[StockLine],
    ) -> catalog::Result<Reservation> {
        self.store.reserve_stock(reservation_id, lines).await
    }

    async fn release_stock(
        &self,
        reservation_id: Option<ReservationId>,
        lines: &[StockLine],
    ) -> catalog::Result<Release> {
        self.store.release_stock(reservation_id, lines).await
    }
}

/// Body of `POST /products/check-stock`, `/products/reserve` and
/// `/products/release`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<ReservationId>,
    pub items: Vec<StockLine>,
}

impl StockRequest {
    pub fn new(reservation_id: Option<ReservationId>, lines: &[StockLine]) -> Self {
        Self {
            reservation_id,
            items: lines.to_vec(),
        }
    }
}

/// Error body returned by the catalog routes.
///
/// Carries enough structure for [`HttpCatalogGateway`] to rebuild the
/// original [`CatalogError`] on the caller's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<i64>,
}

impl CatalogErrorBody {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            product_id: None,
            requested: None,
            available: None,
        }
    }

    pub fn from_error(err: &CatalogError) -> Self {
        match err {
            CatalogError::InsufficientStock {
                product_id,
                requested,
                available,
            } => Self {
                error: err.to_string(),
                product_id: Some(*product_id),
                requested: Some(*requested),
                available: Some(*available),
            },
            CatalogError::ProductNotFound(id) => Self {
                product_id: Some(*id),
                ..Self::message(err.to_string())
            },
            _ => Self::message(err.to_string()),
        }
    }

    /// Rebuilds the error from an HTTP status and this body.
    pub fn into_error(self, status: StatusCode) -> CatalogError {
        match (status, self.product_id, self.requested, self.available) {
            (StatusCode::NOT_FOUND, Some(id), _, _) => CatalogError::ProductNotFound(id),
            (StatusCode::CONFLICT, Some(product_id), Some(requested), Some(available)) => {
                CatalogError::InsufficientStock {
                    product_id,
                    requested,
                    available,
                }
            }
            (StatusCode::BAD_REQUEST, _, _, _) => CatalogError::InvalidRequest(self.error),
            _ => CatalogError::Unavailable(format!("catalog returned {status}: {}", self.error)),
        }
    }
}

/// Gateway calling the catalog service over HTTP.
#[derive(Clone, Debug)]
pub struct HttpCatalogGateway {
    client: Client,
    base_url: String,
}

impl HttpCatalogGateway {
    /// Creates a gateway for the catalog service at `base_url`; every call
    /// is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> catalog::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        body: &StockRequest,
    ) -> catalog::Result<T> {
        metrics::counter!("catalog_gateway_requests_total", "operation" => operation).increment(1);

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| CatalogError::Unavailable(format!("invalid catalog response: {e}")));
        }

        let text = response.text().await.unwrap_or_default();
        tracing::warn!(operation, %status, body = %text, "catalog request rejected");
        let body = serde_json::from_str::<CatalogErrorBody>(&text)
            .unwrap_or_else(|_| CatalogErrorBody::message(text));
        Err(body.into_error(status))
    }
}

#[async_trait]
impl CatalogGateway for HttpCatalogGateway {
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn check_stock(&self, lines: &[StockLine]) -> catalog::Result<StockCheck> {
        self.post("check", "/products/check-stock", &StockRequest::new(None, lines))
            .await
    }

    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn reserve_stock(
        &self,
        reservation_id: ReservationId,
        lines: &[StockLine],
    ) -> catalog::Result<Reservation> {
        self.post(
            "reserve",
            "/products/reserve",
            &StockRequest::new(Some(reservation_id), lines),
        )
        .await
    }

    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn release_stock(
        &self,
        reservation_id: Option<ReservationId>,
        lines: &[StockLine],
    ) -> catalog::Result<Release> {
        self.post(
            "release",
            "/products/release",
            &StockRequest::new(reservation_id, lines),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_survives_the_wire() {
        let err = CatalogError::InsufficientStock {
            product_id: ProductId::new(3),
            requested: 5,
            available: 2,
        };
        let body: CatalogErrorBody =
            serde_json::from_str(&serde_json::to_string(&CatalogErrorBody::from_error(&err)).unwrap())
                .unwrap();

        assert!(matches!(
            body.into_error(StatusCode::CONFLICT),
            CatalogError::InsufficientStock { product_id, requested: 5, available: 2 }
                if product_id == ProductId::new(3)
        ));
    }

    #[test]
    fn not_found_names_the_product() {
        let body = CatalogErrorBody::from_error(&CatalogError::ProductNotFound(ProductId::new(9)));
        assert!(matches!(
            body.into_error(StatusCode::NOT_FOUND),
            CatalogError::ProductNotFound(id) if id == ProductId::new(9)
        ));
    }

    #[test]
    fn server_errors_become_unavailable() {
        let err = CatalogErrorBody::message("boom").into_error(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn unreachable_catalog_is_unavailable() {
        // Port 9 (discard) on localhost is not expected to accept connections
        let gateway =
            HttpCatalogGateway::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = gateway
            .check_stock(&[StockLine::new(ProductId::new(1), 1)])
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}

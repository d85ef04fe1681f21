//! Catalog endpoints: product lookup and the check/reserve/release trio.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use catalog::{Product, Release, Reservation, StockCheck, validate_lines};
use saga::{ProductId, StockRequest};

use crate::AppState;
use crate::error::ApiError;

/// GET /products: every product, ordered by ID.
#[tracing::instrument(skip(state))]
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.inventory.list_products().await?))
}

/// GET /products/{id}
#[tracing::instrument(skip(state, id))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Product>, ApiError> {
    let Path(id) = id?;
    let id = ProductId::new(id);
    state
        .inventory
        .get_product(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))
}

/// GET /products/code/{code}
#[tracing::instrument(skip(state))]
pub async fn get_by_code(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Product>, ApiError> {
    state
        .inventory
        .get_product_by_code(&code)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product with code {code} not found")))
}

/// POST /products/check-stock: advisory per-line availability.
#[tracing::instrument(skip(state, payload))]
pub async fn check_stock(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StockRequest>, JsonRejection>,
) -> Result<Json<StockCheck>, ApiError> {
    let Json(request) = payload?;
    validate_lines(&request.items)?;
    Ok(Json(state.inventory.check_stock(&request.items).await?))
}

/// POST /products/reserve: all-or-nothing reservation.
///
/// Callers should send a `reservation_id` so a later release can be made
/// idempotent; one is generated otherwise.
#[tracing::instrument(skip(state, payload))]
pub async fn reserve(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StockRequest>, JsonRejection>,
) -> Result<Json<Reservation>, ApiError> {
    let Json(request) = payload?;
    validate_lines(&request.items)?;
    let reservation_id = request.reservation_id.unwrap_or_default();
    Ok(Json(
        state
            .inventory
            .reserve_stock(reservation_id, &request.items)
            .await?,
    ))
}

/// POST /products/release: gives stock back, once per reservation ID.
#[tracing::instrument(skip(state, payload))]
pub async fn release(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StockRequest>, JsonRejection>,
) -> Result<Json<Release>, ApiError> {
    let Json(request) = payload?;
    validate_lines(&request.items)?;
    Ok(Json(
        state
            .inventory
            .release_stock(request.reservation_id, &request.items)
            .await?,
    ))
}

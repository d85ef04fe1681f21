//! Order endpoints: placement through the saga, reads, and status updates.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use ledger::{Order, OrderStatus};
use saga::{InvoiceUpdate, OrderId, OrderPlacement, PlaceOrder};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

/// Body of `PATCH /orders/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

/// POST /orders: runs the order creation saga.
///
/// Responds 201 with the pending order. Publish problems do not fail the
/// request; they are listed under `warnings`.
#[tracing::instrument(skip(state, payload))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PlaceOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderPlacement>), ApiError> {
    let Json(request) = payload?;
    let placement = state.orchestrator.place_order(request).await?;
    Ok((StatusCode::CREATED, Json(placement)))
}

/// GET /orders: all orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.ledger().list_orders().await?))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state, id))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Order>, ApiError> {
    let id = order_id(id)?;
    state
        .ledger()
        .get_order(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))
}

/// PATCH /orders/{id}/status
#[tracing::instrument(skip(state, id, payload))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let id = order_id(id)?;
    let Json(update) = payload?;
    let status: OrderStatus = update.status.trim().parse().map_err(|_| {
        ApiError::BadRequest(format!(
            "Invalid status '{}'. Must be one of: pending, processing, completed",
            update.status
        ))
    })?;
    let pdf_url = update.pdf_url.filter(|url| !url.trim().is_empty());

    let order = state.ledger().update_status(id, status, pdf_url).await?;
    tracing::info!(order_id = %id, %status, "order status updated");
    Ok(Json(order))
}

/// POST /orders/{id}/invoice: the invoice worker's completion callback.
///
/// Safe to repeat: once an order is completed with a document URL, later
/// calls return it unchanged.
#[tracing::instrument(skip(state, id, payload))]
pub async fn record_invoice(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<InvoiceUpdate>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let id = order_id(id)?;
    let Json(update) = payload?;
    if update.pdf_url.trim().is_empty() {
        return Err(ApiError::BadRequest("pdf_url is required".to_string()));
    }

    let status = update.status();
    let order = state
        .ledger()
        .update_invoice(id, update.pdf_url, status)
        .await?;
    Ok(Json(order))
}

fn order_id(path: Result<Path<i64>, PathRejection>) -> Result<OrderId, ApiError> {
    let Path(id) = path?;
    Ok(OrderId::new(id))
}

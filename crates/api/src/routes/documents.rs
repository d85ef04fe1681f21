//! Signed invoice document downloads.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use saga::DocumentError;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
}

/// GET /documents/{name}?expires=..&signature=..
#[tracing::instrument(skip(state, query))]
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    query: Result<Query<SignedQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Some(documents) = state.documents.as_ref() else {
        return Err(ApiError::NotFound(format!("Document {name} not found")));
    };
    let Query(query) = query.map_err(|_| ApiError::Forbidden("Missing signature".to_string()))?;

    if !documents.verify(&name, query.expires, &query.signature) {
        metrics::counter!("document_downloads_rejected_total").increment(1);
        return Err(ApiError::Forbidden("Invalid or expired signature".to_string()));
    }

    let document = documents.open(&name).await.map_err(|e| match e {
        DocumentError::NotFound(_) | DocumentError::InvalidName(_) => {
            ApiError::NotFound(format!("Document {name} not found"))
        }
        e => ApiError::Internal(e.to_string()),
    })?;

    Ok((
        [(header::CONTENT_TYPE, document.content_type)],
        document.bytes,
    )
        .into_response())
}

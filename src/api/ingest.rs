use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::{index_error, scope_error, ApiError};
use crate::ingest::ingest_documents;
use crate::models::{IngestRequest, IngestResponse};
use crate::state::AppState;

/// POST /api/ingest - chunk and index already-extracted document pages.
pub async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    if req.documents.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No documents provided".to_string()));
    }
    if req.documents.iter().any(|d| d.filename.trim().is_empty()) {
        return Err((StatusCode::BAD_REQUEST, "Every document needs a filename".to_string()));
    }
    state.scopes.ensure(req.scope_id).map_err(scope_error)?;

    let report = ingest_documents(&state.index, &state.chunker, &req.documents, req.scope_id)
        .await
        .map_err(index_error)?;

    Ok(Json(IngestResponse {
        message: format!("Successfully processed {} files", report.documents.len()),
        chunks_count: report.chunks_added,
        documents: report.documents,
    }))
}

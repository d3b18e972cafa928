use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::{scope_error, ApiError};
use crate::models::{SearchRequest, SearchResponse};
use crate::state::AppState;

const MAX_K: usize = 50;

/// POST /api/search - hybrid vector + keyword search, optionally scoped.
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }
    state.scopes.ensure(req.scope_id).map_err(scope_error)?;

    let k = req.k.unwrap_or(state.config.top_k).clamp(1, MAX_K);
    let results = state.retriever.search(&query, k, req.scope_id).await;

    Ok(Json(SearchResponse { query, results }))
}

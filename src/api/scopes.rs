use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::{scope_error, ApiError};
use crate::models::{Conversation, CreateScopeRequest};
use crate::state::AppState;

/// GET /api/scopes - newest first.
pub async fn list_scopes(State(state): State<AppState>) -> Json<Vec<Conversation>> {
    Json(state.scopes.list())
}

/// POST /api/scopes
pub async fn create_scope(
    State(state): State<AppState>,
    body: Option<Json<CreateScopeRequest>>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let title = body.and_then(|Json(req)| req.title);
    let conversation = state.scopes.create(title).map_err(scope_error)?;
    tracing::info!("Created scope {} ({})", conversation.id, conversation.title);
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// DELETE /api/scopes/{id} - chunks tagged with the scope stay in the index
/// but can no longer be reached through any live scope.
pub async fn delete_scope(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let removed = state.scopes.delete(id).map_err(scope_error)?;
    tracing::info!("Deleted scope {} ({})", removed.id, removed.title);
    Ok(StatusCode::NO_CONTENT)
}

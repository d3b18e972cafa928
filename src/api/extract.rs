use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::{scope_error, ApiError};
use crate::extraction::{extract_door_schedule, DoorEntry};
use crate::models::ExtractRequest;
use crate::state::AppState;

/// POST /api/extract/door-schedule
pub async fn door_schedule(
    State(state): State<AppState>,
    body: Option<Json<ExtractRequest>>,
) -> Result<Json<Vec<DoorEntry>>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    state.scopes.ensure(req.scope_id).map_err(scope_error)?;

    let doors = extract_door_schedule(
        &state.retriever,
        state.generator.as_ref(),
        req.scope_id,
        state.config.extraction_top_k,
    )
    .await
    .map_err(|e| (StatusCode::BAD_GATEWAY, format!("LLM error: {e}")))?;

    Ok(Json(doors))
}

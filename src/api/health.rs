use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "indexed_chunks": state.index.len(),
        "embedding_dim": state.index.dim(),
        "provider": state.config.llm.provider,
    }))
}

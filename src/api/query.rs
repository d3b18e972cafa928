use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::api::{scope_error, ApiError};
use crate::models::QueryRequest;
use crate::state::AppState;

/// POST /api/query - grounded answer streamed as plain text, followed by the
/// `__SOURCES__` marker and a JSON array of the retrieved chunks.
pub async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    if req.question.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question is required".to_string()));
    }
    state.scopes.ensure(req.scope_id).map_err(scope_error)?;

    let permit = state
        .query_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Query service at capacity".to_string(),
            )
        })?;

    let events = state
        .assembler
        .answer(&req.question, req.history, req.scope_id)
        .await;

    // Hold the permit for the lifetime of the stream. Dropping the body on
    // client disconnect stops polling the provider.
    let body = events.map(move |event| {
        let _permit = &permit;
        Ok::<_, Infallible>(Bytes::from(event.to_wire()))
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}

pub mod eval;
pub mod extract;
pub mod health;
pub mod ingest;
pub mod query;
pub mod scopes;
pub mod search;

use axum::http::StatusCode;

use crate::error::{IndexError, ScopeError};

pub type ApiError = (StatusCode, String);

pub(crate) fn scope_error(e: ScopeError) -> ApiError {
    match e {
        ScopeError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        ScopeError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub(crate) fn index_error(e: IndexError) -> ApiError {
    let status = match e {
        IndexError::Embedding(_) | IndexError::EmbeddingCount { .. } => StatusCode::BAD_GATEWAY,
        IndexError::DuplicateDocument(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

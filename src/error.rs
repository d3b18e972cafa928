use thiserror::Error;

/// Failure of a call to the remote embedding / generation provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider signalled rate limiting or quota exhaustion. Retryable.
    #[error("rate limited by provider ({status}): {message}")]
    RateLimited { status: u16, message: String },

    /// Any other provider failure. Never retried.
    #[error("provider error: {0}")]
    Upstream(String),

    /// The caller went away while a retry delay was pending.
    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Classify a failed provider response by status code and body text.
    pub fn from_response(status: u16, body: &str) -> Self {
        if status == 429 || mentions_rate_limit(body) {
            LlmError::RateLimited {
                status,
                message: body.to_string(),
            }
        } else {
            LlmError::Upstream(format!("status {status}: {body}"))
        }
    }

    /// Classify a failure that has no HTTP status (transport, stream, parse).
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if mentions_rate_limit(&message) {
            LlmError::RateLimited { status: 0, message }
        } else {
            LlmError::Upstream(message)
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => LlmError::from_response(status.as_u16(), &e.to_string()),
            None => LlmError::from_message(e.to_string()),
        }
    }
}

fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("429")
        || lower.contains("quota")
        || lower.contains("rate limit")
        || lower.contains("resource exhausted")
        || lower.contains("resource_exhausted")
}

/// Invalid chunking configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidOverlap { chunk_size: usize, overlap: usize },
}

/// Failures of the vector index write/read paths.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] LlmError),

    #[error("embedding provider returned {got} vectors for {expected} texts")]
    EmbeddingCount { expected: usize, got: usize },

    #[error("vector has dimension {got}, index expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("failed to persist index: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("corrupt index files: {0}")]
    CorruptIndex(String),

    /// A document name is already indexed. `(doc_name, chunk_id)` must stay unique.
    #[error("document {0} is already indexed")]
    DuplicateDocument(String),
}

/// Failures of the conversation scope registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("scope {0} not found")]
    NotFound(i64),

    /// The registry file could not be written; the change was not applied.
    #[error("failed to persist scope registry: {0}")]
    Persistence(String),
}

/// Structured output from the model could not be parsed.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("malformed extraction output: {0}")]
    Malformed(String),
}

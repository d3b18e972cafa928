use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable unit of retrievable document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_name: String,
    /// 1-based page number in the source document.
    pub page_num: u32,
    /// Document-local sequence number, starting at 0.
    pub chunk_id: u32,
    pub text: String,
    /// Owning conversation; `None` means globally visible.
    #[serde(default)]
    pub scope_id: Option<i64>,
}

/// Which chunks a search may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter {
    /// Every chunk, scoped or not.
    All,
    /// Only chunks tagged with exactly this scope. Unscoped chunks are excluded.
    Only(i64),
}

impl ScopeFilter {
    pub fn from_scope_id(scope_id: Option<i64>) -> Self {
        match scope_id {
            Some(id) => ScopeFilter::Only(id),
            None => ScopeFilter::All,
        }
    }

    pub fn admits(&self, chunk: &Chunk) -> bool {
        match self {
            ScopeFilter::All => true,
            ScopeFilter::Only(id) => chunk.scope_id == Some(*id),
        }
    }
}

/// A chunk with its fused relevance score (higher is better).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub doc_name: String,
    pub page_num: u32,
    pub chunk_id: u32,
    pub text: String,
    pub score: f32,
}

impl ScoredChunk {
    pub fn new(chunk: &Chunk, score: f32) -> Self {
        Self {
            doc_name: chunk.doc_name.clone(),
            page_num: chunk.page_num,
            chunk_id: chunk.chunk_id,
            text: chunk.text.clone(),
            score,
        }
    }
}

/// A conversation that chunks can be scoped to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// A single chat turn (user or assistant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// One document whose text has already been extracted page by page
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentPages {
    pub filename: String,
    pub pages: Vec<String>,
}

/// Ingest request
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub documents: Vec<DocumentPages>,
    pub scope_id: Option<i64>,
}

/// Ingest response
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub message: String,
    pub chunks_count: usize,
    pub documents: Vec<String>,
}

/// Search request
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub k: Option<usize>,
    pub scope_id: Option<i64>,
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<ScoredChunk>,
}

/// Question request
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub scope_id: Option<i64>,
}

/// Create-conversation request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateScopeRequest {
    pub title: Option<String>,
}

/// Extraction request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractRequest {
    pub scope_id: Option<i64>,
}

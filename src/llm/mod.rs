//! Remote model access: embedding and generation behind provider-agnostic traits,
//! with rate-limit aware retries.

pub mod chat_stream;
pub mod embeddings;
pub mod retry;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::stream::Stream;

use crate::error::LlmError;
use crate::models::ChatMessage;

/// Stream of generated text fragments. An `Err` item is a mid-stream failure.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// What the embedded text will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    SearchDocument,
    SearchQuery,
}

/// Turns texts into fixed-dimension vectors.
///
/// Implementations must return exactly one vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>, LlmError>;
}

/// Produces answers from a chat transcript.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Full, non-streamed completion.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Streamed completion. Errors before the first byte are returned directly;
    /// later failures appear as `Err` items in the stream.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream, LlmError>;
}

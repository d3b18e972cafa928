use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::retry::RetryPolicy;
use crate::llm::{EmbedTask, Embedder};

/// Maximum characters to send per text to the embedding API.
/// nomic-embed-text has an 8 192-token context; at ~4 chars per token of
/// prose, 8 000 chars stays well inside it.
const MAX_EMBED_CHARS: usize = 8_000;

/// Truncate `text` to at most `MAX_EMBED_CHARS`, splitting on a UTF-8 char boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// nomic-style models expect a task prefix on every input.
fn task_prefix(config: &LlmConfig, task: EmbedTask) -> &'static str {
    if config.provider != "ollama" || !config.embedding_model.contains("nomic") {
        return "";
    }
    match task {
        EmbedTask::SearchDocument => "search_document: ",
        EmbedTask::SearchQuery => "search_query: ",
    }
}

/// Embedding client for Ollama or OpenAI-compatible APIs.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: LlmConfig,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: LlmConfig, retry: RetryPolicy) -> Self {
        Self {
            client,
            config,
            retry,
            shutdown: CancellationToken::new(),
        }
    }

    /// Abandon pending retry delays once `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        match self.config.provider.as_str() {
            "ollama" => embed_ollama(&self.client, &self.config, texts).await,
            "openai" => embed_openai(&self.client, &self.config, texts).await,
            other => Err(LlmError::Upstream(format!("Unknown LLM provider: {other}"))),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prefix = task_prefix(&self.config, task);
        let prepared: Vec<String> = texts
            .iter()
            .map(|t| format!("{prefix}{}", truncate_for_embedding(t)))
            .collect();

        // The whole batch is retried as a unit so no partial result survives a retry.
        self.retry
            .run("embed", &self.shutdown, || self.embed_once(&prepared))
            .await
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, LlmError> {
    let url = format!("{}/api/embed", config.base_url);

    let batch_size = 32;
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size) {
        let req = OllamaEmbedRequest {
            model: config.embedding_model.clone(),
            input: chunk.to_vec(),
            truncate: true,
        };

        let resp = client.post(&url).json(&req).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::from_response(status, &body));
        }

        let body: OllamaEmbedResponse = resp.json().await.map_err(|e| {
            LlmError::Upstream(format!("Failed to parse Ollama embed response: {e}"))
        })?;

        all_embeddings.extend(body.embeddings);
    }

    Ok(all_embeddings)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, LlmError> {
    let url = format!("{}/v1/embeddings", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let batch_size = 64;
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size) {
        let req = OpenAiEmbedRequest {
            model: config.embedding_model.clone(),
            input: chunk.to_vec(),
        };

        let resp = client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::from_response(status, &body));
        }

        let mut body: OpenAiEmbedResponse = resp.json().await.map_err(|e| {
            LlmError::Upstream(format!("Failed to parse OpenAI embed response: {e}"))
        })?;

        // Providers may return entries out of order; `index` restores alignment.
        body.data.sort_by_key(|d| d.index);
        all_embeddings.extend(body.data.into_iter().map(|d| d.embedding));
    }

    Ok(all_embeddings)
}

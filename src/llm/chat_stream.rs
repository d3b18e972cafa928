use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::retry::RetryPolicy;
use crate::llm::{Generator, TextStream};
use crate::models::ChatMessage;

const GENERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Chat completion client for Ollama or OpenAI-compatible APIs.
#[derive(Clone)]
pub struct HttpGenerator {
    client: reqwest::Client,
    config: LlmConfig,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

impl HttpGenerator {
    pub fn new(client: reqwest::Client, config: LlmConfig, retry: RetryPolicy) -> Self {
        Self {
            client,
            config,
            retry,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    fn endpoint(&self) -> Result<String, LlmError> {
        match self.config.provider.as_str() {
            "ollama" => Ok(format!("{}/api/chat", self.config.base_url)),
            "openai" => Ok(format!("{}/v1/chat/completions", self.config.base_url)),
            other => Err(LlmError::Upstream(format!(
                "Unsupported LLM provider for chat: {other}"
            ))),
        }
    }

    /// Send the chat request and fail on a non-success status.
    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response, LlmError> {
        let url = self.endpoint()?;
        let req = ChatRequest {
            model: self.config.chat_model.clone(),
            messages: messages
                .iter()
                .map(|m| StreamMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            stream,
        };

        let mut builder = self.client.post(&url).timeout(GENERATION_TIMEOUT).json(&req);
        if self.config.provider == "openai" {
            builder = builder.header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.as_deref().unwrap_or("")),
            );
        }

        let resp = builder.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::from_response(status, &body));
        }
        Ok(resp)
    }

    async fn complete_once(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let resp = self.send(messages, false).await?;
        let body = resp.text().await?;
        match self.config.provider.as_str() {
            "openai" => {
                let parsed: OpenAiChatResponse = serde_json::from_str(&body).map_err(|e| {
                    LlmError::Upstream(format!("Failed to parse OpenAI chat response: {e}"))
                })?;
                Ok(parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .unwrap_or_default())
            }
            _ => {
                let parsed: OllamaChatResponse = serde_json::from_str(&body).map_err(|e| {
                    LlmError::Upstream(format!("Failed to parse Ollama chat response: {e}"))
                })?;
                Ok(parsed.message.content)
            }
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.retry
            .run("generate", &self.shutdown, || self.complete_once(messages))
            .await
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream, LlmError> {
        // Only opening the stream is retried; once bytes flow, failures go inline.
        let resp = self
            .retry
            .run("generate stream", &self.shutdown, || self.send(messages, true))
            .await?;

        let openai = self.config.provider == "openai";
        let stream = stream_lines(resp.bytes_stream()).filter_map(move |line_result| async move {
            match line_result {
                Ok(line) if openai => parse_openai_line(&line),
                Ok(line) => parse_ollama_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }
}

// ─── Wire types ──────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<StreamMessage>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct StreamMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: StreamMessage,
}

#[derive(Deserialize)]
struct OllamaStreamChunk {
    message: StreamMessage,
    done: bool,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

/// Parse a single Ollama streaming line. Returns:
/// - Some(Ok(content)) for content deltas
/// - Some(Err(e)) for parse errors and provider-reported errors
/// - None to skip (empty content or done signal)
fn parse_ollama_line(line: &str) -> Option<Result<String, LlmError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    // Ollama reports mid-stream failures as `{"error": "..."}`.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
        if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
            return Some(Err(LlmError::from_message(err)));
        }
    }

    match serde_json::from_str::<OllamaStreamChunk>(line) {
        Ok(chunk) => {
            if chunk.done || chunk.message.content.is_empty() {
                return None;
            }
            Some(Ok(chunk.message.content))
        }
        Err(e) => Some(Err(LlmError::Upstream(format!(
            "Failed to parse Ollama chunk: {e}"
        )))),
    }
}

/// Parse a single OpenAI SSE line. Returns:
/// - Some(Ok(content)) for content deltas
/// - Some(Err(e)) for parse errors
/// - None to skip (empty lines, [DONE], role-only chunks)
fn parse_openai_line(line: &str) -> Option<Result<String, LlmError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let data = line.strip_prefix("data: ")?.trim();
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .first()
                .and_then(|c| c.delta.content.clone())
                .unwrap_or_default();
            if content.is_empty() {
                return None;
            }
            Some(Ok(content))
        }
        Err(e) => Some(Err(LlmError::Upstream(format!(
            "Failed to parse OpenAI chunk: {e}"
        )))),
    }
}

// ─── Line buffering ──────────────────────────────────────

/// Convert a byte stream into a stream of complete lines.
fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String, LlmError>> + Send {
    futures_util::stream::unfold(
        (Box::pin(byte_stream), String::new(), false),
        |(mut stream, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].to_string();
                    buffer.drain(..=newline_pos);
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => {
                        // A broken connection ends the stream after reporting it once.
                        return Some((
                            Err(LlmError::from_message(format!("Stream read error: {e}"))),
                            (stream, buffer, true),
                        ));
                    }
                    None => {
                        if !buffer.trim().is_empty() {
                            let remaining = std::mem::take(&mut buffer);
                            return Some((Ok(remaining), (stream, buffer, true)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

//! Grounded answer assembly: retrieve, build the grounding context, stream the
//! model's answer, then emit the retrieved sources as a trailer.

use std::fmt::Write;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream, StreamExt};

use crate::llm::{Generator, TextStream};
use crate::models::{ChatMessage, ScoredChunk};
use crate::search::hybrid::HybridRetriever;

/// Separates answer text from the JSON sources trailer on the wire.
pub const SOURCES_MARKER: &str = "\n\n__SOURCES__\n";

const MAX_QUESTION_LEN: usize = 2000;
const MAX_HISTORY_TURNS: usize = 10;
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// One item of a streamed answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerEvent {
    /// A fragment of answer text.
    Delta(String),
    /// Generation failed; text already sent stays valid.
    Error(String),
    /// The chunks the answer was grounded on. Always last.
    Sources(Vec<ScoredChunk>),
}

impl AnswerEvent {
    /// Plain-text wire form consumed by the chat frontend.
    pub fn to_wire(&self) -> String {
        match self {
            AnswerEvent::Delta(text) => text.clone(),
            AnswerEvent::Error(message) => format!("\n\n[Error: {message}]"),
            AnswerEvent::Sources(sources) => {
                let json = serde_json::to_string(sources).unwrap_or_else(|_| "[]".to_string());
                format!("{SOURCES_MARKER}{json}")
            }
        }
    }
}

pub type AnswerStream = Pin<Box<dyn Stream<Item = AnswerEvent> + Send>>;

/// Builds grounded answers from the retriever and the generation model.
pub struct AnswerAssembler {
    retriever: Arc<HybridRetriever>,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl AnswerAssembler {
    pub fn new(retriever: Arc<HybridRetriever>, generator: Arc<dyn Generator>, top_k: usize) -> Self {
        Self {
            retriever,
            generator,
            top_k,
        }
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.retriever
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    /// Answer `question`. History only shapes the conversation sent to the
    /// model; retrieval uses the question alone.
    pub async fn answer(&self, question: &str, history: Vec<ChatMessage>, scope_id: Option<i64>) -> AnswerStream {
        let question = sanitize_for_prompt(&truncate_to_char_boundary(question.trim(), MAX_QUESTION_LEN));
        let sources = self.retriever.search(&question, self.top_k, scope_id).await;

        let context_block = build_context_block(&sources);
        let messages = build_messages(
            build_system_prompt(),
            &validate_history(history),
            &context_block,
            &question,
        );

        let trailer = stream::once(async move { AnswerEvent::Sources(sources) });

        match self.generator.stream(&messages).await {
            Ok(llm_stream) => Box::pin(deltas(llm_stream, IDLE_TIMEOUT).chain(trailer)),
            Err(e) => {
                tracing::error!("Generation failed to start: {e}");
                Box::pin(stream::once(async move { AnswerEvent::Error(e.to_string()) }).chain(trailer))
            }
        }
    }
}

/// Map model fragments to events. The first error or idle timeout is emitted
/// once and ends the text part of the answer.
fn deltas(llm_stream: TextStream, idle_timeout: Duration) -> impl Stream<Item = AnswerEvent> + Send {
    stream::unfold(Some(llm_stream), move |state| async move {
        let mut llm_stream = state?;
        match tokio::time::timeout(idle_timeout, llm_stream.next()).await {
            Ok(Some(Ok(content))) => Some((AnswerEvent::Delta(content), Some(llm_stream))),
            Ok(Some(Err(e))) => {
                tracing::warn!("Generation failed mid-stream: {e}");
                Some((AnswerEvent::Error(e.to_string()), None))
            }
            Ok(None) => None,
            Err(_) => Some((AnswerEvent::Error("LLM response timed out (idle)".to_string()), None)),
        }
    })
}

/// Drain an answer stream into its text and sources.
pub async fn collect_answer(mut events: AnswerStream) -> (String, Vec<ScoredChunk>) {
    let mut text = String::new();
    let mut sources = Vec::new();
    while let Some(event) = events.next().await {
        match event {
            AnswerEvent::Delta(delta) => text.push_str(&delta),
            AnswerEvent::Error(message) => {
                let _ = write!(text, "\n\n[Error: {message}]");
            }
            AnswerEvent::Sources(s) => sources = s,
        }
    }
    (text, sources)
}

// ─── Prompt construction ─────────────────────────────────

/// Strip chat-template control tokens so document text or user input cannot
/// open a new role turn.
pub fn sanitize_for_prompt(text: &str) -> String {
    const CONTROL_TOKENS: [&str; 5] = [
        "<|im_start|>",
        "<|im_end|>",
        "<|endoftext|>",
        "<|eot_id|>",
        "<|start_header_id|>",
    ];
    let mut clean = text.to_string();
    for token in CONTROL_TOKENS {
        clean = clean.replace(token, "");
    }
    clean
}

pub fn build_system_prompt() -> String {
    String::from(
        "You are an assistant that answers questions about construction project documents.\n\
         Each user message includes text chunks retrieved from the uploaded documents, each \
         prefixed with >>> and a source tag.\n\
         Answer ONLY from those chunks. Never use outside knowledge.\n\
         Cite sources inline in the form [FILENAME - page X - chunk Y].\n\
         Give a concise answer (1-4 sentences), then a numbered list of the sources you used.\n\
         Be conservative: if the chunks do not contain the answer, say \"Not stated in documents\" \
         and name the documents that might contain it. Never guess.",
    )
}

pub fn build_context_block(sources: &[ScoredChunk]) -> String {
    let mut ctx = String::from("Retrieved document chunks:\n\n");

    if sources.is_empty() {
        ctx.push_str("(No relevant document text was found for this question.)\n");
    } else {
        for chunk in sources {
            let _ = write!(
                ctx,
                ">>> [{} - page {} - chunk {}] {}\n\n",
                chunk.doc_name,
                chunk.page_num,
                chunk.chunk_id,
                sanitize_for_prompt(&chunk.text)
            );
        }
    }

    ctx
}

pub fn build_messages(
    system_prompt: String,
    history: &[ChatMessage],
    context_block: &str,
    question: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: system_prompt,
    });
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: format!("{context_block}---\nQuestion: {question}"),
    });
    messages
}

/// Keep the last user/assistant turns, sanitised and truncated.
fn validate_history(history: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let kept: Vec<ChatMessage> = history
        .into_iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .map(|m| ChatMessage {
            role: m.role,
            content: sanitize_for_prompt(&truncate_to_char_boundary(&m.content, MAX_QUESTION_LEN)),
        })
        .collect();
    let skip = kept.len().saturating_sub(MAX_HISTORY_TURNS);
    kept.into_iter().skip(skip).collect()
}

fn truncate_to_char_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    s.char_indices()
        .take_while(|(i, c)| i + c.len_utf8() <= max_len)
        .map(|(_, c)| c)
        .collect()
}

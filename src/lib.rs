//! # project-brain
//!
//! A retrieval-augmented question answering service over construction
//! project documents. Callers upload extracted page text; the service chunks
//! and embeds it, and answers questions grounded in the retrieved chunks with
//! inline source citations.
//!
//! ## Architecture
//!
//! ```text
//!   Write path                              Read path
//!
//!   ┌──────────────┐                       ┌──────────────┐
//!   │ Page text    │                       │   Question   │
//!   └──────┬───────┘                       └──────┬───────┘
//!          ▼                                      │
//!   ┌──────────────┐                 ┌────────────┴────────────┐
//!   │   Chunker    │                 ▼                         ▼
//!   │ 3200 / 400   │        ┌────────────────┐       ┌──────────────────┐
//!   └──────┬───────┘        │ Vector search  │       │ Keyword matcher  │
//!          ▼                │ exact L2, 2k   │       │ term overlap, 2k │
//!   ┌──────────────┐        └───────┬────────┘       └────────┬─────────┘
//!   │  Embedder    │                │ 1/(1+d)                 │ 0.1 per term
//!   │ retry 2s,4s  │                └────────────┬────────────┘
//!   └──────┬───────┘                             ▼
//!          ▼                         ┌───────────────────────┐
//!   ┌──────────────┐                 │   Additive fusion     │
//!   │ Vector index │◄── scope ──────►│   keep top k          │
//!   │ + metadata   │    filter       └───────────┬───────────┘
//!   └──────────────┘                             ▼
//!                                    ┌───────────────────────┐
//!                                    │ Generator (streamed)  │
//!                                    │ text … __SOURCES__    │
//!                                    └───────────────────────┘
//! ```
//!
//! If vector search fails (embedding provider down or rate limited past the
//! retry ceiling) the retriever serves keyword results alone.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, data dir, LLM, retry and chunking
//! - [`models`] - Shared data types: `Chunk`, `ScoredChunk`, `Conversation`, request/response types
//! - [`error`] - Typed errors for provider calls, chunking, the index, scopes and extraction
//! - [`chunking`] - Overlapping character windows over page text
//! - [`llm`] - `Embedder`/`Generator` traits, HTTP providers and the retry policy
//! - [`search::vector`] - Exact-distance vector index with paired metadata and disk persistence
//! - [`search::lexical`] - Term-overlap keyword matcher
//! - [`search::hybrid`] - Score fusion and the scoped hybrid retriever
//! - [`scopes`] - Conversation registry backing per-conversation isolation
//! - [`ingest`] - Chunk-and-index ingestion of uploaded documents
//! - [`answer`] - Grounded prompt construction and the streamed answer format
//! - [`extraction`] - Door schedule extraction to structured JSON
//! - [`evaluation`] - Keyword test harness over a fixed question set
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod answer;
pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod extraction;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod scopes;
pub mod search;
pub mod state;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the index, metadata and scope registry are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Retry policy for rate-limited provider calls
    pub retry: RetryConfig,
    /// Page chunking parameters (characters)
    pub chunking: ChunkingConfig,
    /// Number of chunks used as grounding context for answers
    pub top_k: usize,
    /// Number of chunks retrieved for structured extraction
    pub extraction_top_k: usize,
    /// Maximum concurrent streamed answers
    pub max_concurrent_queries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for answers and extraction
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub embedding_dim: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8000".to_string(),
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            chunking: ChunkingConfig::default(),
            top_k: 5,
            extraction_top_k: 15,
            max_concurrent_queries: 4,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            embedding_dim: 768,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
        }
    }
}

impl Default for ChunkingConfig {
    // 800 tokens with 100 tokens of overlap, at roughly 4 characters per token.
    fn default() -> Self {
        Self {
            chunk_size: 3_200,
            overlap: 400,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("PROJECT_BRAIN_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("PROJECT_BRAIN_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Some(dim) = parse_env("LLM_EMBEDDING_DIM") {
            config.llm.embedding_dim = dim;
        }
        if let Some(v) = parse_env("RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = v;
        }
        if let Some(v) = parse_env("RETRY_BASE_DELAY_MS") {
            config.retry.base_delay_ms = v;
        }
        if let Some(v) = parse_env("CHUNK_SIZE") {
            config.chunking.chunk_size = v;
        }
        if let Some(v) = parse_env("CHUNK_OVERLAP") {
            config.chunking.overlap = v;
        }
        if let Some(v) = parse_env("SEARCH_TOP_K") {
            config.top_k = v;
        }
        if let Some(v) = parse_env("EXTRACTION_TOP_K") {
            config.extraction_top_k = v;
        }
        if let Some(v) = parse_env("PROJECT_BRAIN_MAX_CONCURRENT_QUERIES") {
            config.max_concurrent_queries = v;
        }

        config
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("vectors.index")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("metadata.json")
    }

    pub fn scopes_path(&self) -> PathBuf {
        self.data_dir.join("scopes.json")
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::answer::AnswerAssembler;
use crate::chunking::Chunker;
use crate::config::Config;
use crate::llm::chat_stream::HttpGenerator;
use crate::llm::embeddings::HttpEmbedder;
use crate::llm::retry::RetryPolicy;
use crate::llm::{Embedder, Generator};
use crate::scopes::ScopeRegistry;
use crate::search::hybrid::HybridRetriever;
use crate::search::vector::{IndexPaths, VectorIndex};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub index: Arc<VectorIndex>,
    pub retriever: Arc<HybridRetriever>,
    pub assembler: Arc<AnswerAssembler>,
    pub generator: Arc<dyn Generator>,
    pub scopes: Arc<ScopeRegistry>,
    pub chunker: Chunker,
    pub query_semaphore: Arc<tokio::sync::Semaphore>,
    /// Cancelled on server shutdown; aborts pending retry delays.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir).context("Failed to create data directory")?;

        let shutdown = CancellationToken::new();
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        let retry = RetryPolicy::from_config(&config.retry);

        let embedder: Arc<dyn Embedder> = Arc::new(
            HttpEmbedder::new(http_client.clone(), config.llm.clone(), retry.clone())
                .with_shutdown(shutdown.clone()),
        );
        let generator: Arc<dyn Generator> = Arc::new(
            HttpGenerator::new(http_client, config.llm.clone(), retry).with_shutdown(shutdown.clone()),
        );

        let paths = IndexPaths {
            index: config.index_path(),
            metadata: config.metadata_path(),
        };
        let index = VectorIndex::open(paths, config.llm.embedding_dim, embedder)
            .context("Failed to open vector index")?;
        let scopes = ScopeRegistry::open(config.scopes_path())?;

        let mut state = Self::with_components(config, index, generator, scopes)?;
        state.shutdown = shutdown;
        Ok(state)
    }

    /// Assemble state from prebuilt components.
    pub fn with_components(
        config: Config,
        index: VectorIndex,
        generator: Arc<dyn Generator>,
        scopes: ScopeRegistry,
    ) -> anyhow::Result<Self> {
        let chunker = Chunker::from_config(&config.chunking).context("Invalid chunking configuration")?;
        let index = Arc::new(index);
        let retriever = Arc::new(HybridRetriever::new(index.clone()));
        let assembler = Arc::new(AnswerAssembler::new(
            retriever.clone(),
            generator.clone(),
            config.top_k,
        ));
        let max_concurrent_queries = config.max_concurrent_queries.max(1);

        Ok(Self {
            config,
            index,
            retriever,
            assembler,
            generator,
            scopes: Arc::new(scopes),
            chunker,
            query_semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent_queries)),
            shutdown: CancellationToken::new(),
        })
    }

    /// Cancel in-flight retries and flush the index.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Err(e) = self.index.persist() {
            tracing::error!("Failed to flush vector index on shutdown: {e}");
        }
    }
}

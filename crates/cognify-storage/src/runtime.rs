//! The `Runtime` composition root (SPEC_FULL §3, §9 REDESIGN FLAGS: "Global
//! mutable state... replace by a `Runtime` struct passed through context;
//! tests inject stubs."). Owns `RuntimeConfig`, the process-wide rate
//! limiter registry, and handles to every storage port; constructed once
//! and threaded through by reference/`Arc` into the pipeline engine and
//! retrievers.

use std::sync::Arc;

use cognify_adapters::{Embedder, LlmProvider, RateLimiterRegistry};
use cognify_core::RuntimeConfig;

use crate::ports::{GraphStore, LoaderRegistry, RelationalStore, VectorStore};
use crate::writer::Writer;

pub struct Runtime {
    pub config: RuntimeConfig,
    pub rate_limiters: RateLimiterRegistry,
    pub relational: Arc<dyn RelationalStore>,
    pub graph: Arc<dyn GraphStore>,
    pub vector: Arc<dyn VectorStore>,
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn Embedder>,
    pub loaders: Arc<LoaderRegistry>,
}

impl Runtime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RuntimeConfig,
        relational: Arc<dyn RelationalStore>,
        graph: Arc<dyn GraphStore>,
        vector: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
        loaders: Arc<LoaderRegistry>,
    ) -> Self {
        Self {
            rate_limiters: RateLimiterRegistry::new(5, 10),
            config,
            relational,
            graph,
            vector,
            llm,
            embedder,
            loaders,
        }
    }

    /// Builds the Writer (§4.5) bound to this runtime's graph/vector stores
    /// and embedder, using the configured `embed.batch` size.
    pub fn writer(&self) -> Writer {
        Writer::new(
            self.graph.clone(),
            self.vector.clone(),
            self.embedder.clone(),
            self.rate_limiters.clone(),
            self.config.embed_batch,
        )
    }
}

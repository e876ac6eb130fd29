//! The Vector Retriever (§4.7): embeds the query, searches the `DocumentChunk`
//! `text` collection, and reconstructs each hit's provenance from the
//! matching graph node's stored properties.

use std::sync::Arc;

use cognify_adapters::{Embedder, RateLimiterRegistry};
use cognify_core::CognifyError;
use cognify_storage::{collection_name, GraphStore, VectorStore};

use crate::item::{provenance_from_properties, RetrievedItem};

const PROVIDER: &str = "embedder";
const RESOURCE: &str = "embed";

pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    rate_limiters: RateLimiterRegistry,
    model: String,
}

impl VectorRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        rate_limiters: RateLimiterRegistry,
    ) -> Self {
        Self { embedder, vector, graph, rate_limiters, model: "default".to_string() }
    }

    /// `GetContext(query, top_k) → [Chunk]` (§4.7). Searches
    /// `{tenant}_{dataset}_documentchunk_text` for the embedded query and
    /// backfills each hit's chunk-index/char-range provenance from the
    /// graph node sharing its id.
    pub async fn get_context(
        &self,
        tenant: &str,
        dataset: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedItem>, CognifyError> {
        let limiter = self.rate_limiters.get(PROVIDER, RESOURCE);
        limiter.acquire().await;
        let mut embeddings = self
            .embedder
            .embed(&self.model, &[query.to_string()])
            .await
            .map_err(|e| e.into_cognify("vector retriever"))?;
        let query_vector = embeddings.pop().unwrap_or_default();

        let collection = collection_name(tenant, dataset, "DocumentChunk", "text");
        let hits = self.vector.search(&collection, &query_vector, top_k).await?;

        let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
        let nodes = self.graph.query_nodes_by_ids(&ids).await?;
        let node_by_id: std::collections::HashMap<&str, &cognify_core::Node> =
            nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let items = hits
            .into_iter()
            .map(|hit| {
                let text = hit
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let provenance = match node_by_id.get(hit.id.as_str()) {
                    Some(node) => provenance_from_properties(&hit.id, &node.properties),
                    None => provenance_from_properties(&hit.id, &std::collections::HashMap::new()),
                };
                RetrievedItem::Chunk {
                    chunk_id: hit.id,
                    text,
                    score: hit.score,
                    provenance,
                }
            })
            .collect();

        Ok(items)
    }
}

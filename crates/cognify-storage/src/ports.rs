//! Storage ports (§6): the three database-shaped interfaces and the
//! document `Loader` interface. Production drivers (Postgres/Neo4j/Qdrant/
//! etc.) are out of scope (§1); only the contracts and one in-memory
//! reference implementation of each exist here, per SPEC_FULL §3.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cognify_core::{CognifyError, DataId, DatasetId, Edge, Node, PipelineRun, RunId};
use serde_json::Value;
use std::collections::HashMap;

/// `RelationalStore`: `CreateRun, UpdateRunStatus, GetRun, ListRuns,
/// PersistData, DedupData(hash) → maybe(id)` (§6).
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn create_run(&self, run: PipelineRun) -> Result<(), CognifyError>;
    async fn update_run(&self, run: PipelineRun) -> Result<(), CognifyError>;
    async fn get_run(&self, run_id: RunId) -> Result<Option<PipelineRun>, CognifyError>;
    async fn list_runs(&self, dataset_id: DatasetId) -> Result<Vec<PipelineRun>, CognifyError>;
    /// Persists a `Data` row's dedup key (`(tenant_id, content_hash)` →
    /// `id`, §3) so repeated ingestion resolves to the same `DataId`.
    async fn persist_data(&self, tenant: &str, content_hash: &str, data_id: DataId) -> Result<(), CognifyError>;
    async fn dedup_data(&self, tenant: &str, content_hash: &str) -> Result<Option<DataId>, CognifyError>;
}

/// `GraphStore`: `AddNodes, AddEdges, QueryNeighbors(id, depth) → [Edge],
/// QueryNodesByIds([id]) → [Node], DeleteSubgraph(datasetId)` (§6).
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn add_nodes(&self, nodes: Vec<Node>) -> Result<(), CognifyError>;
    async fn add_edges(&self, edges: Vec<Edge>) -> Result<(), CognifyError>;
    async fn query_neighbors(&self, id: &str, depth: usize) -> Result<Vec<Edge>, CognifyError>;
    async fn query_nodes_by_ids(&self, ids: &[String]) -> Result<Vec<Node>, CognifyError>;
    async fn delete_subgraph(&self, dataset_id: DatasetId) -> Result<(), CognifyError>;
    /// Not named verbatim by §6 but required by §8's referential-integrity
    /// invariant ("for every edge in the graph, both endpoint nodes
    /// exist") and by the graph retriever (§4.7): list every edge whose
    /// endpoint set the caller already has in hand.
    async fn all_edges(&self) -> Result<Vec<Edge>, CognifyError>;
    async fn all_nodes(&self) -> Result<Vec<Node>, CognifyError>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, Value>,
}

/// `VectorStore`: `Upsert(collection, [{id, vector, payload}]),
/// Search(collection, vector, k) → [{id, score, payload}],
/// DeleteByFilter(filter)` (§6). Collection naming convention:
/// `{tenant}_{dataset}_{type}_{field}` (§6), computed by
/// `collection_name` below.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, collection: &str, records: Vec<cognify_core::VectorRecord>) -> Result<(), CognifyError>;
    async fn search(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<VectorHit>, CognifyError>;
    async fn delete_by_filter(
        &self,
        collection: &str,
        predicate: &(dyn Fn(&HashMap<String, Value>) -> bool + Send + Sync),
    ) -> Result<(), CognifyError>;
    async fn all(&self, collection: &str) -> Result<Vec<cognify_core::VectorRecord>, CognifyError>;
}

/// ASCII-safe, length-capped collection name per §6:
/// `{tenant}_{dataset}_{type}_{field}`.
pub fn collection_name(tenant: &str, dataset: &str, node_type: &str, field: &str) -> String {
    let raw = format!("{tenant}_{dataset}_{type}_{field}", r#type = node_type.to_lowercase());
    let ascii_safe: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    ascii_safe.chars().take(255).collect()
}

#[derive(Debug, Clone)]
pub struct TextBlock {
    pub page: Option<usize>,
    pub line_start: usize,
    pub line_end: usize,
    pub char_start: usize,
    pub char_end: usize,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub text: String,
    pub blocks: Vec<TextBlock>,
}

/// `Loader`: `Load(file) → {text, blocks}` plus `Supports(ext, mime) →
/// bool`. Loaders are registered in a priority-ordered list (§6). A real
/// format-specific parser (PDF, HTML, OCR, audio transcript) is out of
/// scope (§1); only the contract and a plain-text loader exist here.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, path: &str, bytes: &[u8]) -> Result<LoadedDocument, CognifyError>;
    fn supports(&self, ext: &str, mime: &str) -> bool;
    fn name(&self) -> &'static str;
}

/// A priority-ordered list of loaders; the first loader that claims support
/// for the file handles it (§6).
pub struct LoaderRegistry {
    loaders: Vec<std::sync::Arc<dyn Loader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self { loaders: Vec::new() }
    }

    pub fn register(&mut self, loader: std::sync::Arc<dyn Loader>) {
        self.loaders.push(loader);
    }

    pub async fn load(&self, path: &str, ext: &str, mime: &str, bytes: &[u8]) -> Result<LoadedDocument, CognifyError> {
        for loader in &self.loaders {
            if loader.supports(ext, mime) {
                return loader.load(path, bytes).await;
            }
        }
        Err(CognifyError::Validation(format!("no loader registered for ext={ext} mime={mime}")))
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_is_ascii_safe_and_capped() {
        let name = collection_name("tenant one", "dataset/two", "Organization", "name");
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert!(name.len() <= 255);
        assert!(name.contains("organization"));
    }
}

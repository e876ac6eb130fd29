//! In-memory reference implementations of the storage ports, used by tests
//! and `apps/cognify-cli` to exercise the pipeline and retrieval engine
//! end-to-end (SPEC_FULL §3).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cognify_core::{CognifyError, DataId, DatasetId, Edge, Node, PipelineRun, RunId, VectorRecord};
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::ports::{GraphStore, LoadedDocument, Loader, RelationalStore, TextBlock, VectorHit, VectorStore};

#[derive(Default)]
pub struct InMemoryRelationalStore {
    runs: RwLock<HashMap<RunId, PipelineRun>>,
    dedup: RwLock<HashMap<(String, String), DataId>>,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn create_run(&self, run: PipelineRun) -> Result<(), CognifyError> {
        self.runs.write().await.insert(run.id, run);
        Ok(())
    }

    async fn update_run(&self, run: PipelineRun) -> Result<(), CognifyError> {
        self.runs.write().await.insert(run.id, run);
        Ok(())
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<PipelineRun>, CognifyError> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, dataset_id: DatasetId) -> Result<Vec<PipelineRun>, CognifyError> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.dataset_id == dataset_id)
            .cloned()
            .collect())
    }

    async fn persist_data(&self, tenant: &str, content_hash: &str, data_id: DataId) -> Result<(), CognifyError> {
        self.dedup
            .write()
            .await
            .insert((tenant.to_string(), content_hash.to_string()), data_id);
        Ok(())
    }

    async fn dedup_data(&self, tenant: &str, content_hash: &str) -> Result<Option<DataId>, CognifyError> {
        Ok(self
            .dedup
            .read()
            .await
            .get(&(tenant.to_string(), content_hash.to_string()))
            .copied())
    }
}

/// An in-memory property graph: an adjacency list keyed by node id plus the
/// flat node/edge sets the Writer and retrievers need (§4.5, §4.7).
#[derive(Default)]
pub struct InMemoryGraphStore {
    nodes: DashMap<String, Node>,
    edges: RwLock<Vec<Edge>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn add_nodes(&self, nodes: Vec<Node>) -> Result<(), CognifyError> {
        for node in nodes {
            self.nodes.insert(node.id.clone(), node);
        }
        Ok(())
    }

    async fn add_edges(&self, edges: Vec<Edge>) -> Result<(), CognifyError> {
        for edge in &edges {
            if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
                return Err(CognifyError::Integrity(format!(
                    "edge {} -> {} references a missing node",
                    edge.source, edge.target
                )));
            }
        }
        self.edges.write().await.extend(edges);
        Ok(())
    }

    async fn query_neighbors(&self, id: &str, depth: usize) -> Result<Vec<Edge>, CognifyError> {
        let edges = self.edges.read().await;
        let mut frontier: std::collections::HashSet<String> = std::collections::HashSet::new();
        frontier.insert(id.to_string());
        let mut collected = Vec::new();
        let mut visited_edges: std::collections::HashSet<(String, String, String)> = std::collections::HashSet::new();

        for _ in 0..depth.max(1) {
            let mut next_frontier = std::collections::HashSet::new();
            for e in edges.iter() {
                let key = (e.source.clone(), e.target.clone(), e.edge_type.clone());
                if frontier.contains(&e.source) && !visited_edges.contains(&key) {
                    visited_edges.insert(key);
                    collected.push(e.clone());
                    next_frontier.insert(e.target.clone());
                } else if frontier.contains(&e.target) {
                    let key = (e.source.clone(), e.target.clone(), e.edge_type.clone());
                    if !visited_edges.contains(&key) {
                        visited_edges.insert(key);
                        collected.push(e.clone());
                        next_frontier.insert(e.source.clone());
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        Ok(collected)
    }

    async fn query_nodes_by_ids(&self, ids: &[String]) -> Result<Vec<Node>, CognifyError> {
        Ok(ids.iter().filter_map(|id| self.nodes.get(id).map(|n| n.clone())).collect())
    }

    async fn delete_subgraph(&self, dataset_id: DatasetId) -> Result<(), CognifyError> {
        let dataset_str = dataset_id.to_string();
        self.nodes.retain(|_, node| {
            node.properties
                .get("dataset_id")
                .and_then(|v| v.as_str())
                .map(|s| s != dataset_str)
                .unwrap_or(true)
        });
        let remaining_ids: std::collections::HashSet<String> = self.nodes.iter().map(|e| e.key().clone()).collect();
        let mut edges = self.edges.write().await;
        edges.retain(|e| remaining_ids.contains(&e.source) && remaining_ids.contains(&e.target));
        Ok(())
    }

    async fn all_edges(&self) -> Result<Vec<Edge>, CognifyError> {
        Ok(self.edges.read().await.clone())
    }

    async fn all_nodes(&self) -> Result<Vec<Node>, CognifyError> {
        Ok(self.nodes.iter().map(|e| e.value().clone()).collect())
    }
}

/// An in-memory vector collection store, keyed by collection name. Search
/// is exact (brute-force cosine over the collection), acceptable at the
/// scale this reference implementation targets.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: DashMap<String, HashMap<String, VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<(), CognifyError> {
        let mut entry = self.collections.entry(collection.to_string()).or_default();
        for record in records {
            match entry.get(&record.id) {
                Some(existing) if existing.version > record.version => continue,
                _ => {
                    entry.insert(record.id.clone(), record);
                }
            }
        }
        Ok(())
    }

    async fn search(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<VectorHit>, CognifyError> {
        let Some(entry) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<VectorHit> = entry
            .values()
            .map(|record| VectorHit {
                id: record.id.clone(),
                score: cognify_adapters::cosine_similarity(vector, &record.embedding),
                payload: record.payload.clone(),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_by_filter(
        &self,
        collection: &str,
        predicate: &(dyn Fn(&HashMap<String, serde_json::Value>) -> bool + Send + Sync),
    ) -> Result<(), CognifyError> {
        if let Some(mut entry) = self.collections.get_mut(collection) {
            entry.retain(|_, record| !predicate(&record.payload));
        }
        Ok(())
    }

    async fn all(&self, collection: &str) -> Result<Vec<VectorRecord>, CognifyError> {
        Ok(self
            .collections
            .get(collection)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// The only loader this crate needs to exercise the pipeline end-to-end
/// (§1: format-specific parsers are treated as an external `Loader`
/// collaborator). One line per text block, split on blank lines, to give
/// the chunker paragraph boundaries to work with.
pub struct PlainTextLoader;

#[async_trait]
impl Loader for PlainTextLoader {
    async fn load(&self, _path: &str, bytes: &[u8]) -> Result<LoadedDocument, CognifyError> {
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| CognifyError::Validation(format!("not valid utf-8: {e}")))?;
        let line_count = text.lines().count().max(1);
        Ok(LoadedDocument {
            blocks: vec![TextBlock {
                page: None,
                line_start: 0,
                line_end: line_count,
                char_start: 0,
                char_end: text.chars().count(),
            }],
            text,
        })
    }

    fn supports(&self, ext: &str, mime: &str) -> bool {
        ext.eq_ignore_ascii_case("txt") || mime.starts_with("text/plain")
    }

    fn name(&self) -> &'static str {
        "plain_text"
    }
}

pub fn arc_loader_registry() -> crate::ports::LoaderRegistry {
    let mut registry = crate::ports::LoaderRegistry::new();
    registry.register(Arc::new(PlainTextLoader));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use cognify_core::TenantId;

    #[tokio::test]
    async fn relational_store_roundtrips_dedup() {
        let store = InMemoryRelationalStore::new();
        let data_id = DataId::new();
        store.persist_data("tenant-a", "hash1", data_id).await.unwrap();
        assert_eq!(store.dedup_data("tenant-a", "hash1").await.unwrap(), Some(data_id));
        assert_eq!(store.dedup_data("tenant-a", "hash2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn graph_store_rejects_edges_with_missing_endpoints() {
        let store = InMemoryGraphStore::new();
        let edge = Edge {
            source: "missing-1".to_string(),
            target: "missing-2".to_string(),
            edge_type: "works_at".to_string(),
            weight: 1.0,
            confidence: 0.9,
            properties: HashMap::new(),
        };
        let result = store.add_edges(vec![edge]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn graph_store_accepts_edges_between_existing_nodes() {
        let store = InMemoryGraphStore::new();
        store
            .add_nodes(vec![
                Node { id: "a".into(), node_type: "Person".into(), properties: HashMap::new() },
                Node { id: "b".into(), node_type: "Organization".into(), properties: HashMap::new() },
            ])
            .await
            .unwrap();
        store
            .add_edges(vec![Edge {
                source: "a".into(),
                target: "b".into(),
                edge_type: "works_at".into(),
                weight: 1.0,
                confidence: 0.9,
                properties: HashMap::new(),
            }])
            .await
            .unwrap();
        let neighbors = store.query_neighbors("a", 1).await.unwrap();
        assert_eq!(neighbors.len(), 1);
    }

    #[tokio::test]
    async fn vector_store_upsert_is_idempotent_by_version() {
        let store = InMemoryVectorStore::new();
        let record = VectorRecord {
            id: "e1".into(),
            collection: "c".into(),
            embedding: vec![1.0, 0.0],
            payload: HashMap::new(),
            version: 1,
        };
        store.upsert("c", vec![record.clone()]).await.unwrap();
        store.upsert("c", vec![record]).await.unwrap();
        assert_eq!(store.all("c").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn vector_store_search_ranks_by_cosine_similarity() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(
                "c",
                vec![
                    VectorRecord { id: "close".into(), collection: "c".into(), embedding: vec![1.0, 0.0], payload: HashMap::new(), version: 1 },
                    VectorRecord { id: "far".into(), collection: "c".into(), embedding: vec![0.0, 1.0], payload: HashMap::new(), version: 1 },
                ],
            )
            .await
            .unwrap();
        let hits = store.search("c", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].id, "close");
    }

    #[tokio::test]
    async fn plain_text_loader_reports_full_char_range() {
        let loader = PlainTextLoader;
        let doc = loader.load("a.txt", b"hello world").await.unwrap();
        assert_eq!(doc.text, "hello world");
        assert_eq!(doc.blocks[0].char_end, 11);
    }

    #[test]
    fn tenant_id_displays_as_uuid() {
        let tenant = TenantId::new();
        assert!(!tenant.to_string().is_empty());
    }
}

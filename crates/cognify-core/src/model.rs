//! The core data model (§3): Dataset, Data, DocumentChunk, Entity, Relation,
//! VectorRecord and PipelineRun, plus the `GraphProjectable` trait that
//! replaces the source's reflection-driven DataPoint traversal (§9 REDESIGN
//! FLAGS) with an explicit, statically-checked projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::{ChunkId, DataId, DatasetId, EntityId, RunId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub tenant_id: TenantId,
    pub owner_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new(tenant_id: TenantId, owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: DatasetId::new(),
            tenant_id,
            owner_id: owner_id.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// One ingested document. Content is immutable once created; re-ingesting
/// identical bytes for the same tenant resolves to the same id (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Data {
    pub id: DataId,
    pub tenant_id: TenantId,
    pub dataset_ids: Vec<DatasetId>,
    pub content_hash: String,
    pub mime: String,
    pub source_path: String,
    pub token_count: usize,
    pub pipeline_status: PipelineStatus,
}

impl Data {
    pub fn new(
        tenant_id: TenantId,
        dataset_id: DatasetId,
        content_hash: String,
        mime: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        Self {
            id: DataId::derive_from_content(tenant_id, &content_hash),
            tenant_id,
            dataset_ids: vec![dataset_id],
            content_hash,
            mime: mime.into(),
            source_path: source_path.into(),
            token_count: 0,
            pipeline_status: PipelineStatus::Pending,
        }
    }
}

/// Where a cut type came from, for the "chunk whose tokenized length exceeds
/// chunkSize after an over-long single sentence" boundary case in §8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CutType {
    Paragraph,
    Sentence,
    CharacterFallback,
}

/// A contiguous substring of a source document with exact provenance.
/// Never mutated after creation; a re-chunk produces a fresh set of ids
/// because `text_hash` changes with the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub data_id: DataId,
    pub text: String,
    pub chunk_index: usize,
    pub token_count: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub page_number: Option<usize>,
    pub cut_type: CutType,
}

impl GraphProjectable for DocumentChunk {
    fn nodes(&self) -> Vec<Node> {
        let mut props = HashMap::new();
        props.insert("text".to_string(), serde_json::json!(self.text));
        props.insert("chunk_index".to_string(), serde_json::json!(self.chunk_index));
        props.insert("start_char".to_string(), serde_json::json!(self.start_char));
        props.insert("end_char".to_string(), serde_json::json!(self.end_char));
        vec![Node {
            id: self.id.to_string(),
            node_type: "DocumentChunk".to_string(),
            properties: props,
        }]
    }

    fn edges(&self) -> Vec<Edge> {
        Vec::new()
    }

    fn index_fields(&self) -> &'static [&'static str] {
        &["text"]
    }
}

/// A canonical node in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub tenant_id: TenantId,
    pub name: String,
    pub entity_type: String,
    pub description: String,
    pub aliases: Vec<String>,
    pub source_chunks: Vec<ChunkId>,
    pub confidence: f64,
}

impl Entity {
    pub fn new(
        tenant_id: TenantId,
        normalized_name: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        let name = normalized_name.into();
        let entity_type = entity_type.into();
        Self {
            id: EntityId::derive_from_identity(tenant_id, &name, &entity_type),
            tenant_id,
            name,
            entity_type,
            description: String::new(),
            aliases: Vec::new(),
            source_chunks: Vec::new(),
            confidence: 0.0,
        }
    }
}

impl GraphProjectable for Entity {
    fn nodes(&self) -> Vec<Node> {
        let mut props = HashMap::new();
        props.insert("name".to_string(), serde_json::json!(self.name));
        props.insert("description".to_string(), serde_json::json!(self.description));
        props.insert("aliases".to_string(), serde_json::json!(self.aliases));
        props.insert("confidence".to_string(), serde_json::json!(self.confidence));
        vec![Node {
            id: self.id.to_string(),
            node_type: self.entity_type.clone(),
            properties: props,
        }]
    }

    fn edges(&self) -> Vec<Edge> {
        self.source_chunks
            .iter()
            .map(|chunk_id| Edge {
                source: chunk_id.to_string(),
                target: self.id.to_string(),
                edge_type: "mentions".to_string(),
                weight: 1.0,
                confidence: 1.0,
                properties: HashMap::new(),
            })
            .collect()
    }

    fn index_fields(&self) -> &'static [&'static str] {
        &["name", "description"]
    }
}

/// A directed typed edge between two entities (§3). Never mutated post-write
/// — a validator pass drops relations, it does not rewrite them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub relation_type: String,
    pub weight: f64,
    pub confidence: f64,
    pub source_chunk: ChunkId,
    pub properties: HashMap<String, serde_json::Value>,
}

impl GraphProjectable for Relation {
    fn nodes(&self) -> Vec<Node> {
        Vec::new()
    }

    fn edges(&self) -> Vec<Edge> {
        vec![Edge {
            source: self.source_id.to_string(),
            target: self.target_id.to_string(),
            edge_type: self.relation_type.clone(),
            weight: self.weight,
            confidence: self.confidence,
            properties: self.properties.clone(),
        }]
    }

    fn index_fields(&self) -> &'static [&'static str] {
        &[]
    }
}

/// One record in the vector store, keyed by `(node_id, field_name)` via the
/// `collection` naming convention (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub collection: String,
    pub embedding: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
    pub version: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageCounters {
    pub items_in: u64,
    pub items_out: u64,
    pub retries: u64,
    pub low_yield: u64,
    pub dropped_edges: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageProgress {
    pub stage: String,
    pub status: PipelineStatus,
    pub counters: StageCounters,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One invocation of the Cognify pipeline over one dataset (§3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub dataset_id: DatasetId,
    pub user_id: String,
    pub status: PipelineStatus,
    pub stage_progress: Vec<StageProgress>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

impl PipelineRun {
    pub fn new(dataset_id: DatasetId, user_id: impl Into<String>) -> Self {
        Self {
            id: RunId::new(),
            dataset_id,
            user_id: user_id.into(),
            status: PipelineStatus::Running,
            stage_progress: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            PipelineStatus::Completed | PipelineStatus::Failed | PipelineStatus::Cancelled
        )
    }

    pub fn degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A node as projected into the graph store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub node_type: String,
    pub properties: HashMap<String, serde_json::Value>,
}

/// A directed edge as projected into the graph store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub edge_type: String,
    pub weight: f64,
    pub confidence: f64,
    pub properties: HashMap<String, serde_json::Value>,
}

/// Replaces the source's reflection-driven traversal (§9): every type
/// persisted by the Writer declares its own projection into graph nodes and
/// edges, plus which of its fields get embedded.
pub trait GraphProjectable {
    fn nodes(&self) -> Vec<Node>;
    fn edges(&self) -> Vec<Edge>;
    fn index_fields(&self) -> &'static [&'static str];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_projects_a_single_node() {
        let tenant = TenantId::new();
        let mut e = Entity::new(tenant, "acme", "Organization");
        e.source_chunks.push(ChunkId::new());
        let nodes = e.nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_type, "Organization");
        let edges = e.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, "mentions");
    }

    #[test]
    fn entity_index_fields_are_name_and_description() {
        let e = Entity::new(TenantId::new(), "acme", "Organization");
        assert_eq!(e.index_fields(), &["name", "description"]);
    }

    #[test]
    fn relation_projects_a_single_edge_no_nodes() {
        let r = Relation {
            source_id: EntityId::new(),
            target_id: EntityId::new(),
            relation_type: "works_at".to_string(),
            weight: 1.0,
            confidence: 0.9,
            source_chunk: ChunkId::new(),
            properties: HashMap::new(),
        };
        assert!(r.nodes().is_empty());
        assert_eq!(r.edges().len(), 1);
    }

    #[test]
    fn pipeline_run_starts_running_and_not_degraded() {
        let run = PipelineRun::new(DatasetId::new(), "user-1");
        assert_eq!(run.status, PipelineStatus::Running);
        assert!(!run.is_terminal());
        assert!(!run.degraded());
    }

    #[test]
    fn same_content_same_tenant_same_data_id() {
        let tenant = TenantId::new();
        let dataset = DatasetId::new();
        let hash = crate::ids::content_hash(b"hello world");
        let a = Data::new(tenant, dataset, hash.clone(), "text/plain", "a.txt");
        let b = Data::new(tenant, dataset, hash, "text/plain", "b.txt");
        assert_eq!(a.id, b.id);
    }
}

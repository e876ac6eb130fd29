//! The Graph/Vector Writer (§4.5): deduplicates nodes and edges, writes to
//! the graph store, and indexes each node's declared `index_fields` to the
//! vector store in batches. Built on the `GraphProjectable` trait in
//! `cognify-core`, the statically-typed replacement for the reflection-driven
//! DataPoint traversal named in SPEC_FULL §9.

use std::collections::HashMap;
use std::sync::Arc;

use cognify_adapters::{Embedder, RateLimiterRegistry};
use cognify_core::{CognifyError, Edge, GraphProjectable, Node, StageCounters, VectorRecord};
use serde_json::Value;
use tracing::{debug, info};

use crate::ports::{collection_name, GraphStore, VectorStore};

pub struct Writer {
    graph: Arc<dyn GraphStore>,
    vector: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    rate_limiters: RateLimiterRegistry,
    embed_batch: usize,
    embed_model: String,
}

impl Writer {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vector: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        rate_limiters: RateLimiterRegistry,
        embed_batch: usize,
    ) -> Self {
        Self {
            graph,
            vector,
            embedder,
            rate_limiters,
            embed_batch: embed_batch.max(1),
            embed_model: "default".to_string(),
        }
    }

    /// `Write(points) →` (§4.5). `tenant` and `dataset` feed the vector
    /// collection naming convention (§6); `points` is the batch of
    /// `DataPoint`s produced by this run's extraction/resolution stages.
    pub async fn write(
        &self,
        tenant: &str,
        dataset: &str,
        points: &[&dyn GraphProjectable],
    ) -> Result<StageCounters, CognifyError> {
        let mut counters = StageCounters::default();
        counters.items_in = points.len() as u64;

        let (nodes, edges) = self.project(points);
        let deduped_nodes = dedup_nodes(nodes);
        let deduped_edges = dedup_edges(edges);

        let existing_ids: std::collections::HashSet<String> =
            deduped_nodes.iter().map(|n| n.id.clone()).collect();
        let valid_edges: Vec<Edge> = deduped_edges
            .into_iter()
            .filter(|e| {
                let ok = existing_ids.contains(&e.source) && existing_ids.contains(&e.target);
                if !ok {
                    counters.dropped_edges += 1;
                }
                ok
            })
            .collect();

        self.graph.add_nodes(deduped_nodes.clone()).await?;
        self.graph.add_edges(valid_edges).await?;

        let indexed = self.index_nodes(tenant, dataset, points, &deduped_nodes).await?;
        counters.items_out = indexed;

        info!(
            tenant,
            dataset,
            nodes = deduped_nodes.len(),
            dropped_edges = counters.dropped_edges,
            indexed,
            "writer batch committed"
        );
        Ok(counters)
    }

    fn project(&self, points: &[&dyn GraphProjectable]) -> (Vec<Node>, Vec<Edge>) {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for point in points {
            nodes.extend(point.nodes());
            edges.extend(point.edges());
        }
        (nodes, edges)
    }

    /// Embeds each node's declared `index_fields` in batches of
    /// `embed_batch` (default 32, §4.5), each batch gated by the embedder's
    /// rate limiter, and upserts one `VectorRecord` per `(node_id,
    /// field_name)` keyed by the node's own id within a field-specific
    /// collection.
    async fn index_nodes(
        &self,
        tenant: &str,
        dataset: &str,
        points: &[&dyn GraphProjectable],
        nodes: &[Node],
    ) -> Result<u64, CognifyError> {
        let node_by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut tasks: Vec<(String, String, String, String)> = Vec::new(); // (node_id, node_type, field, text)
        for point in points {
            for node in point.nodes() {
                let Some(current) = node_by_id.get(node.id.as_str()) else {
                    continue;
                };
                for field in point.index_fields() {
                    if let Some(text) = field_text(&current.properties, field) {
                        tasks.push((node.id.clone(), node.node_type.clone(), (*field).to_string(), text));
                    }
                }
            }
        }

        let mut indexed = 0u64;
        for batch in tasks.chunks(self.embed_batch) {
            let limiter = self.rate_limiters.get("embedder", "embed");
            limiter.acquire().await;

            let texts: Vec<String> = batch.iter().map(|(_, _, _, text)| text.clone()).collect();
            let embeddings = self
                .embedder
                .embed(&self.embed_model, &texts)
                .await
                .map_err(|e| e.into_cognify("embedder"))?;

            for ((node_id, node_type, field, text), embedding) in batch.iter().zip(embeddings) {
                let collection = collection_name(tenant, dataset, node_type, field);
                let mut payload = HashMap::new();
                payload.insert("field".to_string(), Value::String(field.clone()));
                payload.insert("text".to_string(), Value::String(text.clone()));
                let record = VectorRecord {
                    id: node_id.clone(),
                    collection: collection.clone(),
                    embedding,
                    payload,
                    version: 1,
                };
                self.vector.upsert(&collection, vec![record]).await?;
                indexed += 1;
            }
            debug!(batch_size = batch.len(), "embedded and upserted a batch");
        }

        Ok(indexed)
    }
}

fn field_text(properties: &HashMap<String, Value>, field: &str) -> Option<String> {
    match properties.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Last-write-wins on scalar properties; `aliases` (if present as a JSON
/// array) is merged as a set union (§4.5 step 2).
fn dedup_nodes(nodes: Vec<Node>) -> Vec<Node> {
    let mut by_id: HashMap<String, Node> = HashMap::new();
    for node in nodes {
        by_id
            .entry(node.id.clone())
            .and_modify(|existing| merge_node_into(existing, &node))
            .or_insert(node);
    }
    let mut out: Vec<Node> = by_id.into_values().collect();
    out.sort_by(|a, b| a.id.cmp(&b.id));
    out
}

fn merge_node_into(existing: &mut Node, incoming: &Node) {
    for (key, value) in &incoming.properties {
        if key == "aliases" {
            let merged = merge_alias_arrays(existing.properties.get("aliases"), Some(value));
            existing.properties.insert(key.clone(), merged);
        } else {
            existing.properties.insert(key.clone(), value.clone());
        }
    }
}

fn merge_alias_arrays(a: Option<&Value>, b: Option<&Value>) -> Value {
    let mut set: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    for value in [a, b].into_iter().flatten() {
        if let Value::Array(items) = value {
            for item in items {
                if let Value::String(s) = item {
                    set.insert(s.clone());
                }
            }
        }
    }
    Value::Array(set.into_iter().map(Value::String).collect())
}

/// Dedup by `(source, target, type)`: weights and confidence max-merged
/// (§4.5 step 3).
fn dedup_edges(edges: Vec<Edge>) -> Vec<Edge> {
    let mut by_key: HashMap<(String, String, String), Edge> = HashMap::new();
    for edge in edges {
        let key = (edge.source.clone(), edge.target.clone(), edge.edge_type.clone());
        by_key
            .entry(key)
            .and_modify(|existing| {
                existing.weight = existing.weight.max(edge.weight);
                existing.confidence = existing.confidence.max(edge.confidence);
                for (k, v) in &edge.properties {
                    existing.properties.entry(k.clone()).or_insert_with(|| v.clone());
                }
            })
            .or_insert(edge);
    }
    by_key.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryGraphStore, InMemoryVectorStore};
    use cognify_adapters::StubEmbedder;
    use cognify_core::{ChunkId, Entity, TenantId};

    fn writer() -> Writer {
        Writer::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(StubEmbedder::default()),
            RateLimiterRegistry::new(1000, 1000),
            32,
        )
    }

    #[test]
    fn dedup_nodes_merges_aliases_as_set_union() {
        let mut a = Node { id: "e1".into(), node_type: "Organization".into(), properties: HashMap::new() };
        a.properties.insert("aliases".into(), serde_json::json!(["ACME"]));
        let mut b = a.clone();
        b.properties.insert("aliases".into(), serde_json::json!(["Acme Corp."]));

        let deduped = dedup_nodes(vec![a, b]);
        assert_eq!(deduped.len(), 1);
        let aliases = deduped[0].properties["aliases"].as_array().unwrap();
        assert_eq!(aliases.len(), 2);
    }

    #[test]
    fn dedup_edges_max_merges_weight_and_confidence() {
        let e1 = Edge { source: "a".into(), target: "b".into(), edge_type: "works_at".into(), weight: 0.5, confidence: 0.6, properties: HashMap::new() };
        let mut e2 = e1.clone();
        e2.weight = 0.9;
        e2.confidence = 0.3;

        let deduped = dedup_edges(vec![e1, e2]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].weight, 0.9);
        assert_eq!(deduped[0].confidence, 0.6);
    }

    #[tokio::test]
    async fn write_indexes_entity_name_and_description_fields() {
        let writer = writer();
        let tenant = TenantId::new();
        let mut entity = Entity::new(tenant, "acme", "Organization");
        entity.description = "A widget maker".to_string();
        entity.source_chunks.push(ChunkId::new());

        let points: Vec<&dyn GraphProjectable> = vec![&entity];
        let counters = writer.write("t1", "d1", &points).await.unwrap();
        assert_eq!(counters.items_out, 2); // name + description
    }

    #[tokio::test]
    async fn write_drops_edges_with_endpoints_outside_the_batch() {
        let writer = writer();
        let edge = Edge { source: "ghost-a".into(), target: "ghost-b".into(), edge_type: "x".into(), weight: 1.0, confidence: 1.0, properties: HashMap::new() };

        struct Only(Edge);
        impl GraphProjectable for Only {
            fn nodes(&self) -> Vec<Node> { Vec::new() }
            fn edges(&self) -> Vec<Edge> { vec![self.0.clone()] }
            fn index_fields(&self) -> &'static [&'static str] { &[] }
        }
        let only = Only(edge);
        let points: Vec<&dyn GraphProjectable> = vec![&only];
        let counters = writer.write("t1", "d1", &points).await.unwrap();
        assert_eq!(counters.dropped_edges, 1);
    }

    #[tokio::test]
    async fn rewriting_the_same_batch_is_a_no_op() {
        let writer = writer();
        let tenant = TenantId::new();
        let entity = Entity::new(tenant, "acme", "Organization");
        let points: Vec<&dyn GraphProjectable> = vec![&entity];

        writer.write("t1", "d1", &points).await.unwrap();
        let second = writer.write("t1", "d1", &points).await.unwrap();
        assert_eq!(second.dropped_edges, 0);
    }
}

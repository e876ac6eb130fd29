//! The Graph Retriever (§4.7): seeds a bounded traversal from the entities
//! closest to the query embedding, walks outward via `GraphStore::
//! query_neighbors`, and scores each resulting triplet by a blend of
//! endpoint similarity, edge confidence and a coarse "quality" signal.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use cognify_adapters::{Embedder, RateLimiterRegistry};
use cognify_core::CognifyError;
use cognify_storage::{collection_name, GraphStore, VectorStore};

use crate::item::RetrievedItem;

const PROVIDER: &str = "embedder";
const RESOURCE: &str = "embed";

/// Default traversal bounds (§4.7): depth 2, frontier capped at 50 entities
/// per hop so a densely connected seed doesn't make the walk unbounded.
const DEFAULT_DEPTH: usize = 2;
const DEFAULT_MAX_FRONTIER: usize = 50;
const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Triplet score weights: `w1 * max(subj, obj similarity) + w2 *
/// edge.confidence + w3 * quality`, with quality approximated by the edge's
/// own `weight` field (the nearest thing the model has to "how well formed
/// is this fact" once confidence is already accounted for separately). No
/// single numeric split is given by the source material; 0.5/0.3/0.2 weighs
/// semantic relevance to the query above provenance confidence above
/// generic edge weight, documented as an explicit choice in DESIGN.md.
pub struct TripletWeights {
    pub similarity: f64,
    pub confidence: f64,
    pub quality: f64,
}

impl Default for TripletWeights {
    fn default() -> Self {
        Self { similarity: 0.5, confidence: 0.3, quality: 0.2 }
    }
}

pub struct GraphRetriever {
    embedder: Arc<dyn Embedder>,
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    rate_limiters: RateLimiterRegistry,
    model: String,
    depth: usize,
    max_frontier: usize,
    similarity_threshold: f32,
    weights: TripletWeights,
}

impl GraphRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        rate_limiters: RateLimiterRegistry,
    ) -> Self {
        Self {
            embedder,
            vector,
            graph,
            rate_limiters,
            model: "default".to_string(),
            depth: DEFAULT_DEPTH,
            max_frontier: DEFAULT_MAX_FRONTIER,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            weights: TripletWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: TripletWeights) -> Self {
        self.weights = weights;
        self
    }

    /// `GetContext(query, top_k) → [Triplet]` (§4.7). Finds entities whose
    /// `name`/`description` embedding clears `similarity_threshold`, expands
    /// each seed outward up to `depth` hops (frontier capped at
    /// `max_frontier`), and scores every resulting edge.
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
            .map_err(|e| e.into_cognify("graph retriever"))?;
        let query_vector = embeddings.pop().unwrap_or_default();

        // Vector lookup is capped at max(10*top_k, 50) per §4.7, to give the
        // traversal enough seeds without scanning the entire entity space.
        // Entities are indexed one vector collection per `(node_type,
        // field)` pair (§6), so the entity types actually present in this
        // dataset's graph are enumerated first and each type's `name`
        // collection is searched in turn.
        let seed_k = (top_k * 10).max(50);
        let entity_types: HashSet<String> = self
            .graph
            .all_nodes()
            .await?
            .into_iter()
            .map(|n| n.node_type)
            .filter(|t| t != "DocumentChunk")
            .collect();

        let mut seed_hits = Vec::new();
        for entity_type in &entity_types {
            let collection = collection_name(tenant, dataset, entity_type, "name");
            seed_hits.extend(self.vector.search(&collection, &query_vector, seed_k).await?);
        }
        seed_hits.retain(|hit| hit.score >= self.similarity_threshold);
        seed_hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        seed_hits.truncate(seed_k);

        let mut similarity_by_id: std::collections::HashMap<String, f32> =
            seed_hits.iter().map(|h| (h.id.clone(), h.score)).collect();

        let mut frontier: VecDeque<String> = seed_hits.iter().map(|h| h.id.clone()).collect();
        let mut visited: HashSet<String> = frontier.iter().cloned().collect();
        let mut edges = Vec::new();

        for _ in 0..self.depth.max(1) {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();
            while let Some(id) = frontier.pop_front() {
                let neighbors = self.graph.query_neighbors(&id, 1).await?;
                for edge in neighbors {
                    edges.push(edge.clone());
                    let other = if edge.source == id { edge.target.clone() } else { edge.source.clone() };
                    if visited.insert(other.clone()) && next_frontier.len() < self.max_frontier {
                        next_frontier.push(other);
                    }
                }
            }
            frontier = next_frontier.into_iter().collect();
        }

        edges.dedup_by(|a, b| a.source == b.source && a.target == b.target && a.edge_type == b.edge_type);

        let node_ids: Vec<String> = edges.iter().flat_map(|e| vec![e.source.clone(), e.target.clone()]).collect();
        let nodes = self.graph.query_nodes_by_ids(&node_ids).await?;
        let name_by_id: std::collections::HashMap<&str, String> = nodes
            .iter()
            .map(|n| {
                let name = n.properties.get("name").and_then(|v| v.as_str()).unwrap_or(&n.id).to_string();
                (n.id.as_str(), name)
            })
            .collect();

        // Entities never seen in the vector seed pass default to the cosine
        // similarity of their own embedding against the query when known,
        // or zero otherwise — they were reached purely via graph structure.
        for id in name_by_id.keys() {
            similarity_by_id.entry((*id).to_string()).or_insert(0.0);
        }

        let mut items: Vec<RetrievedItem> = edges
            .into_iter()
            .map(|edge| {
                let subj_sim = similarity_by_id.get(&edge.source).copied().unwrap_or(0.0) as f64;
                let obj_sim = similarity_by_id.get(&edge.target).copied().unwrap_or(0.0) as f64;
                let quality = edge.weight.clamp(0.0, 1.0);
                let score = self.weights.similarity * subj_sim.max(obj_sim)
                    + self.weights.confidence * edge.confidence
                    + self.weights.quality * quality;

                RetrievedItem::Triplet {
                    subject: name_by_id.get(edge.source.as_str()).cloned().unwrap_or(edge.source.clone()),
                    predicate: edge.edge_type.clone(),
                    object: name_by_id.get(edge.target.as_str()).cloned().unwrap_or(edge.target.clone()),
                    source_chunk: None,
                    score: score as f32,
                }
            })
            .collect();

        items.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(std::cmp::Ordering::Equal));
        items.truncate(top_k);

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cognify_adapters::StubEmbedder;
    use cognify_core::{Edge, Node};
    use cognify_storage::{InMemoryGraphStore, InMemoryVectorStore};
    use std::collections::HashMap;

    async fn seeded_graph() -> (Arc<InMemoryGraphStore>, Arc<InMemoryVectorStore>) {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vector = Arc::new(InMemoryVectorStore::new());

        graph
            .add_nodes(vec![
                Node {
                    id: "alice".into(),
                    node_type: "Person".into(),
                    properties: HashMap::from([("name".to_string(), serde_json::json!("Alice"))]),
                },
                Node {
                    id: "acme".into(),
                    node_type: "Organization".into(),
                    properties: HashMap::from([("name".to_string(), serde_json::json!("Acme"))]),
                },
            ])
            .await
            .unwrap();
        graph
            .add_edges(vec![Edge {
                source: "alice".into(),
                target: "acme".into(),
                edge_type: "works_at".into(),
                weight: 0.8,
                confidence: 0.9,
                properties: HashMap::new(),
            }])
            .await
            .unwrap();

        let embedder = StubEmbedder::default();
        let embedding = embedder.embed("default", &["Alice".to_string()]).await.unwrap().remove(0);
        let collection = collection_name("t1", "d1", "Person", "name");
        vector
            .upsert(
                &collection,
                vec![cognify_core::VectorRecord {
                    id: "alice".into(),
                    collection: collection.clone(),
                    embedding,
                    payload: HashMap::new(),
                    version: 1,
                }],
            )
            .await
            .unwrap();

        (graph, vector)
    }

    #[tokio::test]
    async fn traversal_surfaces_the_seeded_edge_as_a_triplet() {
        let (graph, vector) = seeded_graph().await;
        let retriever = GraphRetriever::new(
            Arc::new(StubEmbedder::default()),
            vector,
            graph,
            RateLimiterRegistry::new(1000, 1000),
        );
        let items = retriever.get_context("t1", "d1", "Alice", 5).await.unwrap();
        assert_eq!(items.len(), 1);
        match &items[0] {
            RetrievedItem::Triplet { subject, predicate, object, .. } => {
                assert_eq!(subject, "Alice");
                assert_eq!(predicate, "works_at");
                assert_eq!(object, "Acme");
            }
            _ => panic!("expected a triplet"),
        }
    }

    #[tokio::test]
    async fn no_seeds_above_threshold_yields_no_triplets() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vector = Arc::new(InMemoryVectorStore::new());
        let retriever = GraphRetriever::new(Arc::new(StubEmbedder::default()), vector, graph, RateLimiterRegistry::new(1000, 1000));
        let items = retriever.get_context("t1", "d1", "nothing seeded", 5).await.unwrap();
        assert!(items.is_empty());
    }
}

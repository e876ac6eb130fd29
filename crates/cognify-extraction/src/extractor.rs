//! The Graph Extractor (§4.2): turns one chunk of text into a
//! `KnowledgeGraph` via a structured-output LLM call, under the process-wide
//! rate limiter and retry policy from `cognify-adapters`, with a bounded
//! number of additional retries specifically for malformed/off-schema output.

use std::sync::Arc;

use cognify_adapters::{LlmProvider, ProviderError, RateLimiterRegistry, RetryPolicy};
use cognify_core::{CognifyError, DocumentChunk};
use tracing::warn;

use crate::schema::{knowledge_graph_schema, ExtractedEntity, KnowledgeGraph, DEFAULT_DECLARED_TYPES};

const PROVIDER: &str = "llm";
const RESOURCE: &str = "chat";

pub struct GraphExtractor {
    llm: Arc<dyn LlmProvider>,
    rate_limiters: RateLimiterRegistry,
    retry: RetryPolicy,
    model: String,
    temperature: f64,
    deadline: std::time::Duration,
    max_parse_retries: u32,
    declared_types: Vec<String>,
}

impl GraphExtractor {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        rate_limiters: RateLimiterRegistry,
        retry: RetryPolicy,
        temperature: f64,
        deadline: std::time::Duration,
        max_parse_retries: u32,
    ) -> Self {
        Self {
            llm,
            rate_limiters,
            retry,
            model: "default".to_string(),
            temperature,
            deadline,
            max_parse_retries,
            declared_types: DEFAULT_DECLARED_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_declared_types(mut self, types: Vec<String>) -> Self {
        self.declared_types = types;
        self
    }

    /// `Extract(chunk) → KnowledgeGraph` (§4.2). Unknown entity types are
    /// rewritten to `"Other"` and logged rather than rejected; edges whose
    /// endpoints aren't among the returned nodes are dropped silently. A
    /// zero-node result is not an error: it comes back as an empty graph
    /// with `low_yield` set on the counters the caller accumulates.
    pub async fn extract(&self, chunk: &DocumentChunk) -> Result<KnowledgeGraph, CognifyError> {
        let schema = knowledge_graph_schema(&self.declared_types);
        let prompt = self.build_prompt(&chunk.text);

        let mut last_schema_error = None;
        for parse_attempt in 0..=self.max_parse_retries {
            let limiter = self.rate_limiters.get(PROVIDER, RESOURCE);
            let raw = self
                .retry
                .execute(|| async {
                    limiter.acquire().await;
                    self.llm
                        .structured_complete(&self.model, &prompt, &schema, self.temperature, self.deadline)
                        .await
                })
                .await;

            let value = match raw {
                Ok(value) => value,
                Err(err) => return Err(err.into_cognify("extraction")),
            };

            match serde_json::from_value::<KnowledgeGraph>(value) {
                Ok(graph) => return Ok(self.sanitize(graph)),
                Err(err) => {
                    warn!(
                        attempt = parse_attempt + 1,
                        max_parse_retries = self.max_parse_retries,
                        %err,
                        "extractor received malformed structured output"
                    );
                    last_schema_error = Some(ProviderError::SchemaViolation(err.to_string()));
                }
            }
        }

        Err(last_schema_error
            .unwrap_or_else(|| ProviderError::SchemaViolation("no structured output returned".to_string()))
            .into_cognify("extraction"))
    }

    fn build_prompt(&self, text: &str) -> String {
        format!(
            "Extract entities and relations from the following text as a knowledge graph. \
             Only use entity types from: {}. Text:\n\n{}",
            self.declared_types.join(", "),
            text
        )
    }

    /// Rewrites nodes with an unrecognized `type` to `"Other"` (logging
    /// each), then drops edges whose subject/object aren't among the node
    /// names the same call returned.
    fn sanitize(&self, mut graph: KnowledgeGraph) -> KnowledgeGraph {
        for node in &mut graph.nodes {
            if !self.declared_types.iter().any(|t| t == &node.entity_type) {
                warn!(entity = %node.name, declared_type = %node.entity_type, "rewriting undeclared entity type to Other");
                node.entity_type = "Other".to_string();
            }
        }

        let known_names: std::collections::HashSet<&str> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        let dropped_before = graph.edges.len();
        graph.edges.retain(|edge| known_names.contains(edge.subject.as_str()) && known_names.contains(edge.object.as_str()));
        let dropped = dropped_before - graph.edges.len();
        if dropped > 0 {
            warn!(dropped, "dropped relations whose endpoints were not extracted as nodes");
        }

        graph
    }
}

/// Outcome bookkeeping the pipeline stage accumulates across chunks; not
/// part of the wire schema, purely an in-process tally.
#[derive(Debug, Default)]
pub struct ExtractionTally {
    pub chunks_processed: u64,
    pub low_yield_chunks: u64,
    pub entities_extracted: u64,
    pub relations_extracted: u64,
}

impl ExtractionTally {
    pub fn record(&mut self, graph: &KnowledgeGraph) {
        self.chunks_processed += 1;
        if graph.nodes.is_empty() {
            self.low_yield_chunks += 1;
        }
        self.entities_extracted += graph.nodes.len() as u64;
        self.relations_extracted += graph.edges.len() as u64;
    }
}

pub fn dummy_entity(name: &str, entity_type: &str) -> ExtractedEntity {
    ExtractedEntity {
        name: name.to_string(),
        entity_type: entity_type.to_string(),
        description: String::new(),
        aliases: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cognify_adapters::{ScriptedGraph, StubLlmProvider};
    use cognify_core::{ChunkId, CutType, DataId};
    use serde_json::json;
    use std::time::Duration;

    fn chunk(text: &str) -> DocumentChunk {
        DocumentChunk {
            id: ChunkId::new(),
            data_id: DataId::new(),
            text: text.to_string(),
            chunk_index: 0,
            token_count: text.len() / 4,
            start_line: 0,
            end_line: 0,
            start_char: 0,
            end_char: text.len(),
            page_number: None,
            cut_type: CutType::Paragraph,
        }
    }

    fn extractor(provider: StubLlmProvider) -> GraphExtractor {
        GraphExtractor::new(
            Arc::new(provider),
            RateLimiterRegistry::new(1000, 1000),
            RetryPolicy::new(3).with_backoff(Duration::from_millis(1), Duration::from_millis(2)),
            0.0,
            Duration::from_secs(5),
            2,
        )
    }

    #[tokio::test]
    async fn extracts_a_scripted_graph() {
        let provider = StubLlmProvider::new(vec![ScriptedGraph {
            match_substring: "Alice".to_string(),
            response: json!({
                "nodes": [{"name": "Alice", "type": "Person"}],
                "edges": []
            }),
        }]);
        let extractor = extractor(provider);
        let graph = extractor.extract(&chunk("Alice works at Acme.")).await.unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].entity_type, "Person");
    }

    #[tokio::test]
    async fn zero_node_chunk_is_not_an_error() {
        let extractor = extractor(StubLlmProvider::new(vec![]));
        let graph = extractor.extract(&chunk("nothing extractable here")).await.unwrap();
        assert!(graph.nodes.is_empty());
        assert!(graph.edges.is_empty());
    }

    #[tokio::test]
    async fn undeclared_entity_type_is_rewritten_to_other() {
        let provider = StubLlmProvider::new(vec![ScriptedGraph {
            match_substring: "Bob".to_string(),
            response: json!({
                "nodes": [{"name": "Bob", "type": "Spaceship"}],
                "edges": []
            }),
        }]);
        let extractor = extractor(provider);
        let graph = extractor.extract(&chunk("Bob flies to Mars.")).await.unwrap();
        assert_eq!(graph.nodes[0].entity_type, "Other");
    }

    #[tokio::test]
    async fn edges_with_unknown_endpoints_are_dropped() {
        let provider = StubLlmProvider::new(vec![ScriptedGraph {
            match_substring: "Carol".to_string(),
            response: json!({
                "nodes": [{"name": "Carol", "type": "Person"}],
                "edges": [{"subject": "Carol", "predicate": "knows", "object": "Ghost"}]
            }),
        }]);
        let extractor = extractor(provider);
        let graph = extractor.extract(&chunk("Carol mentioned someone.")).await.unwrap();
        assert!(graph.edges.is_empty());
    }

    #[tokio::test]
    async fn transient_failures_are_retried_transparently() {
        let provider = StubLlmProvider::new(vec![]).failing_first(2);
        let extractor = extractor(provider);
        let graph = extractor.extract(&chunk("anything")).await.unwrap();
        assert!(graph.nodes.is_empty());
    }

    #[tokio::test]
    async fn tally_counts_low_yield_chunks() {
        let mut tally = ExtractionTally::default();
        tally.record(&KnowledgeGraph::default());
        tally.record(&KnowledgeGraph {
            nodes: vec![dummy_entity("X", "Person")],
            edges: vec![],
        });
        assert_eq!(tally.chunks_processed, 2);
        assert_eq!(tally.low_yield_chunks, 1);
        assert_eq!(tally.entities_extracted, 1);
    }
}

//! The Lexical Retriever (§4.7): a BM25 scorer over `DocumentChunk` text,
//! rebuilt from the graph's chunk nodes on every query — the simplest
//! correct approach for an in-memory reference implementation with no
//! persistent lexical index of its own.

use std::collections::HashMap;
use std::sync::Arc;

use cognify_core::CognifyError;
use cognify_storage::GraphStore;

use crate::item::{provenance_from_properties, RetrievedItem};

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Lowercases and splits on non-alphanumeric boundaries, dropping tokens
/// shorter than 2 characters.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() >= 2)
        .map(|s| s.to_string())
        .collect()
}

struct Bm25Index {
    postings: HashMap<String, Vec<(String, usize)>>, // term -> [(doc_id, term_freq)]
    doc_lengths: HashMap<String, usize>,
    doc_texts: HashMap<String, String>,
    avg_doc_length: f32,
    total_docs: usize,
}

impl Bm25Index {
    fn build(docs: &[(String, String)]) -> Self {
        let mut postings: HashMap<String, Vec<(String, usize)>> = HashMap::new();
        let mut doc_lengths = HashMap::new();
        let mut doc_texts = HashMap::new();
        let mut total_len = 0usize;

        for (doc_id, text) in docs {
            let tokens = tokenize(text);
            total_len += tokens.len();
            doc_lengths.insert(doc_id.clone(), tokens.len());
            doc_texts.insert(doc_id.clone(), text.clone());

            let mut term_freq: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *term_freq.entry(token).or_insert(0) += 1;
            }
            for (term, freq) in term_freq {
                postings.entry(term).or_default().push((doc_id.clone(), freq));
            }
        }

        let total_docs = docs.len();
        let avg_doc_length = if total_docs > 0 { total_len as f32 / total_docs as f32 } else { 0.0 };

        Self { postings, doc_lengths, doc_texts, avg_doc_length, total_docs }
    }

    fn idf(&self, term: &str) -> f32 {
        let df = self.postings.get(term).map(|p| p.len()).unwrap_or(0) as f32;
        ((self.total_docs as f32 - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score(&self, query: &str) -> Vec<(String, f32)> {
        let mut scores: HashMap<String, f32> = HashMap::new();
        for term in tokenize(query) {
            let Some(postings) = self.postings.get(&term) else { continue };
            let idf = self.idf(&term);
            for (doc_id, freq) in postings {
                let doc_len = *self.doc_lengths.get(doc_id).unwrap_or(&0) as f32;
                let tf = *freq as f32;
                let denom = tf + K1 * (1.0 - B + B * doc_len / self.avg_doc_length.max(1.0));
                let score = idf * (tf * (K1 + 1.0)) / denom.max(f32::EPSILON);
                *scores.entry(doc_id.clone()).or_insert(0.0) += score;
            }
        }
        let mut ranked: Vec<(String, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

pub struct LexicalRetriever {
    graph: Arc<dyn GraphStore>,
}

impl LexicalRetriever {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// `GetContext(query, top_k) → [Chunk]` (§4.7), scored with BM25
    /// (`k1=1.2, b=0.75`) over every `DocumentChunk` node currently in the
    /// graph.
    pub async fn get_context(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedItem>, CognifyError> {
        let nodes = self.graph.all_nodes().await?;
        let docs: Vec<(String, String)> = nodes
            .iter()
            .filter(|n| n.node_type == "DocumentChunk")
            .filter_map(|n| {
                let text = n.properties.get("text")?.as_str()?.to_string();
                Some((n.id.clone(), text))
            })
            .collect();

        let node_by_id: HashMap<&str, &cognify_core::Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let index = Bm25Index::build(&docs);
        let ranked = index.score(query);

        let items = ranked
            .into_iter()
            .take(top_k)
            .map(|(doc_id, score)| {
                let text = index.doc_texts.get(&doc_id).cloned().unwrap_or_default();
                let provenance = match node_by_id.get(doc_id.as_str()) {
                    Some(node) => provenance_from_properties(&doc_id, &node.properties),
                    None => provenance_from_properties(&doc_id, &HashMap::new()),
                };
                RetrievedItem::Chunk { chunk_id: doc_id, text, score, provenance }
            })
            .collect();

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cognify_core::Node;
    use cognify_storage::InMemoryGraphStore;

    async fn seeded_graph() -> Arc<InMemoryGraphStore> {
        let graph = Arc::new(InMemoryGraphStore::new());
        graph
            .add_nodes(vec![
                Node {
                    id: "c1".into(),
                    node_type: "DocumentChunk".into(),
                    properties: HashMap::from([("text".to_string(), serde_json::json!("Acme makes widgets in Springfield"))]),
                },
                Node {
                    id: "c2".into(),
                    node_type: "DocumentChunk".into(),
                    properties: HashMap::from([("text".to_string(), serde_json::json!("The weather today is sunny"))]),
                },
            ])
            .await
            .unwrap();
        graph
    }

    #[tokio::test]
    async fn bm25_ranks_matching_chunk_above_unrelated_one() {
        let graph = seeded_graph().await;
        let retriever = LexicalRetriever::new(graph);
        let results = retriever.get_context("widgets Acme", 5).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].id(), "c1");
    }

    #[tokio::test]
    async fn query_with_no_matching_terms_returns_empty() {
        let graph = seeded_graph().await;
        let retriever = LexicalRetriever::new(graph);
        let results = retriever.get_context("zzz nonexistent qqq", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn tokenize_lowercases_and_drops_single_char_tokens() {
        let tokens = tokenize("Acme, Inc. is a BIG co.");
        assert!(tokens.contains(&"acme".to_string()));
        assert!(tokens.contains(&"big".to_string()));
        assert!(!tokens.contains(&"a".to_string()));
    }
}

//! Cross-encoder reranking of the fused top-3K (§4.7): "passed to a
//! cross-encoder rerank model... skipped silently if the rerank backend is
//! unavailable." No MMR diversity pass, no multi-provider ensemble, no
//! vendor-specific adapter — just the scoring contract and a deterministic
//! stub.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// One candidate handed to a reranker: a fused item's id, its text, and its
/// pre-rerank (fused) score.
#[derive(Debug, Clone)]
pub struct RerankDocument {
    pub id: String,
    pub content: String,
    pub original_score: f32,
}

#[derive(Debug, Clone)]
pub struct RerankerResult {
    pub id: String,
    pub score: f32,
    pub original_rank: usize,
    pub new_rank: usize,
}

/// The rerank backend contract. A real cross-encoder model call is out of
/// scope (§1); only the contract and a deterministic stub exist here,
/// mirroring `cognify-adapters`'s `LlmProvider`/`Embedder` split between
/// port and stub.
#[async_trait]
pub trait RerankerProvider: Send + Sync {
    async fn score_pairs(&self, query: &str, documents: &[RerankDocument]) -> Vec<f32>;
    fn is_available(&self) -> bool {
        true
    }
}

/// A deterministic stand-in: scores by token-overlap (Jaccard-style) between
/// query and document, in place of a real cross-encoder call.
pub struct StubRerankerProvider {
    available: bool,
}

impl StubRerankerProvider {
    pub fn new() -> Self {
        Self { available: true }
    }

    pub fn unavailable() -> Self {
        Self { available: false }
    }

    fn overlap_score(&self, query: &str, content: &str) -> f32 {
        let q: std::collections::HashSet<String> = query.to_lowercase().split_whitespace().map(String::from).collect();
        let d: std::collections::HashSet<String> = content.to_lowercase().split_whitespace().map(String::from).collect();
        if q.is_empty() || d.is_empty() {
            return 0.0;
        }
        let intersection = q.intersection(&d).count() as f32;
        let union = q.union(&d).count() as f32;
        intersection / union.max(1.0)
    }
}

impl Default for StubRerankerProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RerankerProvider for StubRerankerProvider {
    async fn score_pairs(&self, query: &str, documents: &[RerankDocument]) -> Vec<f32> {
        documents.iter().map(|doc| self.overlap_score(query, &doc.content)).collect()
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

/// Reranks fused results via a cross-encoder provider, caching
/// `(query, doc_id) -> score` so repeated candidates across calls within a
/// process aren't rescored.
pub struct CrossEncoderReranker {
    provider: Arc<dyn RerankerProvider>,
    cache: RwLock<HashMap<(String, String), f32>>,
}

impl CrossEncoderReranker {
    pub fn new(provider: Arc<dyn RerankerProvider>) -> Self {
        Self { provider, cache: RwLock::new(HashMap::new()) }
    }

    /// Returns `None` when the backend is unavailable, matching §4.7's
    /// "skipped silently" fallback — the caller keeps the RRF-fused order.
    pub async fn rerank(&self, query: &str, documents: &[RerankDocument]) -> Option<Vec<RerankerResult>> {
        if !self.provider.is_available() || documents.is_empty() {
            return None;
        }

        let mut to_score = Vec::new();
        let mut scores = vec![0.0f32; documents.len()];
        {
            let cache = self.cache.read().await;
            for (i, doc) in documents.iter().enumerate() {
                let key = (query.to_string(), doc.id.clone());
                match cache.get(&key) {
                    Some(score) => scores[i] = *score,
                    None => to_score.push(i),
                }
            }
        }

        if !to_score.is_empty() {
            let uncached_docs: Vec<RerankDocument> = to_score.iter().map(|&i| documents[i].clone()).collect();
            let fresh = self.provider.score_pairs(query, &uncached_docs).await;
            let mut cache = self.cache.write().await;
            for (idx, score) in to_score.iter().zip(fresh) {
                scores[*idx] = score;
                cache.insert((query.to_string(), documents[*idx].id.clone()), score);
            }
        }

        let mut results: Vec<RerankerResult> = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| RerankerResult { id: doc.id.clone(), score: scores[i], original_rank: i, new_rank: 0 })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        for (new_rank, result) in results.iter_mut().enumerate() {
            result.new_rank = new_rank;
        }
        Some(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, content: &str) -> RerankDocument {
        RerankDocument { id: id.to_string(), content: content.to_string(), original_score: 0.5 }
    }

    #[tokio::test]
    async fn reranks_by_keyword_overlap_with_query() {
        let reranker = CrossEncoderReranker::new(Arc::new(StubRerankerProvider::new()));
        let docs = vec![doc("a", "acme makes widgets"), doc("b", "completely unrelated text")];
        let results = reranker.rerank("acme widgets", &docs).await.unwrap();
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn unavailable_backend_is_skipped_silently() {
        let reranker = CrossEncoderReranker::new(Arc::new(StubRerankerProvider::unavailable()));
        let docs = vec![doc("a", "acme makes widgets")];
        assert!(reranker.rerank("acme", &docs).await.is_none());
    }

    #[tokio::test]
    async fn repeated_candidates_are_served_from_cache() {
        let reranker = CrossEncoderReranker::new(Arc::new(StubRerankerProvider::new()));
        let docs = vec![doc("a", "acme makes widgets")];
        reranker.rerank("acme", &docs).await.unwrap();
        let cached = reranker.cache.read().await;
        assert!(cached.contains_key(&("acme".to_string(), "a".to_string())));
    }
}

//! The Hybrid Retriever (§4.7): runs the vector, graph and lexical
//! retrievers concurrently, fuses their ranked lists by Reciprocal Rank
//! Fusion (`fused(id) = Σ wi/(k + rank_i(id))`), and optionally reranks the
//! fused top-3K.

use std::collections::HashMap;
use std::sync::Arc;

use cognify_adapters::{Embedder, RateLimiterRegistry};
use cognify_core::{CognifyError, HybridWeights};
use cognify_storage::{GraphStore, VectorStore};

use crate::graph_retriever::GraphRetriever;
use crate::item::RetrievedItem;
use crate::lexical_retriever::LexicalRetriever;
use crate::reranker::{CrossEncoderReranker, RerankDocument};
use crate::vector_retriever::VectorRetriever;

/// Strategy priority for RRF tie-breaking (§10 resolution): vector before
/// graph before lexical, then ascending id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Strategy {
    Vector,
    Graph,
    Lexical,
}

struct RankedList {
    strategy: Strategy,
    items: Vec<RetrievedItem>,
}

pub struct HybridRetriever {
    vector_retriever: VectorRetriever,
    graph_retriever: GraphRetriever,
    lexical_retriever: LexicalRetriever,
    reranker: Option<Arc<CrossEncoderReranker>>,
    weights: HybridWeights,
    rrf_k: u32,
}

impl HybridRetriever {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        rate_limiters: RateLimiterRegistry,
        weights: HybridWeights,
        rrf_k: u32,
    ) -> Self {
        Self {
            vector_retriever: VectorRetriever::new(embedder.clone(), vector.clone(), graph.clone(), rate_limiters.clone()),
            graph_retriever: GraphRetriever::new(embedder, vector, graph.clone(), rate_limiters),
            lexical_retriever: LexicalRetriever::new(graph),
            reranker: None,
            weights,
            rrf_k,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<CrossEncoderReranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// `Search(query, topK) → [RetrievedItem]` (§4.7): the three retrievers
    /// run concurrently, each capped at a generous candidate pool so fusion
    /// has enough signal, then RRF-fused down to `top_k` and optionally
    /// reranked.
    pub async fn search(
        &self,
        tenant: &str,
        dataset: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedItem>, CognifyError> {
        let candidate_pool = (top_k * 5).max(50);

        let (vector_result, graph_result, lexical_result) = tokio::join!(
            self.vector_retriever.get_context(tenant, dataset, query, candidate_pool),
            self.graph_retriever.get_context(tenant, dataset, query, candidate_pool),
            self.lexical_retriever.get_context(query, candidate_pool),
        );

        let lists = vec![
            RankedList { strategy: Strategy::Vector, items: vector_result? },
            RankedList { strategy: Strategy::Graph, items: graph_result? },
            RankedList { strategy: Strategy::Lexical, items: lexical_result? },
        ];

        let mut fused = self.fuse(lists);
        fused.truncate((top_k * 3).max(top_k));

        if let Some(reranker) = &self.reranker {
            let documents: Vec<RerankDocument> = fused
                .iter()
                .map(|item| RerankDocument { id: item.id(), content: item.text(), original_score: item.score() })
                .collect();
            if let Some(reranked) = reranker.rerank(query, &documents).await {
                let by_id: HashMap<String, RetrievedItem> = fused.into_iter().map(|item| (item.id(), item)).collect();
                fused = reranked
                    .into_iter()
                    .filter_map(|r| by_id.get(&r.id).map(|item| item.with_score(r.score)))
                    .collect();
            }
        }

        fused.truncate(top_k);
        Ok(fused)
    }

    /// `fused(id) = Σ wi / (k + rank_i(id))` (§4.7/§6), rank is 1-based
    /// within each strategy's own list. Ties after fusion break by strategy
    /// priority (vector > graph > lexical) among whichever strategy ranked
    /// the item highest, then by ascending id (§10 resolution).
    fn fuse(&self, lists: Vec<RankedList>) -> Vec<RetrievedItem> {
        let mut scores: HashMap<String, f64> = HashMap::new();
        let mut best_item: HashMap<String, RetrievedItem> = HashMap::new();
        let mut best_strategy: HashMap<String, Strategy> = HashMap::new();

        for list in &lists {
            let weight = match list.strategy {
                Strategy::Vector => self.weights.vector,
                Strategy::Graph => self.weights.graph,
                Strategy::Lexical => self.weights.lexical,
            };
            for (idx, item) in list.items.iter().enumerate() {
                let rank = (idx + 1) as f64;
                let contribution = weight / (self.rrf_k as f64 + rank);
                let id = item.id();
                *scores.entry(id.clone()).or_insert(0.0) += contribution;

                best_strategy
                    .entry(id.clone())
                    .and_modify(|existing| {
                        if list.strategy < *existing {
                            *existing = list.strategy;
                        }
                    })
                    .or_insert(list.strategy);
                best_item.entry(id).or_insert_with(|| item.clone());
            }
        }

        let mut fused: Vec<RetrievedItem> = scores
            .into_iter()
            .map(|(id, score)| best_item[&id].with_score(score as f32))
            .collect();

        fused.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| best_strategy[&a.id()].cmp(&best_strategy[&b.id()]))
                .then_with(|| a.id().cmp(&b.id()))
        });

        fused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, score: f32) -> RetrievedItem {
        RetrievedItem::Chunk { chunk_id: id.to_string(), text: String::new(), score, provenance: Default::default() }
    }

    fn retriever() -> HybridRetriever {
        // fuse() only needs weights/rrf_k; retrievers themselves are unused
        // by this unit test since it calls fuse() directly.
        HybridRetriever {
            vector_retriever: VectorRetriever::new(
                Arc::new(cognify_adapters::StubEmbedder::default()),
                Arc::new(cognify_storage::InMemoryVectorStore::new()),
                Arc::new(cognify_storage::InMemoryGraphStore::new()),
                RateLimiterRegistry::new(1000, 1000),
            ),
            graph_retriever: GraphRetriever::new(
                Arc::new(cognify_adapters::StubEmbedder::default()),
                Arc::new(cognify_storage::InMemoryVectorStore::new()),
                Arc::new(cognify_storage::InMemoryGraphStore::new()),
                RateLimiterRegistry::new(1000, 1000),
            ),
            lexical_retriever: LexicalRetriever::new(Arc::new(cognify_storage::InMemoryGraphStore::new())),
            reranker: None,
            weights: HybridWeights { vector: 0.4, graph: 0.3, lexical: 0.3 },
            rrf_k: 60,
        }
    }

    /// §8 scenario 4: vector ranks [A,B,C], graph ranks [B,A,D], lexical
    /// ranks [C,E,A], weights 0.4/0.3/0.3, k=60 → top-1 A (~0.01624), top-2 B.
    #[test]
    fn rrf_fusion_matches_the_worked_example() {
        let retriever = retriever();
        let lists = vec![
            RankedList { strategy: Strategy::Vector, items: vec![chunk("A", 0.0), chunk("B", 0.0), chunk("C", 0.0)] },
            RankedList { strategy: Strategy::Graph, items: vec![chunk("B", 0.0), chunk("A", 0.0), chunk("D", 0.0)] },
            RankedList { strategy: Strategy::Lexical, items: vec![chunk("C", 0.0), chunk("E", 0.0), chunk("A", 0.0)] },
        ];
        let fused = retriever.fuse(lists);
        assert_eq!(fused[0].id(), "A");
        assert_eq!(fused[1].id(), "B");
        assert!((fused[0].score() - 0.01624).abs() < 0.0005);
    }

    #[test]
    fn equal_fused_scores_break_by_strategy_priority() {
        let retriever = retriever();
        // Both land at rank 1 in a single, equally-weighted list, so their
        // fused scores are identical; "y" (graph) must outrank "x" (lexical)
        // per the vector > graph > lexical tie-break priority.
        let lists = vec![
            RankedList { strategy: Strategy::Lexical, items: vec![chunk("x", 0.0)] },
            RankedList { strategy: Strategy::Graph, items: vec![chunk("y", 0.0)] },
        ];
        let fused = retriever.fuse(lists);
        assert_eq!(fused[0].id(), "y");
        assert_eq!(fused[1].id(), "x");
    }
}

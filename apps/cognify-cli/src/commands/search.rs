//! The `search` subcommand: ingests the built-in sample dataset (§8 scenario
//! 1), then runs the Hybrid Retriever (§4.7) and optionally the Answer
//! Generator (§4.8) against it.

use std::sync::Arc;

use cognify_adapters::RetryPolicy;
use cognify_retrieval::{AnswerGenerator, CrossEncoderReranker, HybridRetriever, RetrievedItem, StubRerankerProvider};

use crate::commands::seed::{self, IngestOptions};
use crate::output;

pub struct SearchArgs {
    pub query: String,
    pub top_k: usize,
    pub rerank: bool,
    pub answer: bool,
    pub format: String,
}

pub async fn run(args: SearchArgs) -> anyhow::Result<()> {
    let seeded = seed::ingest(&[], IngestOptions::default()).await?;
    let config = &seeded.runtime.config;

    let mut retriever = HybridRetriever::new(
        seeded.runtime.embedder.clone(),
        seeded.runtime.vector.clone(),
        seeded.runtime.graph.clone(),
        seeded.runtime.rate_limiters.clone(),
        config.retrieve_hybrid_weights.clone(),
        config.retrieve_rrf_k,
    );
    if args.rerank {
        retriever = retriever.with_reranker(Arc::new(CrossEncoderReranker::new(Arc::new(StubRerankerProvider::new()))));
    }

    let tenant = seeded.tenant_id.to_string();
    let dataset = seeded.dataset_id.to_string();
    let results = retriever.search(&tenant, &dataset, &args.query, args.top_k).await?;

    let answer = if args.answer {
        let generator = AnswerGenerator::new(
            seeded.runtime.llm.clone(),
            seeded.runtime.rate_limiters.clone(),
            RetryPolicy::new(config.extractor_max_retries as usize),
            config.llm_deadline(),
        );
        Some(generator.generate(&args.query, &results).await?)
    } else {
        None
    };

    if args.format == "json" {
        let payload = serde_json::json!({
            "results": results,
            "answer": answer.as_ref().map(|a| &a.text),
            "citations": answer.as_ref().map(|a| &a.citations),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    output::section("Search results");
    for (rank, item) in results.iter().enumerate() {
        let line = match item {
            RetrievedItem::Chunk { text, .. } => output::truncate(text, 100),
            RetrievedItem::Triplet { subject, predicate, object, .. } => format!("{subject} --{predicate}--> {object}"),
        };
        output::list_item(rank + 1, &format!("[{:.4}] {line}", item.score()));
    }
    if results.is_empty() {
        output::warning("no results");
    }

    if let Some(answer) = answer {
        output::section("Answer");
        println!("{}", answer.text);
    }

    Ok(())
}

//! Shared setup for the `cognify` and `search` commands: builds a `Runtime`
//! over the in-memory reference storage ports and a stub LLM/embedder, and
//! runs `Cognify` over either caller-supplied files or a small built-in
//! sample so `search` has something to query without a second process
//! sharing state (the reference stores are in-memory and do not persist
//! across CLI invocations).

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use cognify_adapters::{ScriptedGraph, StubEmbedder, StubLlmProvider};
use cognify_core::{DatasetId, PipelineStatus, RuntimeConfig, TenantId};
use cognify_pipeline::{CognifyOptions, IngestDocument, PipelineEngine};
use cognify_storage::{arc_loader_registry, InMemoryGraphStore, InMemoryRelationalStore, InMemoryVectorStore, Runtime};
use serde_json::json;

/// §8 scenario 1's sample sentence, used as the default input when the
/// caller passes no files, with scripted extractions so the demo produces a
/// real graph without a live LLM in the loop.
const SAMPLE_TEXT: &str = "Alice works at Acme. Acme is based in Berlin.";

fn sample_scripts() -> Vec<ScriptedGraph> {
    vec![ScriptedGraph {
        match_substring: "Alice works at Acme".to_string(),
        response: json!({
            "nodes": [
                {"name": "Alice", "type": "Person"},
                {"name": "Acme", "type": "Organization"},
                {"name": "Berlin", "type": "Location"}
            ],
            "edges": [
                {"subject": "Alice", "predicate": "works_at", "object": "Acme"},
                {"subject": "Acme", "predicate": "based_in", "object": "Berlin"}
            ]
        }),
    }]
}

pub struct SeededRun {
    pub runtime: Arc<Runtime>,
    pub tenant_id: TenantId,
    pub dataset_id: DatasetId,
    pub run_status: PipelineStatus,
    pub warnings: Vec<String>,
}

pub struct IngestOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub validation_enabled: bool,
    pub resolution_enabled: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self { chunk_size: 512, chunk_overlap: 50, validation_enabled: true, resolution_enabled: true }
    }
}

fn build_runtime() -> Arc<Runtime> {
    Arc::new(Runtime::new(
        RuntimeConfig::default(),
        Arc::new(InMemoryRelationalStore::default()),
        Arc::new(InMemoryGraphStore::default()),
        Arc::new(InMemoryVectorStore::default()),
        Arc::new(StubLlmProvider::new(sample_scripts())),
        Arc::new(StubEmbedder::default()),
        Arc::new(arc_loader_registry()),
    ))
}

fn load_documents(files: &[String]) -> anyhow::Result<Vec<IngestDocument>> {
    if files.is_empty() {
        return Ok(vec![IngestDocument {
            source_path: "sample.txt".to_string(),
            mime: "text/plain".to_string(),
            bytes: SAMPLE_TEXT.as_bytes().to_vec(),
        }]);
    }

    files
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path).with_context(|| format!("reading {path}"))?;
            let mime = if Path::new(path).extension().and_then(|e| e.to_str()) == Some("html") {
                "text/html".to_string()
            } else {
                "text/plain".to_string()
            };
            Ok(IngestDocument { source_path: path.clone(), mime, bytes })
        })
        .collect()
}

/// Runs `Cognify` over `files` (or the built-in sample) and awaits the run
/// to a terminal state, returning the `Runtime` the caller can now query.
pub async fn ingest(files: &[String], opts: IngestOptions) -> anyhow::Result<SeededRun> {
    let runtime = build_runtime();
    let tenant_id = TenantId::new();
    let dataset_id = DatasetId::new();
    let documents = load_documents(files)?;

    let engine = PipelineEngine::new(runtime.clone());
    let cognify_opts = CognifyOptions {
        chunk_size: opts.chunk_size,
        chunk_overlap: opts.chunk_overlap,
        validation_enabled: opts.validation_enabled,
        resolution_enabled: opts.resolution_enabled,
        run_in_background: false,
        ..CognifyOptions::default()
    };

    let run_id = engine.cognify(tenant_id, dataset_id, "cli", documents, cognify_opts).await?;
    let run = runtime
        .relational
        .get_run(run_id)
        .await?
        .context("pipeline run vanished after completion")?;

    Ok(SeededRun { runtime, tenant_id, dataset_id, run_status: run.status, warnings: run.warnings })
}

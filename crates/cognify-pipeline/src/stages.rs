//! The five Pipeline Engine tasks (§4.6), run strictly in sequence by
//! `engine::PipelineEngine::run`: chunking, extraction, validation (optional),
//! resolution (optional) and writing. Each function returns its
//! `StageCounters` plus whatever the next stage needs; none of them know
//! about run bookkeeping or event publication, which stays in `engine.rs`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cognify_chunking::{Chunker, ChunkerConfig, Document};
use cognify_core::{
    ChunkId, CognifyError, DataId, DocumentChunk, Entity, EntityId, Relation, StageCounters,
    TenantId,
};
use cognify_extraction::{ExtractionTally, GraphExtractor, GraphValidator};
use cognify_resolution::{AliasOf, EntityResolver};
use cognify_storage::Runtime;
use futures::StreamExt;
use tracing::warn;

use crate::options::CognifyOptions;

pub struct IngestDocument {
    pub source_path: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Loads and registers each input's `Data` row (dedup key persisted per §6),
/// then hands back a `cognify_chunking::Document` per input that loaded
/// successfully. Not itself one of the five §4.6 tasks — it is the
/// `RelationalStore`/`Loader` bookkeeping that has to happen before chunking
/// can start.
pub async fn prepare_documents(
    runtime: &Runtime,
    tenant: TenantId,
    inputs: Vec<IngestDocument>,
) -> Result<(Vec<Document>, Vec<String>), CognifyError> {
    let mut documents = Vec::with_capacity(inputs.len());
    let mut warnings = Vec::new();

    for input in inputs {
        let ext = Path::new(&input.source_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let loaded = match runtime.loaders.load(&input.source_path, ext, &input.mime, &input.bytes).await {
            Ok(loaded) => loaded,
            Err(err) => {
                warnings.push(format!("{}: {err}", input.source_path));
                continue;
            }
        };

        let hash = cognify_core::content_hash(loaded.text.as_bytes());
        let data_id = DataId::derive_from_content(tenant, &hash);
        runtime.relational.persist_data(&tenant.to_string(), &hash, data_id).await?;

        let page = loaded.blocks.first().and_then(|b| b.page);
        let mut doc = Document::new(data_id, loaded.text);
        if let Some(page) = page {
            doc = doc.with_page(page);
        }
        documents.push(doc);
    }

    Ok((documents, warnings))
}

/// Task 1: Chunking (§4.1, §4.9). A parser failure for one document is
/// recorded and the others proceed; only if every document fails does this
/// return an error (§4.9: "All documents fail" is the run-failure case).
pub fn run_chunking(
    documents: &[Document],
    opts: &CognifyOptions,
) -> Result<(Vec<DocumentChunk>, StageCounters, Vec<String>), CognifyError> {
    let config = ChunkerConfig::new(opts.chunk_size, opts.chunk_overlap)
        .map_err(|e| CognifyError::Validation(e.to_string()))?;
    let chunker = Chunker::new(config);

    let mut chunks = Vec::new();
    let mut warnings = Vec::new();
    let mut counters = StageCounters::default();
    counters.items_in = documents.len() as u64;

    for doc in documents {
        match chunker.split(doc, 0) {
            Ok(doc_chunks) => chunks.extend(doc_chunks),
            Err(err) => {
                warn!(data_id = %doc.data_id, %err, "chunking failed for one document, continuing with the rest");
                warnings.push(err.to_string());
            }
        }
    }

    if !documents.is_empty() && chunks.is_empty() {
        return Err(CognifyError::Validation("every document failed to chunk".to_string()));
    }

    counters.items_out = chunks.len() as u64;
    Ok((chunks, counters, warnings))
}

/// One extracted relation still keyed by entity name, pending the name→id
/// lookup that happens once per chunk right after extraction (§4.2) and the
/// id rewrite validation/resolution may apply afterwards.
pub(crate) struct PendingRelation {
    source_id: EntityId,
    target_id: EntityId,
    relation_type: String,
    confidence: f64,
    source_chunk: ChunkId,
}

/// Confidence assigned to every freshly extracted entity mention; entities
/// are not independently validated (only relations are, §4.3), so this is a
/// fixed prior the resolver's canonicalization tie-break (§4.4 step 7) can
/// still work with.
const EXTRACTED_ENTITY_CONFIDENCE: f64 = 0.7;

/// Task 2: Extraction (§4.2, §5 `parallelStream`). Runs with bounded
/// concurrency (`opts.workers_pool`, default 8); outputs are unordered, same
/// as every `parallelStream` task (§4.6). Any extraction failure aborts the
/// whole run — by the time a `CognifyError` reaches this level the
/// extractor's own retry policy has already been exhausted (§4.9).
pub async fn run_extraction(
    chunks: Vec<DocumentChunk>,
    tenant: TenantId,
    extractor: Arc<GraphExtractor>,
    worker_pool: usize,
) -> Result<(Vec<(DocumentChunk, Vec<Entity>, Vec<PendingRelation>)>, StageCounters, ExtractionTally), CognifyError> {
    let mut counters = StageCounters::default();
    counters.items_in = chunks.len() as u64;

    let results: Vec<Result<(DocumentChunk, Vec<Entity>, Vec<PendingRelation>, ExtractionTally), CognifyError>> =
        futures::stream::iter(chunks.into_iter().map(|chunk| {
            let extractor = extractor.clone();
            async move {
                let graph = extractor.extract(&chunk).await?;
                let mut tally = ExtractionTally::default();
                tally.record(&graph);
                let (entities, relations) = entities_and_relations(tenant, &chunk, &graph);
                Ok((chunk, entities, relations, tally))
            }
        }))
        .buffer_unordered(worker_pool.max(1))
        .collect()
        .await;

    let mut tally = ExtractionTally::default();
    let mut out = Vec::with_capacity(results.len());
    for result in results {
        let (chunk, entities, relations, chunk_tally) = result?;
        counters.low_yield += chunk_tally.low_yield_chunks;
        tally.chunks_processed += chunk_tally.chunks_processed;
        tally.low_yield_chunks += chunk_tally.low_yield_chunks;
        tally.entities_extracted += chunk_tally.entities_extracted;
        tally.relations_extracted += chunk_tally.relations_extracted;
        out.push((chunk, entities, relations));
    }

    counters.items_out = out.iter().map(|(_, e, _)| e.len() as u64).sum();
    Ok((out, counters, tally))
}

fn entities_and_relations(
    tenant: TenantId,
    chunk: &DocumentChunk,
    graph: &cognify_extraction::KnowledgeGraph,
) -> (Vec<Entity>, Vec<PendingRelation>) {
    let mut entities = Vec::with_capacity(graph.nodes.len());
    let mut id_by_name: HashMap<&str, EntityId> = HashMap::new();

    for node in &graph.nodes {
        let normalized = cognify_resolution::normalize::normalize(&node.name);
        let mut entity = Entity::new(tenant, normalized, node.entity_type.clone());
        entity.name = node.name.clone();
        entity.description = node.description.clone();
        entity.aliases = node.aliases.clone();
        entity.source_chunks.push(chunk.id);
        entity.confidence = EXTRACTED_ENTITY_CONFIDENCE;
        id_by_name.insert(node.name.as_str(), entity.id);
        entities.push(entity);
    }

    let mut relations = Vec::with_capacity(graph.edges.len());
    for edge in &graph.edges {
        let (Some(&source_id), Some(&target_id)) =
            (id_by_name.get(edge.subject.as_str()), id_by_name.get(edge.object.as_str()))
        else {
            continue;
        };
        relations.push(PendingRelation {
            source_id,
            target_id,
            relation_type: edge.predicate.clone(),
            confidence: edge.confidence,
            source_chunk: chunk.id,
        });
    }

    (entities, relations)
}

/// Task 3: Validation (§4.3, optional). Never fails the run (§4.9); a
/// dropped relation is metrics-only (§9 open questions, resolved).
pub async fn run_validation(
    extracted: Vec<(DocumentChunk, Vec<Entity>, Vec<PendingRelation>)>,
    validator: &GraphValidator,
    enabled: bool,
) -> (Vec<Entity>, Vec<PendingRelation>, StageCounters, bool) {
    let mut counters = StageCounters::default();
    let mut all_entities = Vec::new();
    let mut all_relations = Vec::new();
    let mut degraded = false;

    for (chunk, entities, relations) in extracted {
        counters.items_in += relations.len() as u64;
        all_entities.extend(entities);

        if !enabled {
            counters.items_out += relations.len() as u64;
            all_relations.extend(relations);
            continue;
        }

        // The validator only sees (subject, predicate, object) strings, so
        // encode each relation's entity ids into those slots and use the same
        // triple to match kept relations back to their `PendingRelation`
        // afterwards — `outcome.kept` is a filtered subset, not index-aligned
        // with the input.
        let extracted_relations: Vec<cognify_extraction::ExtractedRelation> = relations
            .iter()
            .map(|r| cognify_extraction::ExtractedRelation {
                subject: r.source_id.to_string(),
                predicate: r.relation_type.clone(),
                object: r.target_id.to_string(),
                confidence: r.confidence,
            })
            .collect();

        let mut by_triple: HashMap<(String, String, String), Vec<PendingRelation>> = HashMap::new();
        for r in relations {
            by_triple
                .entry((r.source_id.to_string(), r.relation_type.clone(), r.target_id.to_string()))
                .or_default()
                .push(r);
        }

        let outcome = validator.validate(&chunk.text, extracted_relations).await;
        if outcome.degraded {
            degraded = true;
        }
        counters.dropped_edges += outcome.dropped as u64;
        counters.items_out += outcome.kept.len() as u64;

        for kept in outcome.kept {
            let key = (kept.subject.clone(), kept.predicate.clone(), kept.object.clone());
            if let Some(bucket) = by_triple.get_mut(&key) {
                if let Some(mut pending) = bucket.pop() {
                    pending.confidence = kept.confidence;
                    all_relations.push(pending);
                }
            }
        }
    }

    (all_entities, all_relations, counters, degraded)
}

/// Task 4: Resolution (§4.4, optional). A pure, in-memory, whole-batch
/// operation — never retried, never partially applied (§4.9).
pub async fn run_resolution(
    entities: Vec<Entity>,
    relations: Vec<PendingRelation>,
    resolver: &EntityResolver,
    enabled: bool,
) -> Result<(Vec<Entity>, Vec<Relation>, StageCounters), CognifyError> {
    let mut counters = StageCounters::default();
    counters.items_in = entities.len() as u64;

    let (canonical, alias_of): (Vec<Entity>, AliasOf) = if enabled {
        resolver.resolve(entities).await?
    } else {
        (entities, AliasOf::new())
    };
    counters.items_out = canonical.len() as u64;

    let resolve_id = |id: EntityId| alias_of.get(&id).copied().unwrap_or(id);
    let final_relations = relations
        .into_iter()
        .map(|r| Relation {
            source_id: resolve_id(r.source_id),
            target_id: resolve_id(r.target_id),
            relation_type: r.relation_type,
            weight: 1.0,
            confidence: r.confidence,
            source_chunk: r.source_chunk,
            properties: HashMap::new(),
        })
        .collect();

    Ok((canonical, final_relations, counters))
}

/// Task 5: Writing (§4.5, §4.9). Store errors are fatal (§4.9: "on permanent
/// store error fail run"); the in-memory reference stores never return
/// transient errors, so there is no retry layered on top of `Writer::write`
/// here — a driver with genuinely transient failures would wrap its own
/// calls, same as `GraphExtractor` wraps `LlmProvider`.
///
/// `chunks` are written alongside `entities`/`relations` so their
/// `DocumentChunk` nodes exist for the `mentions` edges `Entity::edges`
/// projects (§3), and so their `text` field gets indexed to the vector
/// store (§8 scenario 1's "1 chunk record").
pub async fn run_writing(
    runtime: &Runtime,
    tenant: &str,
    dataset: &str,
    chunks: &[DocumentChunk],
    entities: &[Entity],
    relations: &[Relation],
) -> Result<StageCounters, CognifyError> {
    let writer = runtime.writer();
    let points: Vec<&dyn cognify_core::GraphProjectable> = chunks
        .iter()
        .map(|c| c as &dyn cognify_core::GraphProjectable)
        .chain(entities.iter().map(|e| e as &dyn cognify_core::GraphProjectable))
        .chain(relations.iter().map(|r| r as &dyn cognify_core::GraphProjectable))
        .collect();
    writer.write(tenant, dataset, &points).await
}

/// Checked by the engine between elements and at every I/O boundary (§4.6
/// "Cancellation"); kept here so stage functions that loop per-element can
/// import it without depending on `engine.rs`.
pub fn is_cancelled(flag: &Arc<AtomicBool>) -> bool {
    flag.load(Ordering::Relaxed)
}

//! The Pipeline Engine (§4.6): sequences the five tasks — chunking,
//! extraction, validation, resolution, writing — into one cancellable,
//! resumable `PipelineRun`, and exposes `Cognify`/`SubscribeRun` (§6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cognify_adapters::RetryPolicy;
use cognify_core::{
    CognifyError, DatasetId, PipelineRun, PipelineStatus, Relation, RunEvent, RunEventBus, RunId,
    StageCounters, StageProgress, TenantId,
};
use cognify_extraction::{GraphExtractor, GraphValidator};
use cognify_resolution::{EntityResolver, ResolverConfig};
use cognify_storage::Runtime;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::options::CognifyOptions;
use crate::stages::{self, IngestDocument};

/// Builds the shared `RetryPolicy` (§4.2, §5) used by both the extractor
/// and the validator's LLM calls, from the configured attempt count and
/// backoff bounds rather than `RetryPolicy::default()`, so an operator's
/// `COGNIFY__RETRY_BACKOFF_BASE_SECS` override actually takes effect.
fn retry_policy(config: &cognify_core::RuntimeConfig) -> RetryPolicy {
    RetryPolicy::new(config.extractor_max_retries as usize).with_backoff(
        std::time::Duration::from_secs_f64(config.retry_backoff_base_secs),
        std::time::Duration::from_secs_f64(config.retry_backoff_cap_secs),
    )
}

/// Stage names as they appear on `RunEvent.stage` and `PipelineRun.stage_progress`.
pub const STAGE_CHUNKING: &str = "chunking";
pub const STAGE_EXTRACTION: &str = "extraction";
pub const STAGE_VALIDATION: &str = "validation";
pub const STAGE_RESOLUTION: &str = "resolution";
pub const STAGE_WRITING: &str = "writing";

/// `Cognify(datasets: [id], user, opts) → runId` (§6) is resolved here to one
/// dataset per run: a `PipelineRun` is already scoped to a single
/// `dataset_id` (§3), so a caller wanting to cognify several datasets issues
/// one call per dataset rather than this engine fanning a single run out
/// across many `RelationalStore` rows.
#[derive(Clone)]
pub struct PipelineEngine {
    runtime: Arc<Runtime>,
    buses: Arc<DashMap<RunId, Arc<RunEventBus>>>,
    cancel_flags: Arc<DashMap<RunId, Arc<AtomicBool>>>,
}

impl PipelineEngine {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            buses: Arc::new(DashMap::new()),
            cancel_flags: Arc::new(DashMap::new()),
        }
    }

    /// `Cognify(datasets, user, opts) → runId`. With `opts.run_in_background`
    /// (the default), the run is spawned and this returns as soon as the
    /// `PipelineRun` row is persisted; the caller follows progress via
    /// `subscribe_run`. With it unset, this awaits the run to a terminal
    /// state before returning.
    pub async fn cognify(
        &self,
        tenant_id: TenantId,
        dataset_id: DatasetId,
        user: impl Into<String>,
        documents: Vec<IngestDocument>,
        opts: CognifyOptions,
    ) -> Result<RunId, CognifyError> {
        let run = PipelineRun::new(dataset_id, user);
        let run_id = run.id;
        self.runtime.relational.create_run(run).await?;

        let bus = Arc::new(RunEventBus::new());
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.buses.insert(run_id, bus.clone());
        self.cancel_flags.insert(run_id, cancel_flag.clone());
        bus.publish(RunEvent::run_started(run_id));

        let background = opts.run_in_background;
        let engine = self.clone();
        let drive = async move {
            engine.drive_run(run_id, tenant_id, dataset_id, documents, opts, bus, cancel_flag).await;
        };

        if background {
            tokio::spawn(drive);
        } else {
            drive.await;
        }

        Ok(run_id)
    }

    /// `SubscribeRun(runId) → stream<Event>` (§6). `None` if the run is
    /// unknown to this process (e.g. a different engine instance, or the
    /// run already finished and was evicted — see `forget`).
    pub fn subscribe_run(&self, run_id: RunId) -> Option<broadcast::Receiver<RunEvent>> {
        self.buses.get(&run_id).map(|bus| bus.subscribe())
    }

    /// Requests cancellation (§4.6 "Cancellation"). The run observes this at
    /// the next element or stage boundary, finishes what it already sent to
    /// the extractor/stores, and ends in `Cancelled` rather than stopping
    /// mid-write.
    pub fn cancel_run(&self, run_id: RunId) {
        if let Some(flag) = self.cancel_flags.get(&run_id) {
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// Drops the bookkeeping kept for a finished run's event bus and
    /// cancellation flag. Call once a caller is done following a run's
    /// events; a run that nobody ever subscribes to is safe to forget
    /// immediately after `cognify` returns.
    pub fn forget(&self, run_id: RunId) {
        self.buses.remove(&run_id);
        self.cancel_flags.remove(&run_id);
    }

    async fn drive_run(
        &self,
        run_id: RunId,
        tenant_id: TenantId,
        dataset_id: DatasetId,
        documents: Vec<IngestDocument>,
        opts: CognifyOptions,
        bus: Arc<RunEventBus>,
        cancel_flag: Arc<AtomicBool>,
    ) {
        let tenant = tenant_id.to_string();
        let dataset = dataset_id.to_string();

        let outcome = self.run_stages(run_id, tenant_id, &tenant, &dataset, documents, &opts, &bus, &cancel_flag).await;

        let mut run = match self.runtime.relational.get_run(run_id).await {
            Ok(Some(run)) => run,
            _ => {
                error!(%run_id, "lost the run row while finishing a pipeline run");
                return;
            }
        };
        run.ended_at = Some(chrono::Utc::now());

        match outcome {
            Ok(warnings) => {
                run.warnings.extend(warnings);
                if stages::is_cancelled(&cancel_flag) {
                    run.status = PipelineStatus::Cancelled;
                    bus.publish(RunEvent::run_cancelled(run_id, ""));
                    info!(%run_id, "pipeline run cancelled");
                } else {
                    run.status = PipelineStatus::Completed;
                    bus.publish(RunEvent::run_completed(run_id));
                    info!(%run_id, degraded = run.degraded(), "pipeline run completed");
                }
            }
            Err(err) => {
                run.status = PipelineStatus::Failed;
                run.error = Some(err.to_string());
                bus.publish(RunEvent::run_failed(run_id, "", err.to_string()));
                warn!(%run_id, %err, "pipeline run failed");
            }
        }

        if let Err(err) = self.runtime.relational.update_run(run).await {
            error!(%run_id, %err, "failed to persist final run status");
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_stages(
        &self,
        run_id: RunId,
        tenant_id: TenantId,
        tenant: &str,
        dataset: &str,
        documents: Vec<IngestDocument>,
        opts: &CognifyOptions,
        bus: &RunEventBus,
        cancel_flag: &Arc<AtomicBool>,
    ) -> Result<Vec<String>, CognifyError> {
        let mut warnings = Vec::new();
        let config = &self.runtime.config;

        // Stage 0 (bookkeeping, not one of the five §4.6 tasks): load and
        // register each input document.
        let (loaded, prep_warnings) = stages::prepare_documents(&self.runtime, tenant_id, documents).await?;
        warnings.extend(prep_warnings);

        // Task 1: Chunking.
        self.start_stage(run_id, bus, STAGE_CHUNKING).await;
        let (chunks, counters, chunk_warnings) = stages::run_chunking(&loaded, opts)?;
        warnings.extend(chunk_warnings);
        // Kept alongside `chunks` (moved into extraction next) so the
        // writing stage can persist every chunk's own DocumentChunk node
        // and index its text, independent of which chunks an extraction
        // pass actually produced entities from (§4.5, §8 scenario 1).
        let all_chunks = chunks.clone();
        self.complete_stage(run_id, bus, STAGE_CHUNKING, counters).await;

        if stages::is_cancelled(cancel_flag) {
            return Ok(warnings);
        }

        // Task 2: Extraction.
        self.start_stage(run_id, bus, STAGE_EXTRACTION).await;
        let extractor = Arc::new(GraphExtractor::new(
            self.runtime.llm.clone(),
            self.runtime.rate_limiters.clone(),
            retry_policy(config),
            config.extractor_temperature,
            config.llm_deadline(),
            config.extractor_max_parse_retries,
        ));
        let (extracted, counters, tally) =
            stages::run_extraction(chunks, tenant_id, extractor, config.workers_pool).await?;
        info!(%run_id, entities = tally.entities_extracted, relations = tally.relations_extracted, "extraction finished");
        self.complete_stage(run_id, bus, STAGE_EXTRACTION, counters).await;

        if stages::is_cancelled(cancel_flag) {
            return Ok(warnings);
        }

        // Task 3: Validation (optional).
        self.start_stage(run_id, bus, STAGE_VALIDATION).await;
        let validator = GraphValidator::new(
            if opts.validation_enabled { Some(self.runtime.llm.clone()) } else { None },
            self.runtime.rate_limiters.clone(),
            retry_policy(config),
            config.llm_deadline(),
            config.validate_threshold,
        );
        let (entities, relations, counters, degraded) =
            stages::run_validation(extracted, &validator, opts.validation_enabled).await;
        if degraded {
            warnings.push("validation stage degraded to fixed confidence: no validator model configured".to_string());
        }
        self.complete_stage(run_id, bus, STAGE_VALIDATION, counters).await;

        if stages::is_cancelled(cancel_flag) {
            return Ok(warnings);
        }

        // Task 4: Resolution (optional).
        self.start_stage(run_id, bus, STAGE_RESOLUTION).await;
        let resolver_config = ResolverConfig {
            fuzzy_threshold: config.resolve_fuzzy_threshold,
            embedding_threshold: config.resolve_emb_threshold,
            ..ResolverConfig::default()
        };
        let resolver = EntityResolver::new(resolver_config, Some(self.runtime.embedder.clone()));
        let (entities, relations, counters): (_, Vec<Relation>, _) =
            stages::run_resolution(entities, relations, &resolver, opts.resolution_enabled).await?;
        self.complete_stage(run_id, bus, STAGE_RESOLUTION, counters).await;

        if stages::is_cancelled(cancel_flag) {
            return Ok(warnings);
        }

        // Task 5: Writing.
        self.start_stage(run_id, bus, STAGE_WRITING).await;
        let counters =
            stages::run_writing(&self.runtime, tenant, dataset, &all_chunks, &entities, &relations).await?;
        self.complete_stage(run_id, bus, STAGE_WRITING, counters).await;

        Ok(warnings)
    }

    async fn start_stage(&self, run_id: RunId, bus: &RunEventBus, stage: &str) {
        bus.publish(RunEvent::stage_started(run_id, stage));
        self.push_progress(run_id, stage, PipelineStatus::Running, StageCounters::default()).await;
    }

    async fn complete_stage(&self, run_id: RunId, bus: &RunEventBus, stage: &str, counters: StageCounters) {
        bus.publish(RunEvent::stage_completed(run_id, stage, counters.clone()));
        self.push_progress(run_id, stage, PipelineStatus::Completed, counters).await;
    }

    async fn push_progress(&self, run_id: RunId, stage: &str, status: PipelineStatus, counters: StageCounters) {
        let Ok(Some(mut run)) = self.runtime.relational.get_run(run_id).await else {
            return;
        };
        let now = chrono::Utc::now();
        if let Some(existing) = run.stage_progress.iter_mut().find(|p| p.stage == stage) {
            existing.status = status;
            existing.counters = counters;
            if status == PipelineStatus::Completed {
                existing.completed_at = Some(now);
            }
        } else {
            run.stage_progress.push(StageProgress {
                stage: stage.to_string(),
                status,
                counters,
                started_at: now,
                completed_at: None,
            });
        }
        if let Err(err) = self.runtime.relational.update_run(run).await {
            warn!(%run_id, %err, "failed to persist stage progress");
        }
    }
}

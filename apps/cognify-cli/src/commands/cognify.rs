//! The `cognify` subcommand: ingest files (or the built-in sample) and run
//! the pipeline to completion, printing the run's final status and a
//! summary of the graph it wrote.

use cognify_core::PipelineStatus;

use crate::commands::seed::{self, IngestOptions};
use crate::output;

pub struct CognifyArgs<'a> {
    pub files: Vec<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub validation_enabled: bool,
    pub resolution_enabled: bool,
    pub format: &'a str,
}

pub async fn run(args: CognifyArgs<'_>) -> anyhow::Result<()> {
    let seeded = seed::ingest(
        &args.files,
        IngestOptions {
            chunk_size: args.chunk_size,
            chunk_overlap: args.chunk_overlap,
            validation_enabled: args.validation_enabled,
            resolution_enabled: args.resolution_enabled,
        },
    )
    .await?;

    let nodes = seeded.runtime.graph.all_nodes().await?;
    let edges = seeded.runtime.graph.all_edges().await?;

    if args.format == "json" {
        let summary = serde_json::json!({
            "dataset_id": seeded.dataset_id.to_string(),
            "status": format!("{:?}", seeded.run_status),
            "nodes": nodes.len(),
            "edges": edges.len(),
            "warnings": seeded.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    output::section("Cognify run");
    output::key_value("dataset", &seeded.dataset_id.to_string());
    match seeded.run_status {
        PipelineStatus::Completed => output::success("run completed"),
        PipelineStatus::Cancelled => output::warning("run cancelled"),
        PipelineStatus::Failed => output::error("run failed"),
        other => output::info(&format!("run ended in status {other:?}")),
    }
    output::key_value("nodes written", &nodes.len().to_string());
    output::key_value("edges written", &edges.len().to_string());
    for warning in &seeded.warnings {
        output::warning(warning);
    }

    Ok(())
}

//! Cognify exerciser CLI.
//!
//! Wires the in-memory reference storage ports and stub LLM/embedder into a
//! `Runtime`, then drives the two operations the core exposes (§6): `Cognify`
//! over a set of local files, and `Search` over the resulting graph/vector
//! artifacts. There is no HTTP surface here — both commands run the pipeline
//! and retrieval engine in-process.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "cognify",
    author = "Cognify Pipeline Team",
    version,
    about = "Exerciser CLI for the Cognify pipeline and hybrid retrieval engine"
)]
struct Cli {
    /// Output format (text, json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one or more files into a fresh dataset and run the pipeline
    Cognify {
        /// Paths to plain-text files to ingest
        files: Vec<String>,

        /// Maximum tokens per chunk (§4.1)
        #[arg(long, default_value = "512")]
        chunk_size: usize,

        /// Overlap tokens between consecutive chunks (§4.1)
        #[arg(long, default_value = "50")]
        chunk_overlap: usize,

        /// Skip the graph validator stage (§4.3)
        #[arg(long)]
        no_validation: bool,

        /// Skip the entity resolver stage (§4.4)
        #[arg(long)]
        no_resolution: bool,
    },

    /// Run a hybrid-retrieval query against an ingested dataset
    Search {
        /// Natural-language query
        query: String,

        /// Number of results to return
        #[arg(short, long, default_value = "10")]
        top_k: usize,

        /// Enable cross-encoder reranking of the fused top-3K (§4.7)
        #[arg(long)]
        rerank: bool,

        /// Also call the Answer Generator and print a grounded answer (§4.8)
        #[arg(long)]
        answer: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    tracing_subscriber::fmt::init();

    let result = match cli.command {
        Commands::Cognify { files, chunk_size, chunk_overlap, no_validation, no_resolution } => {
            commands::cognify::run(commands::cognify::CognifyArgs {
                files,
                chunk_size,
                chunk_overlap,
                validation_enabled: !no_validation,
                resolution_enabled: !no_resolution,
                format: &cli.format,
            })
            .await
        }
        Commands::Search { query, top_k, rerank, answer } => {
            commands::search::run(commands::search::SearchArgs {
                query,
                top_k,
                rerank,
                answer,
                format: cli.format.clone(),
            })
            .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}

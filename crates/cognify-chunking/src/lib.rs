//! The Chunker (§4.1): splits ingested document text into `DocumentChunk`s
//! with exact character and line provenance, ready for the Graph Extractor
//! and the vector store.

pub mod chunking;

pub use chunking::{ChunkerConfig, ChunkingError, Chunker, Document};

//! The Graph Extractor (§4.2) and Graph Validator (§4.3): turn a
//! `DocumentChunk` into candidate `KnowledgeGraph` nodes/edges via structured
//! LLM calls, then score each candidate relation's confidence against its
//! source text before the Writer ever sees it.

pub mod extractor;
pub mod schema;
pub mod validator;

pub use extractor::{ExtractionTally, GraphExtractor};
pub use schema::{ExtractedEntity, ExtractedRelation, KnowledgeGraph};
pub use validator::{GraphValidator, ValidationOutcome};

//! The Pipeline Engine: sequences chunking, extraction, validation,
//! resolution and writing into one cancellable, resumable `PipelineRun`
//! (§4.6), exposed as `Cognify`/`SubscribeRun` (§6).

pub mod engine;
pub mod options;
pub mod stages;

pub use engine::{
    PipelineEngine, STAGE_CHUNKING, STAGE_EXTRACTION, STAGE_RESOLUTION, STAGE_VALIDATION, STAGE_WRITING,
};
pub use options::CognifyOptions;
pub use stages::IngestDocument;

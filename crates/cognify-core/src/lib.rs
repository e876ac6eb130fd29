pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod model;

pub use config::{HybridWeights, RuntimeConfig};
pub use error::{CognifyError, Result, RunFailure};
pub use events::{RunEvent, RunEventBus, RunStatus};
pub use ids::{content_hash, ChunkId, DataId, DatasetId, EntityId, RunId, TenantId};
pub use model::{
    CutType, Data, Dataset, DocumentChunk, Edge, Entity, GraphProjectable, Node, PipelineRun,
    PipelineStatus, Relation, StageCounters, StageProgress, VectorRecord,
};

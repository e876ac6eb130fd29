//! `Cognify(datasets, user, opts)`'s `opts` fields (§6).

#[derive(Debug, Clone)]
pub struct CognifyOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Accepted for interface compatibility with the declared `chunker ∈
    /// {text, semantic, llm}` option; only the text splitter (§4.1) is
    /// implemented, so anything else degrades to it with a warning.
    pub chunker: String,
    pub graph_model: String,
    /// `temporal_cognify` is out of scope (§9 open questions); this field is
    /// accepted and ignored.
    pub temporal: bool,
    pub validation_enabled: bool,
    pub resolution_enabled: bool,
    /// `false`: `cognify()` awaits the run to completion before returning.
    /// `true`: the run is spawned and `cognify()` returns as soon as it is
    /// recorded, letting the caller follow along via `subscribe_run`.
    pub run_in_background: bool,
}

impl Default for CognifyOptions {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            chunker: "text".to_string(),
            graph_model: "default".to_string(),
            temporal: false,
            validation_enabled: true,
            resolution_enabled: true,
            run_in_background: true,
        }
    }
}

impl CognifyOptions {
    pub fn from_config(config: &cognify_core::RuntimeConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            ..Default::default()
        }
    }
}

//! Runtime configuration (§6's "Configuration" block), layered the way the
//! rest of the workspace loads config: environment variables over
//! documented defaults, with an optional file layer for local overrides.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridWeights {
    pub vector: f64,
    pub graph: f64,
    pub lexical: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            vector: 0.4,
            graph: 0.3,
            lexical: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default)]
    pub extractor_temperature: f64,
    #[serde(default = "default_extractor_max_retries")]
    pub extractor_max_retries: u32,
    #[serde(default = "default_extractor_max_parse_retries")]
    pub extractor_max_parse_retries: u32,

    #[serde(default = "default_validate_threshold")]
    pub validate_threshold: f64,

    #[serde(default = "default_fuzzy_threshold")]
    pub resolve_fuzzy_threshold: f64,
    #[serde(default = "default_emb_threshold")]
    pub resolve_emb_threshold: f64,

    #[serde(default = "default_top_k")]
    pub retrieve_top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub retrieve_similarity_threshold: f32,
    #[serde(default)]
    pub retrieve_hybrid_weights: HybridWeights,
    #[serde(default = "default_rrf_k")]
    pub retrieve_rrf_k: u32,
    #[serde(default)]
    pub retrieve_rerank_enabled: bool,

    #[serde(default = "default_worker_pool")]
    pub workers_pool: usize,
    #[serde(default = "default_embed_batch")]
    pub embed_batch: usize,

    #[serde(default = "default_deadline_llm_secs")]
    pub deadline_llm_secs: u64,
    #[serde(default = "default_deadline_embed_secs")]
    pub deadline_embed_secs: u64,
    #[serde(default = "default_deadline_db_secs")]
    pub deadline_db_secs: u64,

    #[serde(default = "default_retry_backoff_base_secs")]
    pub retry_backoff_base_secs: f64,
    #[serde(default = "default_retry_backoff_cap_secs")]
    pub retry_backoff_cap_secs: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            extractor_temperature: 0.0,
            extractor_max_retries: default_extractor_max_retries(),
            extractor_max_parse_retries: default_extractor_max_parse_retries(),
            validate_threshold: default_validate_threshold(),
            resolve_fuzzy_threshold: default_fuzzy_threshold(),
            resolve_emb_threshold: default_emb_threshold(),
            retrieve_top_k: default_top_k(),
            retrieve_similarity_threshold: default_similarity_threshold(),
            retrieve_hybrid_weights: HybridWeights::default(),
            retrieve_rrf_k: default_rrf_k(),
            retrieve_rerank_enabled: false,
            workers_pool: default_worker_pool(),
            embed_batch: default_embed_batch(),
            deadline_llm_secs: default_deadline_llm_secs(),
            deadline_embed_secs: default_deadline_embed_secs(),
            deadline_db_secs: default_deadline_db_secs(),
            retry_backoff_base_secs: default_retry_backoff_base_secs(),
            retry_backoff_cap_secs: default_retry_backoff_cap_secs(),
        }
    }
}

impl RuntimeConfig {
    /// Load from `COGNIFY__*` environment variables over the defaults above.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("COGNIFY")
    }

    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(
                Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("chunk_size", default_chunk_size() as i64)?
            .set_default("chunk_overlap", default_chunk_overlap() as i64)?
            .set_default("extractor_temperature", 0.0)?
            .set_default("extractor_max_retries", default_extractor_max_retries() as i64)?
            .set_default(
                "extractor_max_parse_retries",
                default_extractor_max_parse_retries() as i64,
            )?
            .set_default("validate_threshold", default_validate_threshold())?
            .set_default("resolve_fuzzy_threshold", default_fuzzy_threshold())?
            .set_default("resolve_emb_threshold", default_emb_threshold())?
            .set_default("retrieve_top_k", default_top_k() as i64)?
            .set_default("retrieve_similarity_threshold", default_similarity_threshold() as f64)?
            .set_default("retrieve_rrf_k", default_rrf_k() as i64)?
            .set_default("retrieve_rerank_enabled", false)?
            .set_default("workers_pool", default_worker_pool() as i64)?
            .set_default("embed_batch", default_embed_batch() as i64)?
            .set_default("deadline_llm_secs", default_deadline_llm_secs() as i64)?
            .set_default("deadline_embed_secs", default_deadline_embed_secs() as i64)?
            .set_default("deadline_db_secs", default_deadline_db_secs() as i64)?
            .set_default("retry_backoff_base_secs", default_retry_backoff_base_secs())?
            .set_default("retry_backoff_cap_secs", default_retry_backoff_cap_secs())?
            .set_default("retrieve_hybrid_weights.vector", 0.4)?
            .set_default("retrieve_hybrid_weights.graph", 0.3)?
            .set_default("retrieve_hybrid_weights.lexical", 0.3)?;

        builder.build()?.try_deserialize()
    }

    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("COGNIFY").separator("__"));

        builder.build()?.try_deserialize()
    }

    pub fn llm_deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_llm_secs)
    }

    pub fn embed_deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_embed_secs)
    }

    pub fn db_deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_db_secs)
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_extractor_max_retries() -> u32 {
    5
}
fn default_extractor_max_parse_retries() -> u32 {
    2
}
fn default_validate_threshold() -> f64 {
    0.7
}
fn default_fuzzy_threshold() -> f64 {
    0.85
}
fn default_emb_threshold() -> f64 {
    0.90
}
fn default_top_k() -> usize {
    10
}
fn default_similarity_threshold() -> f32 {
    0.7
}
fn default_rrf_k() -> u32 {
    60
}
fn default_worker_pool() -> usize {
    8
}
fn default_embed_batch() -> usize {
    32
}
fn default_deadline_llm_secs() -> u64 {
    60
}
fn default_deadline_embed_secs() -> u64 {
    30
}
fn default_deadline_db_secs() -> u64 {
    10
}
fn default_retry_backoff_base_secs() -> f64 {
    1.0
}
fn default_retry_backoff_cap_secs() -> f64 {
    60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_tunables() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.chunk_size, 512);
        assert_eq!(cfg.chunk_overlap, 50);
        assert_eq!(cfg.extractor_max_retries, 5);
        assert_eq!(cfg.validate_threshold, 0.7);
        assert_eq!(cfg.resolve_fuzzy_threshold, 0.85);
        assert_eq!(cfg.resolve_emb_threshold, 0.90);
        assert_eq!(cfg.retrieve_top_k, 10);
        assert_eq!(cfg.retrieve_rrf_k, 60);
        assert_eq!(cfg.workers_pool, 8);
        assert_eq!(cfg.embed_batch, 32);
        let weights = &cfg.retrieve_hybrid_weights;
        assert!((weights.vector + weights.graph + weights.lexical - 1.0).abs() < 1e-9);
    }

    #[test]
    fn load_from_env_applies_overrides() {
        std::env::set_var("COGNIFYTEST__CHUNK_SIZE", "256");
        let cfg = RuntimeConfig::load_from_env("COGNIFYTEST").unwrap();
        assert_eq!(cfg.chunk_size, 256);
        std::env::remove_var("COGNIFYTEST__CHUNK_SIZE");
    }
}

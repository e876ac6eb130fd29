//! The two provider capabilities the pipeline treats as external
//! collaborators (§1, §6): `LlmProvider::structured_complete` and
//! `Embedder::embed`. Only the contracts live here; wire protocols for any
//! concrete vendor are out of scope.

use std::time::Duration;

use async_trait::async_trait;
use cognify_core::CognifyError;
use serde_json::Value;

/// §6: "Errors partitioned into `{RateLimited(retryAfter), Transient,
/// Permanent, SchemaViolation}`." Kept distinct from `CognifyError` because
/// the retry policy (§4.2, §5) needs to see `RateLimited`'s hint and
/// `SchemaViolation` specifically, while `CognifyError` only needs to know
/// the coarser fatal/retryable split once a component gives up.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {d:?}")).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("permanent provider error: {0}")]
    Permanent(String),

    #[error("schema violation: {0}")]
    SchemaViolation(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. } | ProviderError::Transient(_))
    }

    /// Boundary conversion into the run-wide taxonomy (§7). A
    /// `SchemaViolation` still surviving after `maxParseRetries` becomes a
    /// permanent failure per §4.2.
    pub fn into_cognify(self, context: &str) -> CognifyError {
        match self {
            ProviderError::RateLimited { .. } | ProviderError::Transient(_) => {
                CognifyError::TransientBackend(format!("{context}: {self}"))
            }
            ProviderError::Permanent(_) | ProviderError::SchemaViolation(_) => {
                CognifyError::PermanentBackend(format!("{context}: {self}"))
            }
        }
    }
}

/// `StructuredComplete(prompt, schema) → value` (§1, §4.2).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn structured_complete(
        &self,
        model: &str,
        prompt: &str,
        schema: &Value,
        temperature: f64,
        deadline: Duration,
    ) -> Result<Value, ProviderError>;
}

/// `Embed(texts) → vectors` (§1, §4.5).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

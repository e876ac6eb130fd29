//! Deterministic in-process `LlmProvider`/`Embedder` stand-ins. Production
//! vendor wire protocols are out of scope (§1); these exist so the pipeline
//! and retrieval engine are exercisable end-to-end by tests and
//! `apps/cognify-cli` without a live model in the loop.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::ports::{Embedder, LlmProvider, ProviderError};

/// A scripted extraction answer keyed by a substring of the chunk text the
/// prompt embeds, so unit tests can hand-write a `(subject, predicate,
/// object)` graph for a given sentence without a real model in the loop.
#[derive(Debug, Clone)]
pub struct ScriptedGraph {
    pub match_substring: String,
    pub response: Value,
}

/// A stub `LlmProvider`. Looks up the first scripted response whose
/// `match_substring` appears in the prompt; returns an empty graph
/// otherwise (§4.2's "fallback: if extraction yields zero nodes... a
/// default empty graph is returned").
pub struct StubLlmProvider {
    scripts: Vec<ScriptedGraph>,
    calls: Mutex<usize>,
    fail_calls: usize,
    rate_limited_calls: usize,
}

impl StubLlmProvider {
    pub fn new(scripts: Vec<ScriptedGraph>) -> Self {
        Self {
            scripts,
            calls: Mutex::new(0),
            fail_calls: 0,
            rate_limited_calls: 0,
        }
    }

    /// Fail the first `n` calls with a transient error, to exercise retry.
    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_calls = n;
        self
    }

    /// Return `RateLimited` for the first `n` calls, to exercise the
    /// token-bucket + retry interaction.
    pub fn rate_limited_first(mut self, n: usize) -> Self {
        self.rate_limited_calls = n;
        self
    }

    pub async fn call_count(&self) -> usize {
        *self.calls.lock().await
    }
}

#[async_trait]
impl LlmProvider for StubLlmProvider {
    async fn structured_complete(
        &self,
        _model: &str,
        prompt: &str,
        _schema: &Value,
        _temperature: f64,
        _deadline: Duration,
    ) -> Result<Value, ProviderError> {
        let mut calls = self.calls.lock().await;
        *calls += 1;
        let call_index = *calls;
        drop(calls);

        if call_index <= self.rate_limited_calls {
            return Err(ProviderError::RateLimited {
                retry_after: Some(Duration::from_millis(10)),
            });
        }
        if call_index <= self.fail_calls {
            return Err(ProviderError::Transient("stubbed transient failure".to_string()));
        }

        for script in &self.scripts {
            if prompt.contains(&script.match_substring) {
                return Ok(script.response.clone());
            }
        }

        Ok(json!({ "nodes": [], "edges": [] }))
    }
}

/// A deterministic bag-of-characters embedder: hashes each text into a
/// fixed-dimension vector so cosine similarity behaves sensibly for tests
/// (similar strings produce similar vectors) without depending on a real
/// embedding model.
pub struct StubEmbedder {
    dims: usize,
}

impl StubEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        let normalized = text.to_lowercase();
        for (i, byte) in normalized.bytes().enumerate() {
            vector[i % self.dims] += byte as f32;
        }
        for gram in normalized.as_bytes().windows(3) {
            let hash: u32 = gram.iter().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u32));
            vector[(hash as usize) % self.dims] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for StubEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Cosine similarity between two equal-length vectors, used by the resolver
/// (§4.4) and vector retriever (§4.7).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

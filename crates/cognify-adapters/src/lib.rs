//! Provider ports (§1, §6), process-wide rate limiting and retry/circuit
//! breaker resilience (§5) for LLM and embedder calls.

pub mod circuit_breaker;
pub mod ports;
pub mod rate_limit;
pub mod retry;
pub mod stub;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use ports::{Embedder, LlmProvider, ProviderError};
pub use rate_limit::{RateLimiter, RateLimiterRegistry};
pub use retry::{with_retry, RetryPolicy};
pub use stub::{cosine_similarity, ScriptedGraph, StubEmbedder, StubLlmProvider};

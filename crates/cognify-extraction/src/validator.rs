//! The Graph Validator (§4.3): scores each extracted relation's confidence
//! against its source chunk text via a secondary LLM call, dropping
//! relations below threshold. If no validator model is configured the stage
//! degrades to a fixed default score for every relation rather than failing
//! the run (§4.3, §7 `Degraded`).

use std::sync::Arc;
use std::time::Duration;

use cognify_adapters::{LlmProvider, RateLimiterRegistry, RetryPolicy};
use serde_json::json;
use tracing::warn;

use crate::schema::ExtractedRelation;

const PROVIDER: &str = "llm";
const RESOURCE: &str = "chat";
const DEGRADED_SCORE: f64 = 0.5;

pub struct GraphValidator {
    llm: Option<Arc<dyn LlmProvider>>,
    rate_limiters: RateLimiterRegistry,
    retry: RetryPolicy,
    model: String,
    deadline: Duration,
    threshold: f64,
}

/// Result of validating one chunk's candidate relations: the ones kept, and
/// whether the pass degraded to the fixed default score.
pub struct ValidationOutcome {
    pub kept: Vec<ExtractedRelation>,
    pub dropped: usize,
    pub degraded: bool,
}

impl GraphValidator {
    pub fn new(
        llm: Option<Arc<dyn LlmProvider>>,
        rate_limiters: RateLimiterRegistry,
        retry: RetryPolicy,
        deadline: Duration,
        threshold: f64,
    ) -> Self {
        Self {
            llm,
            rate_limiters,
            retry,
            model: "default".to_string(),
            deadline,
            threshold,
        }
    }

    /// `Validate(chunkText, relation) → confidence` applied to every
    /// candidate relation extracted from `chunk_text`. Relations scoring
    /// below `threshold` are dropped; this never fails the run, it only
    /// feeds `StageCounters.dropped_edges` on the caller side (§4.3: "a
    /// validator-dropped relation is a metric, not a failure").
    pub async fn validate(&self, chunk_text: &str, relations: Vec<ExtractedRelation>) -> ValidationOutcome {
        let Some(llm) = &self.llm else {
            warn!("graph validator has no backing model configured, degrading to default confidence for all relations");
            return ValidationOutcome {
                kept: relations,
                dropped: 0,
                degraded: true,
            };
        };

        let mut kept = Vec::with_capacity(relations.len());
        let mut dropped = 0;

        for relation in relations {
            let score = match self.score(llm.as_ref(), chunk_text, &relation).await {
                Ok(score) => score,
                Err(err) => {
                    warn!(%err, "relation confidence scoring failed, defaulting to degraded score");
                    DEGRADED_SCORE
                }
            };
            if score >= self.threshold {
                let mut relation = relation;
                relation.confidence = score;
                kept.push(relation);
            } else {
                dropped += 1;
            }
        }

        ValidationOutcome {
            kept,
            dropped,
            degraded: false,
        }
    }

    async fn score(
        &self,
        llm: &dyn LlmProvider,
        chunk_text: &str,
        relation: &ExtractedRelation,
    ) -> Result<f64, cognify_adapters::ProviderError> {
        let schema = json!({
            "type": "object",
            "required": ["confidence"],
            "properties": { "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 } }
        });
        let prompt = format!(
            "On a scale from 0.0 to 1.0, how well is the relation \"{} {} {}\" supported by this text?\n\n{}",
            relation.subject, relation.predicate, relation.object, chunk_text
        );

        let limiter = self.rate_limiters.get(PROVIDER, RESOURCE);
        let value = self
            .retry
            .execute(|| async {
                limiter.acquire().await;
                llm.structured_complete(&self.model, &prompt, &schema, 0.0, self.deadline).await
            })
            .await?;

        Ok(value["confidence"].as_f64().unwrap_or(DEGRADED_SCORE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cognify_adapters::StubLlmProvider;

    fn relation(subject: &str) -> ExtractedRelation {
        ExtractedRelation {
            subject: subject.to_string(),
            predicate: "works_at".to_string(),
            object: "Acme".to_string(),
            confidence: 0.0,
        }
    }

    fn validator(llm: Option<Arc<dyn LlmProvider>>, threshold: f64) -> GraphValidator {
        GraphValidator::new(
            llm,
            RateLimiterRegistry::new(1000, 1000),
            RetryPolicy::new(2).with_backoff(Duration::from_millis(1), Duration::from_millis(2)),
            Duration::from_secs(5),
            threshold,
        )
    }

    #[tokio::test]
    async fn without_a_validator_model_everything_is_kept_at_degraded_confidence() {
        let validator = validator(None, 0.7);
        let outcome = validator.validate("Alice works at Acme.", vec![relation("Alice")]).await;
        assert!(outcome.degraded);
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.dropped, 0);
    }

    #[tokio::test]
    async fn relations_scoring_below_threshold_are_dropped() {
        let provider: Arc<dyn LlmProvider> = Arc::new(StubLlmProvider::new(vec![]));
        let validator = validator(Some(provider), 0.7);
        // StubLlmProvider with no scripts falls back to `{"nodes":[],"edges":[]}`,
        // which has no "confidence" key, so the score defaults to 0.5 — below
        // the 0.7 threshold, so the relation is dropped.
        let outcome = validator.validate("Alice works at Acme.", vec![relation("Alice")]).await;
        assert!(!outcome.degraded);
        assert_eq!(outcome.kept.len(), 0);
        assert_eq!(outcome.dropped, 1);
    }

    #[tokio::test]
    async fn relations_scoring_at_or_above_threshold_are_kept() {
        let provider: Arc<dyn LlmProvider> = Arc::new(StubLlmProvider::new(vec![]));
        let validator = validator(Some(provider), 0.3);
        let outcome = validator.validate("Alice works at Acme.", vec![relation("Alice")]).await;
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].confidence, 0.5);
    }
}

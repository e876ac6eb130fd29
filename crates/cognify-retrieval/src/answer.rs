//! The Answer Generator (§4.8): formats a grounded prompt with numbered
//! citations from the retrieved context and asks the LLM provider for a
//! verbatim answer. The only LLM-calling primitive exposed by
//! `cognify_adapters::LlmProvider` is `structured_complete` (schema-based),
//! so free-text completion is adapted into a one-field `{"answer": string}`
//! schema and the field is returned as-is — documented as an explicit
//! adaptation in DESIGN.md.

use std::sync::Arc;

use cognify_adapters::{LlmProvider, RateLimiterRegistry, RetryPolicy};
use cognify_core::CognifyError;
use serde_json::{json, Value};

use crate::item::RetrievedItem;

const PROVIDER: &str = "llm";
const RESOURCE: &str = "chat";
const FALLBACK_TEXT: &str = "No information available in the provided context.";

fn answer_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "answer": {"type": "string"}
        },
        "required": ["answer"]
    })
}

#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub text: String,
    pub citations: Vec<String>,
}

pub struct AnswerGenerator {
    llm: Arc<dyn LlmProvider>,
    rate_limiters: RateLimiterRegistry,
    retry: RetryPolicy,
    model: String,
    temperature: f64,
    deadline: std::time::Duration,
}

impl AnswerGenerator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        rate_limiters: RateLimiterRegistry,
        retry: RetryPolicy,
        deadline: std::time::Duration,
    ) -> Self {
        Self { llm, rate_limiters, retry, model: "default".to_string(), temperature: 0.3, deadline }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// `GenerateAnswer(query, context) → {text, citations}` (§4.8). With no
    /// retrieved context, returns the fixed fallback text and no citations
    /// without calling the LLM at all.
    pub async fn generate(&self, query: &str, context: &[RetrievedItem]) -> Result<GeneratedAnswer, CognifyError> {
        if context.is_empty() {
            return Ok(GeneratedAnswer { text: FALLBACK_TEXT.to_string(), citations: Vec::new() });
        }

        let prompt = self.build_prompt(query, context);
        let schema = answer_schema();
        let limiter = self.rate_limiters.get(PROVIDER, RESOURCE);

        let value = self
            .retry
            .execute(|| async {
                limiter.acquire().await;
                self.llm.structured_complete(&self.model, &prompt, &schema, self.temperature, self.deadline).await
            })
            .await
            .map_err(|e| e.into_cognify("answer generator"))?;

        let text = value
            .get("answer")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| FALLBACK_TEXT.to_string());

        let citations = context.iter().map(|item| item.id()).collect();
        Ok(GeneratedAnswer { text, citations })
    }

    /// Numbers each context item `[n]` in retrieval order so the model can
    /// cite by marker; the marker-to-id mapping is `citations[n-1]`.
    fn build_prompt(&self, query: &str, context: &[RetrievedItem]) -> String {
        let mut prompt = String::from(
            "Answer the question using only the numbered context below. \
             Cite sources inline using [n] markers. If the context does not \
             contain the answer, say so.\n\n",
        );
        for (i, item) in context.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n", i + 1, item.text()));
        }
        prompt.push_str(&format!("\nQuestion: {query}\n"));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cognify_adapters::StubLlmProvider;
    use std::time::Duration;

    fn generator(provider: StubLlmProvider) -> AnswerGenerator {
        AnswerGenerator::new(
            Arc::new(provider),
            RateLimiterRegistry::new(1000, 1000),
            RetryPolicy::new(2).with_backoff(Duration::from_millis(1), Duration::from_millis(2)),
            Duration::from_secs(5),
        )
    }

    fn chunk(id: &str, text: &str) -> RetrievedItem {
        RetrievedItem::Chunk { chunk_id: id.to_string(), text: text.to_string(), score: 1.0, provenance: Default::default() }
    }

    #[tokio::test]
    async fn empty_context_returns_fallback_without_calling_the_llm() {
        let provider = StubLlmProvider::new(vec![]);
        let generator = generator(provider);
        let answer = generator.generate("what is Acme?", &[]).await.unwrap();
        assert_eq!(answer.text, FALLBACK_TEXT);
        assert!(answer.citations.is_empty());
    }

    #[tokio::test]
    async fn citations_list_one_id_per_context_item_in_order() {
        let provider = StubLlmProvider::new(vec![]);
        let generator = generator(provider);
        let context = vec![chunk("c1", "Acme makes widgets"), chunk("c2", "Acme was founded in 1990")];
        let answer = generator.generate("what is Acme?", &context).await.unwrap();
        assert_eq!(answer.citations, vec!["c1".to_string(), "c2".to_string()]);
    }

    #[tokio::test]
    async fn prompt_numbers_each_context_item() {
        let generator = generator(StubLlmProvider::new(vec![]));
        let context = vec![chunk("c1", "first fact"), chunk("c2", "second fact")];
        let prompt = generator.build_prompt("q", &context);
        assert!(prompt.contains("[1] first fact"));
        assert!(prompt.contains("[2] second fact"));
    }
}

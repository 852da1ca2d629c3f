//! LLM advisor for analysis reports.
//!
//! The [`Advisor`] turns an [`AnalysisReport`](hawk_proto::AnalysisReport)
//! plus recent history into a short markdown advisory. Model availability is
//! cached with a TTL ([`ModelCache`]); every call walks an ordered candidate
//! list (last known good model, then the priority list, then anything else
//! the key can see) with per-model retry and backoff ([`ModelRouter`]).
//! When every candidate fails the advisor answers with a deterministic
//! narrative built from the report's own numbers.

#![forbid(unsafe_code)]

pub mod advisor;
pub mod cache;
pub mod fallback;
pub mod gemini;
pub mod prompt;
pub mod router;

pub use advisor::{AdviceSource, Advisor, AdvisorConfig, Advisory, Answer};
pub use cache::ModelCache;
pub use gemini::GeminiProvider;
pub use router::{Generated, MODEL_PRIORITY, ModelRouter, RetryPolicy, candidate_order};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Error categories that drive the fallback and retry state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// The model does not exist or the key has no access to it.
    #[error("model unavailable: {0}")]
    ModelMissing(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("model overloaded: {0}")]
    Overloaded(String),

    #[error("llm request failed: {0}")]
    Other(String),

    #[error("no LLM API key configured")]
    NotConfigured,
}

pub type LlmResult<T> = Result<T, LlmError>;

impl LlmError {
    /// Map an HTTP status and error message onto a category.
    pub fn classify(status: Option<u16>, message: &str) -> Self {
        let lower = message.to_lowercase();
        let message = message.to_string();
        if status == Some(404) || lower.contains("not found") || lower.contains("not have access") {
            Self::ModelMissing(message)
        } else if status == Some(429)
            || lower.contains("quota")
            || lower.contains("too many requests")
            || lower.contains("rate limit")
        {
            Self::RateLimited(message)
        } else if status == Some(503)
            || lower.contains("overloaded")
            || lower.contains("service unavailable")
        {
            Self::Overloaded(message)
        } else {
            Self::Other(message)
        }
    }

    /// Rate limits and overload are worth another attempt on the same model.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Overloaded(_))
    }
}

// ─── Provider contract ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            max_output_tokens: 2048,
        }
    }
}

/// A hosted text-generation API.
#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Model ids usable for text generation with the configured key.
    async fn list_models(&self) -> LlmResult<Vec<String>>;

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> LlmResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_status() {
        assert!(matches!(LlmError::classify(Some(404), "x"), LlmError::ModelMissing(_)));
        assert!(matches!(LlmError::classify(Some(429), "x"), LlmError::RateLimited(_)));
        assert!(matches!(LlmError::classify(Some(503), "x"), LlmError::Overloaded(_)));
        assert!(matches!(LlmError::classify(Some(500), "x"), LlmError::Other(_)));
    }

    #[test]
    fn test_classify_by_message() {
        assert!(matches!(
            LlmError::classify(None, "User does not have access to model"),
            LlmError::ModelMissing(_)
        ));
        assert!(matches!(
            LlmError::classify(Some(400), "Resource has been exhausted (e.g. check quota)."),
            LlmError::RateLimited(_)
        ));
        assert!(matches!(
            LlmError::classify(None, "The model is overloaded. Please try again later."),
            LlmError::Overloaded(_)
        ));
        assert!(matches!(LlmError::classify(None, "Too Many Requests"), LlmError::RateLimited(_)));
    }

    #[test]
    fn test_retryable() {
        assert!(LlmError::RateLimited("q".into()).is_retryable());
        assert!(LlmError::Overloaded("o".into()).is_retryable());
        assert!(!LlmError::ModelMissing("m".into()).is_retryable());
        assert!(!LlmError::Other("e".into()).is_retryable());
    }
}

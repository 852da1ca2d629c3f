//! Report advisories and free-form questions over the model router.

use crate::cache::ModelCache;
use crate::fallback::fallback_advice;
use crate::gemini::{DEFAULT_BASE_URL, GeminiProvider};
use crate::prompt::{HISTORY_CONTEXT_LIMIT, advice_prompt, question_prompt};
use crate::router::{MODEL_PRIORITY, ModelRouter, RetryPolicy};
use crate::{GenerationConfig, LlmError, LlmProvider, LlmResult};
use chrono::{DateTime, Utc};
use hawk_proto::{AnalysisReport, HistoryEntry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_priority")]
    pub model_priority: Vec<String>,
    #[serde(default = "default_cache_ttl")]
    pub model_cache_ttl_secs: u64,
    #[serde(default = "default_attempts")]
    pub max_attempts_per_model: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_output_tokens: u32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_priority() -> Vec<String> {
    MODEL_PRIORITY.iter().map(|m| m.to_string()).collect()
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1500
}

fn default_temperature() -> f32 {
    0.9
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model_priority: default_priority(),
            model_cache_ttl_secs: default_cache_ttl(),
            max_attempts_per_model: default_attempts(),
            retry_base_delay_ms: default_retry_delay(),
            temperature: default_temperature(),
            max_output_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for AdvisorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisorConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model_priority", &self.model_priority)
            .field("model_cache_ttl_secs", &self.model_cache_ttl_secs)
            .field("max_attempts_per_model", &self.max_attempts_per_model)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .finish()
    }
}

impl AdvisorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts_per_model: self.max_attempts_per_model.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

// ─── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceSource {
    Llm,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub text: String,
    pub source: AdviceSource,
    pub model: Option<String>,
    /// Why the fallback was used, when it was.
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub model: String,
}

// ─── Advisor ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Advisor {
    router: Option<ModelRouter>,
}

impl Advisor {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AdvisorConfig) -> Self {
        let router = ModelRouter::new(provider)
            .with_cache(ModelCache::new(Duration::from_secs(config.model_cache_ttl_secs)))
            .with_priority(config.model_priority.clone())
            .with_retry(config.retry_policy())
            .with_generation(config.generation());
        Self {
            router: Some(router),
        }
    }

    /// Advisor without a model; `advise` always falls back.
    pub fn unconfigured() -> Self {
        Self { router: None }
    }

    /// Gemini-backed advisor when a key is configured.
    pub fn from_config(config: &AdvisorConfig) -> LlmResult<Self> {
        match config.api_key.as_deref().filter(|_| config.has_api_key()) {
            Some(key) => {
                let provider = GeminiProvider::with_base_url(key, &config.base_url)?;
                Ok(Self::new(Arc::new(provider), config))
            }
            None => Ok(Self::unconfigured()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.router.is_some()
    }

    pub fn router(&self) -> Option<&ModelRouter> {
        self.router.as_ref()
    }

    /// Narrate `report`. Never fails: any model failure yields the
    /// deterministic fallback text.
    pub async fn advise(&self, report: &AnalysisReport, history: &[HistoryEntry]) -> Advisory {
        let Some(router) = &self.router else {
            return Self::fallback(report, LlmError::NotConfigured);
        };

        let recent = &history[..history.len().min(HISTORY_CONTEXT_LIMIT)];
        match router.generate(&advice_prompt(report, recent)).await {
            Ok(generated) => {
                info!(model = %generated.model, chars = generated.text.len(), "advisory generated");
                Advisory {
                    text: generated.text,
                    source: AdviceSource::Llm,
                    model: Some(generated.model),
                    fallback_reason: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "every model failed, using fallback advisory");
                Self::fallback(report, e)
            }
        }
    }

    fn fallback(report: &AnalysisReport, reason: LlmError) -> Advisory {
        Advisory {
            text: fallback_advice(report),
            source: AdviceSource::Fallback,
            model: None,
            fallback_reason: Some(reason.to_string()),
        }
    }

    pub async fn ask(&self, question: &str, context: Option<&HistoryEntry>) -> LlmResult<Answer> {
        self.ask_at(question, context, Utc::now()).await
    }

    /// Answer a free-form question. Unlike [`advise`](Self::advise), failure
    /// is returned to the caller.
    pub async fn ask_at(
        &self,
        question: &str,
        context: Option<&HistoryEntry>,
        now: DateTime<Utc>,
    ) -> LlmResult<Answer> {
        let router = self.router.as_ref().ok_or(LlmError::NotConfigured)?;
        if question.trim().is_empty() {
            return Err(LlmError::Other("question is empty".to_string()));
        }
        let generated = router.generate(&question_prompt(question, context, now)).await?;
        Ok(Answer {
            text: generated.text.trim().to_string(),
            model: generated.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::fixtures::make_report;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct FixedProvider {
        reply: LlmResult<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedProvider {
        fn new(reply: LlmResult<String>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn list_models(&self) -> LlmResult<Vec<String>> {
            Ok(vec!["gemini-1.5-flash".to_string()])
        }

        async fn generate(&self, _: &str, prompt: &str, _: &GenerationConfig) -> LlmResult<String> {
            self.prompts.lock().push(prompt.to_string());
            self.reply.clone()
        }
    }

    fn config() -> AdvisorConfig {
        AdvisorConfig {
            retry_base_delay_ms: 0,
            ..AdvisorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_advise_uses_model() {
        let provider = FixedProvider::new(Ok("## 🚨 Critical Issues\nAll good.".into()));
        let advisor = Advisor::new(provider.clone(), &config());
        let advisory = advisor.advise(&make_report(Utc::now(), 90.0), &[]).await;
        assert_eq!(advisory.source, AdviceSource::Llm);
        assert_eq!(advisory.model.as_deref(), Some("gemini-1.5-flash"));
        assert!(provider.prompts.lock()[0].contains("$90.00"));
    }

    #[tokio::test]
    async fn test_total_failure_falls_back_with_total() {
        let provider = FixedProvider::new(Err(LlmError::Other("500".into())));
        let advisor = Advisor::new(provider, &config());
        let advisory = advisor.advise(&make_report(Utc::now(), 90.0), &[]).await;
        assert_eq!(advisory.source, AdviceSource::Fallback);
        assert!(!advisory.text.is_empty());
        assert!(advisory.text.contains("70.00"));
        assert!(advisory.fallback_reason.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_history_capped_in_prompt() {
        let provider = FixedProvider::new(Ok("fine".into()));
        let advisor = Advisor::new(provider.clone(), &config());
        let history: Vec<HistoryEntry> = (0..8)
            .map(|_| HistoryEntry::new("u1", make_report(Utc::now(), 10.0)))
            .collect();
        advisor.advise(&make_report(Utc::now(), 10.0), &history).await;
        let prompt = provider.prompts.lock()[0].clone();
        assert_eq!(prompt.matches("Underutilized EC2:").count(), 5);
    }

    #[tokio::test]
    async fn test_unconfigured() {
        let advisor = Advisor::from_config(&AdvisorConfig::default()).unwrap();
        assert!(!advisor.is_configured());
        let advisory = advisor.advise(&make_report(Utc::now(), 5.0), &[]).await;
        assert_eq!(advisory.source, AdviceSource::Fallback);
        assert_eq!(advisor.ask("why?", None).await.unwrap_err(), LlmError::NotConfigured);
    }

    #[tokio::test]
    async fn test_ask_surfaces_errors() {
        let failing = Advisor::new(FixedProvider::new(Err(LlmError::Other("down".into()))), &config());
        assert!(failing.ask("How can I save?", None).await.is_err());

        let ok = Advisor::new(FixedProvider::new(Ok("  Use spot instances.  ".into())), &config());
        let answer = ok.ask("How can I save?", None).await.unwrap();
        assert_eq!(answer.text, "Use spot instances.");
        assert!(ok.ask("   ", None).await.is_err());
    }

    #[test]
    fn test_config_defaults_and_redaction() {
        let cfg: AdvisorConfig = serde_json::from_str(r#"{"api_key": "AIza-secret"}"#).unwrap();
        assert_eq!(cfg.model_cache_ttl_secs, 300);
        assert_eq!(cfg.retry_policy(), RetryPolicy::default());
        assert_eq!(cfg.model_priority.len(), 6);
        assert!(cfg.has_api_key());
        assert!(!format!("{cfg:?}").contains("AIza-secret"));
    }
}

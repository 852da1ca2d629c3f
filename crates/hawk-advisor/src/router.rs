//! Model selection with fallback across models and retry within one.

use crate::cache::ModelCache;
use crate::{GenerationConfig, LlmError, LlmProvider, LlmResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Preferred models, best first.
pub const MODEL_PRIORITY: [&str; 6] = [
    "gemini-1.5-flash-latest",
    "gemini-1.5-pro-latest",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
    "gemini-pro-latest",
    "gemini-pro",
];

/// Per-model attempt budget and linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts_per_model: u32,
    /// Attempt `n` (1-based) waits `n × base_delay` before attempt `n + 1`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_model: 3,
            base_delay: Duration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, no sleeping.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Order models for one call: last known good, then priority models that
/// are available, then every other available model. Tried models and
/// duplicates are skipped.
pub fn candidate_order(
    last_good: Option<&str>,
    priority: &[String],
    available: &[String],
    tried: &HashSet<String>,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |model: &str| {
        if !tried.contains(model) && !out.iter().any(|m| m == model) {
            out.push(model.to_string());
        }
    };

    if let Some(model) = last_good {
        push(model);
    }
    for model in priority.iter().filter(|p| available.contains(p)) {
        push(model);
    }
    for model in available {
        push(model);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub model: String,
}

#[derive(Debug)]
pub struct ModelRouter {
    provider: Arc<dyn LlmProvider>,
    cache: ModelCache,
    priority: Vec<String>,
    last_good: Mutex<Option<String>>,
    retry: RetryPolicy,
    generation: GenerationConfig,
}

impl ModelRouter {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            cache: ModelCache::default(),
            priority: MODEL_PRIORITY.iter().map(|m| m.to_string()).collect(),
            last_good: Mutex::new(None),
            retry: RetryPolicy::default(),
            generation: GenerationConfig::default(),
        }
    }

    pub fn with_cache(mut self, cache: ModelCache) -> Self {
        self.cache = cache;
        self
    }

    /// An empty list keeps the built-in priority.
    pub fn with_priority(mut self, priority: Vec<String>) -> Self {
        if !priority.is_empty() {
            self.priority = priority;
        }
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn last_good(&self) -> Option<String> {
        self.last_good.lock().clone()
    }

    /// Discovered models, or the priority list when discovery fails or
    /// comes back empty.
    async fn available_models(&self) -> Vec<String> {
        match self.cache.get_or_refresh(self.provider.as_ref()).await {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => {
                warn!("model discovery returned nothing, using priority list");
                self.priority.clone()
            }
            Err(e) => {
                warn!(error = %e, "model discovery failed, using priority list");
                self.priority.clone()
            }
        }
    }

    fn forget_if_last_good(&self, model: &str) {
        let mut last = self.last_good.lock();
        if last.as_deref() == Some(model) {
            *last = None;
        }
    }

    /// Generate `prompt` on the first candidate that answers.
    ///
    /// Returns the last error seen once every candidate is exhausted.
    pub async fn generate(&self, prompt: &str) -> LlmResult<Generated> {
        let available = self.available_models().await;
        let last_good = self.last_good();
        let mut tried = HashSet::new();
        let candidates = candidate_order(last_good.as_deref(), &self.priority, &available, &tried);
        let mut last_error = None;

        for model in candidates {
            if !tried.insert(model.clone()) {
                continue;
            }
            debug!(model = %model, "trying model");

            for attempt in 1..=self.retry.max_attempts_per_model.max(1) {
                match self.provider.generate(&model, prompt, &self.generation).await {
                    Ok(text) if !text.trim().is_empty() => {
                        info!(model = %model, attempt, "generation succeeded");
                        *self.last_good.lock() = Some(model.clone());
                        return Ok(Generated { text, model });
                    }
                    Ok(_) => {
                        warn!(model = %model, "empty response, moving on");
                        last_error = Some(LlmError::Other(format!("{model} returned no text")));
                        break;
                    }
                    Err(e) if e.is_retryable() && attempt < self.retry.max_attempts_per_model => {
                        let delay = self.retry.delay_for(attempt);
                        warn!(model = %model, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        warn!(model = %model, attempt, error = %e, "abandoning model");
                        if matches!(e, LlmError::ModelMissing(_)) {
                            self.forget_if_last_good(&model);
                        }
                        last_error = Some(e);
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Other("no models available".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Replays a scripted result sequence per model; the last result repeats.
    #[derive(Debug)]
    struct ScriptedProvider {
        models: LlmResult<Vec<String>>,
        script: HashMap<String, Vec<LlmResult<String>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(models: &[&str]) -> Self {
            Self::discovering(Ok(models.iter().map(|m| m.to_string()).collect()))
        }

        fn discovering(models: LlmResult<Vec<String>>) -> Self {
            Self {
                models,
                script: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn on(mut self, model: &str, results: Vec<LlmResult<String>>) -> Self {
            self.script.insert(model.to_string(), results);
            self
        }

        fn calls_to(&self, model: &str) -> usize {
            self.calls.lock().iter().filter(|m| *m == model).count()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn list_models(&self) -> LlmResult<Vec<String>> {
            self.models.clone()
        }

        async fn generate(&self, model: &str, _: &str, _: &GenerationConfig) -> LlmResult<String> {
            let n = {
                let mut calls = self.calls.lock();
                calls.push(model.to_string());
                calls.iter().filter(|m| *m == model).count()
            };
            match self.script.get(model) {
                Some(results) if !results.is_empty() => {
                    results[(n - 1).min(results.len() - 1)].clone()
                }
                _ => Err(LlmError::ModelMissing(format!("{model} not found"))),
            }
        }
    }

    fn router(provider: ScriptedProvider) -> (Arc<ScriptedProvider>, ModelRouter) {
        let provider = Arc::new(provider);
        let router = ModelRouter::new(provider.clone()).with_retry(RetryPolicy::immediate());
        (provider, router)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_candidate_order() {
        let priority = strings(&["a", "b", "c"]);
        let available = strings(&["z", "c", "a"]);
        let tried = HashSet::new();
        assert_eq!(
            candidate_order(Some("z"), &priority, &available, &tried),
            strings(&["z", "a", "c"])
        );
        let tried: HashSet<String> = ["a".to_string()].into();
        assert_eq!(
            candidate_order(None, &priority, &available, &tried),
            strings(&["c", "z"])
        );
    }

    #[test]
    fn test_backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(3000));
        assert_eq!(RetryPolicy::immediate().delay_for(2), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_missing_model_tried_once_then_next() {
        let (provider, router) = router(
            ScriptedProvider::new(&["gemini-1.5-flash-latest", "gemini-pro"])
                .on("gemini-1.5-flash-latest", vec![Err(LlmError::ModelMissing("404".into()))])
                .on("gemini-pro", vec![Ok("advice".into())]),
        );
        let out = router.generate("prompt").await.unwrap();
        assert_eq!(out.model, "gemini-pro");
        assert_eq!(provider.calls_to("gemini-1.5-flash-latest"), 1);
        assert_eq!(router.last_good().as_deref(), Some("gemini-pro"));
    }

    #[tokio::test]
    async fn test_rate_limit_retries_same_model() {
        let (provider, router) = router(ScriptedProvider::new(&["gemini-pro"]).on(
            "gemini-pro",
            vec![
                Err(LlmError::RateLimited("429".into())),
                Err(LlmError::Overloaded("503".into())),
                Ok("third time".into()),
            ],
        ));
        let out = router.generate("prompt").await.unwrap();
        assert_eq!(out.text, "third time");
        assert_eq!(provider.calls_to("gemini-pro"), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_bounded() {
        let (provider, router) = router(
            ScriptedProvider::new(&["gemini-1.5-pro", "gemini-pro"])
                .on("gemini-1.5-pro", vec![Err(LlmError::RateLimited("quota".into()))])
                .on("gemini-pro", vec![Ok("ok".into())]),
        );
        let out = router.generate("prompt").await.unwrap();
        assert_eq!(out.model, "gemini-pro");
        assert_eq!(provider.calls_to("gemini-1.5-pro"), 3);
    }

    #[tokio::test]
    async fn test_last_good_tried_first_and_cleared_when_missing() {
        let (provider, router) = router(
            ScriptedProvider::new(&["gemini-1.5-flash", "custom-model"])
                .on("gemini-1.5-flash", vec![Err(LlmError::Other("boom".into()))])
                .on("custom-model", vec![Ok("first".into()), Err(LlmError::ModelMissing("gone".into()))]),
        );
        assert_eq!(router.generate("p").await.unwrap().model, "custom-model");
        assert_eq!(router.last_good().as_deref(), Some("custom-model"));

        // Second call starts with custom-model, which has since disappeared.
        let err = router.generate("p").await.unwrap_err();
        assert!(matches!(err, LlmError::Other(_)));
        assert_eq!(provider.calls.lock()[2], "custom-model");
        assert!(router.last_good().is_none());
    }

    #[tokio::test]
    async fn test_discovery_failure_uses_priority_list() {
        let provider = ScriptedProvider::discovering(Err(LlmError::Other("list failed".into())))
            .on("gemini-1.5-pro", vec![Ok("from priority".into())]);
        let (provider, router) = router(provider);
        let out = router.generate("p").await.unwrap();
        assert_eq!(out.model, "gemini-1.5-pro");
        assert_eq!(provider.calls_to("gemini-1.5-flash-latest"), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let (_provider, router) = router(ScriptedProvider::new(&["only"]).on(
            "only",
            vec![Err(LlmError::Overloaded("busy".into()))],
        ));
        assert_eq!(
            router.generate("p").await.unwrap_err(),
            LlmError::Overloaded("busy".into())
        );
    }
}

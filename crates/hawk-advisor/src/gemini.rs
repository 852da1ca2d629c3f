//! Google Generative Language (Gemini) REST provider.

use crate::{GenerationConfig, LlmError, LlmProvider, LlmResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const GENERATE_METHOD: &str = "generateContent";
const API_KEY_HEADER: &str = "x-goog-api-key";

fn build_client() -> LlmResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| LlmError::Other(format!("failed to build HTTP client: {e}")))
}

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// `models/gemini-pro` → `gemini-pro`, for models that can generate text.
fn generation_models(models: Vec<ModelInfo>) -> Vec<String> {
    models
        .into_iter()
        .filter(|m| m.supported_generation_methods.iter().any(|s| s == GENERATE_METHOD))
        .map(|m| m.name.strip_prefix("models/").unwrap_or(&m.name).to_string())
        .collect()
}

fn response_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn transport_error(e: reqwest::Error) -> LlmError {
    LlmError::classify(e.status().map(|s| s.as_u16()), &e.to_string())
}

async fn check(response: reqwest::Response) -> LlmResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::classify(Some(status.as_u16()), &error_message(&body)))
}

// ─── Provider ─────────────────────────────────────────────────────────────────

pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> LlmResult<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> LlmResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::NotConfigured);
        }
        Ok(Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: build_client()?,
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn list_models(&self) -> LlmResult<Vec<String>> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!("{}/models?pageSize=100", self.base_url);
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(token);
            }
            let response = self
                .client
                .get(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .send()
                .await
                .map_err(transport_error)?;
            let page: ListModelsResponse = check(response)
                .await?
                .json()
                .await
                .map_err(|e| LlmError::Other(format!("failed to parse model list: {e}")))?;

            models.extend(generation_models(page.models));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(count = models.len(), "listed gemini models");
        Ok(models)
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> LlmResult<String> {
        let url = format!("{}/models/{}:{}", self.base_url, model, GENERATE_METHOD);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: WireGenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            },
        };
        debug!(model, prompt_chars = prompt.len(), "gemini generate");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let parsed: GenerateResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Other(format!("failed to parse {model} response: {e}")))?;
        Ok(response_text(parsed))
    }
}

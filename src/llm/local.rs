//! Local two-stage provider: a vision model collects raw facts, a mapping
//! model shapes them into the case schema.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::LlmError;
use crate::llm::json;
use crate::llm::prompts::{self, RawExtraction};
use crate::llm::provider::{
    ExtractionProvider, ExtractionRequest, ProviderKind, ProviderOutput, StageTiming,
    truncate_chars,
};

const PROVIDER: &str = "local";

/// Transport to a local inference server.
#[async_trait]
pub trait LocalModelClient: Send + Sync {
    /// Run one non-streaming generation and return the response text.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
    ) -> Result<String, LlmError>;
}

// ── Ollama transport ────────────────────────────────────────────────

/// Request body for Ollama `/api/generate`.
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    images: &'a [String],
    stream: bool,
}

/// Response body from Ollama `/api/generate`.
#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// HTTP client for an Ollama-compatible endpoint.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::NotConfigured {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }
}

#[async_trait]
impl LocalModelClient for OllamaClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
    ) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            images,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(PROVIDER, &self.base_url, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: e.to_string(),
                })?;

        Ok(parsed.response)
    }
}

// ── Two-stage provider ──────────────────────────────────────────────

/// Model identifiers and limits for the two stages.
#[derive(Debug, Clone)]
pub struct LocalModels {
    pub vision_model: String,
    pub mapping_model: String,
    pub text_budget: usize,
}

/// Vision stage, then mapping stage, strictly in sequence.
pub struct LocalTwoStageProvider {
    client: Arc<dyn LocalModelClient>,
    models: LocalModels,
    label: String,
}

impl LocalTwoStageProvider {
    pub fn new(client: Arc<dyn LocalModelClient>, models: LocalModels) -> Self {
        let label = format!("{} + {}", models.vision_model, models.mapping_model);
        Self {
            client,
            models,
            label,
        }
    }

    /// Stage A. Invalid JSON yields the empty raw structure.
    async fn extract_raw(
        &self,
        request: &ExtractionRequest,
    ) -> Result<serde_json::Value, LlmError> {
        let text = truncate_chars(&request.text, self.models.text_budget);
        let names: Vec<&str> = request
            .attachments
            .iter()
            .map(|a| a.filename.as_str())
            .collect();
        let images: Vec<String> = request
            .attachments
            .iter()
            .filter(|a| a.is_image())
            .map(|a| base64::engine::general_purpose::STANDARD.encode(&a.data))
            .collect();

        let prompt = prompts::vision_prompt(text, &names);
        let response = self
            .client
            .generate(&self.models.vision_model, &prompt, &images)
            .await?;

        match json::parse_object(&response) {
            Ok(raw) => Ok(raw),
            Err(e) => {
                error!(
                    error = %e,
                    response = %truncate_chars(&response, 500),
                    "Vision model returned invalid JSON, continuing with empty raw data"
                );
                Ok(RawExtraction::empty_value())
            }
        }
    }

    /// Stage B. Invalid JSON yields an empty mapping.
    async fn map_to_schema(&self, raw: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let prompt = prompts::mapping_prompt(raw);
        let response = self
            .client
            .generate(&self.models.mapping_model, &prompt, &[])
            .await?;

        match json::parse_object(&response) {
            Ok(mapped) => Ok(mapped),
            Err(e) => {
                error!(
                    error = %e,
                    response = %truncate_chars(&response, 500),
                    "Mapping model returned invalid JSON, using empty mapping"
                );
                Ok(serde_json::json!({}))
            }
        }
    }
}

#[async_trait]
impl ExtractionProvider for LocalTwoStageProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn model_name(&self) -> &str {
        &self.label
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<ProviderOutput, LlmError> {
        debug!(model = %self.models.vision_model, "Stage A: vision model extracting raw data");
        let vision_start = Instant::now();
        let raw = self.extract_raw(request).await?;
        let vision = vision_start.elapsed();
        info!(elapsed_secs = vision.as_secs_f64(), "Vision model completed");

        debug!(model = %self.models.mapping_model, "Stage B: mapping model structuring data");
        let mapping_start = Instant::now();
        let mapped = self.map_to_schema(&raw).await?;
        let mapping = mapping_start.elapsed();
        info!(elapsed_secs = mapping.as_secs_f64(), "Mapping model completed");

        Ok(ProviderOutput {
            value: mapped,
            stages: vec![
                StageTiming {
                    stage: "vision",
                    elapsed: vision,
                },
                StageTiming {
                    stage: "mapping",
                    elapsed: mapping,
                },
            ],
        })
    }
}

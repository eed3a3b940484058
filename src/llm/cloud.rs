//! Cloud single-stage provider (Gemini `generateContent`).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LlmError;
use crate::llm::json;
use crate::llm::prompts;
use crate::llm::provider::{
    ExtractionProvider, ExtractionRequest, ProviderKind, ProviderOutput, StageTiming,
    truncate_chars,
};

const PROVIDER: &str = "cloud";

/// Keeps the key out of the URL, and with it out of transport error text.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection settings for the cloud endpoint.
#[derive(Debug, Clone)]
pub struct CloudSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: SecretString,
    pub timeout: Duration,
    pub text_budget: usize,
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Sends the email text and all attachments in one multimodal request.
pub struct CloudSingleStageProvider {
    settings: CloudSettings,
    client: reqwest::Client,
}

impl CloudSingleStageProvider {
    /// Fails with `NotConfigured` when no API key is set.
    pub fn new(settings: CloudSettings) -> Result<Self, LlmError> {
        if settings.api_key.expose_secret().trim().is_empty() {
            return Err(LlmError::NotConfigured {
                provider: PROVIDER.to_string(),
                reason: "GEMINI_API_KEY is not set".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| LlmError::NotConfigured {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self { settings, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }

    fn build_request(&self, request: &ExtractionRequest) -> GenerateContentRequest {
        let text = truncate_chars(&request.text, self.settings.text_budget);
        let mut parts = vec![Part::Text {
            text: prompts::cloud_prompt(text),
        }];
        parts.extend(request.attachments.iter().map(|a| Part::Inline {
            inline_data: InlineData {
                mime_type: a.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&a.data),
            },
        }));

        GenerateContentRequest {
            contents: vec![Content { parts }],
        }
    }
}

/// Pull the first candidate's text out of a `generateContent` response.
fn response_text(body: GenerateContentResponse) -> Result<String, LlmError> {
    body.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "response contained no candidate text".to_string(),
        })
}

#[async_trait]
impl ExtractionProvider for CloudSingleStageProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<ProviderOutput, LlmError> {
        let endpoint = self.endpoint();
        let body = self.build_request(request);
        debug!(
            model = %self.settings.model,
            attachments = request.attachments.len(),
            "Sending extraction request to cloud provider"
        );

        let start = Instant::now();
        let response = self
            .client
            .post(&endpoint)
            .header(API_KEY_HEADER, self.settings.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                LlmError::from_transport(PROVIDER, &endpoint, self.settings.timeout, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: e.to_string(),
                })?;
        let text = response_text(parsed)?;
        let value = json::parse_object(&text)?;
        let elapsed = start.elapsed();
        info!(elapsed_secs = elapsed.as_secs_f64(), "Cloud extraction completed");

        Ok(ProviderOutput {
            value,
            stages: vec![StageTiming {
                stage: "cloud",
                elapsed,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::CaseExtractor;
    use crate::llm::provider::Attachment;

    fn settings(key: &str) -> CloudSettings {
        CloudSettings {
            base_url: "https://generativelanguage.googleapis.com/".into(),
            model: "gemini-flash-latest".into(),
            api_key: SecretString::from(key.to_string()),
            timeout: Duration::from_secs(120),
            text_budget: 15_000,
        }
    }

    #[test]
    fn empty_key_is_not_configured() {
        let err = CloudSingleStageProvider::new(settings("  ")).err().unwrap();
        assert!(matches!(err, LlmError::NotConfigured { .. }));
    }

    #[test]
    fn endpoint_includes_model() {
        let provider = CloudSingleStageProvider::new(settings("k")).unwrap();
        assert_eq!(
            provider.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-flash-latest:generateContent"
        );
    }

    #[test]
    fn request_carries_prompt_and_inline_attachments() {
        let provider = CloudSingleStageProvider::new(settings("k")).unwrap();
        let request = ExtractionRequest {
            text: "Unfall auf der A8".into(),
            attachments: vec![Attachment {
                filename: "schein.png".into(),
                mime_type: "image/png".into(),
                data: vec![1, 2, 3],
            }],
        };

        let json = serde_json::to_value(provider.build_request(&request)).unwrap();
        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts[0]["text"].as_str().unwrap().contains("Unfall auf der A8"));
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "AQID");
    }

    #[test]
    fn response_text_reads_first_candidate() {
        let body: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "```json\n{\"betreff\": \"x\"}\n```"}]}}]
        }))
        .unwrap();
        let text = response_text(body).unwrap();
        assert_eq!(json::parse_object(&text).unwrap()["betreff"], "x");
    }

    #[tokio::test]
    async fn unreachable_endpoint_does_not_leak_key() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut cfg = settings("AIzaSECRET123");
        cfg.base_url = format!("http://127.0.0.1:{port}");
        cfg.timeout = Duration::from_secs(5);
        let provider = CloudSingleStageProvider::new(cfg).unwrap();
        let request = ExtractionRequest {
            text: "Unfall".into(),
            attachments: vec![],
        };

        let err = provider.extract(&request).await.unwrap_err();
        assert!(err.is_connectivity());
        assert!(!err.to_string().contains("AIzaSECRET123"));

        let cloud: Arc<dyn ExtractionProvider> = Arc::new(provider);
        let extractor = CaseExtractor::new(ProviderKind::Cloud, None, Some(cloud));
        let data = extractor.extract_case_data(&request).await;
        assert!(data.zusammenfassung.starts_with("Fehler bei KI-Analyse"));
        assert!(!data.zusammenfassung.contains("AIzaSECRET123"));
    }

    #[test]
    fn response_without_candidates_is_invalid() {
        let body: GenerateContentResponse =
            serde_json::from_value(serde_json::json!({"candidates": []})).unwrap();
        assert!(matches!(
            response_text(body),
            Err(LlmError::InvalidResponse { .. })
        ));
    }
}

//! Extraction provider trait and shared request/response types.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Which AI backend performs extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local two-stage (vision + mapping) inference server.
    Local,
    /// Cloud single-stage multimodal endpoint.
    Cloud,
}

impl ProviderKind {
    /// Parse the configured provider name. Accepts the deployment names
    /// (`loki`, `gemini`) as well as `local` / `cloud`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "loki" => Some(Self::Local),
            "cloud" | "gemini" => Some(Self::Cloud),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file handed to the provider alongside the email text.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Everything a provider needs for one extraction.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

/// Wall-clock time of one provider stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: &'static str,
    pub elapsed: Duration,
}

/// Raw provider output, not yet normalized into `CaseData`.
#[derive(Debug, Clone)]
pub struct ProviderOutput {
    pub value: serde_json::Value,
    pub stages: Vec<StageTiming>,
}

/// An AI backend that turns email text and attachments into case JSON.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Model identifier(s), for logging.
    fn model_name(&self) -> &str;

    async fn extract(&self, request: &ExtractionRequest) -> Result<ProviderOutput, LlmError>;
}

/// Cut `text` to at most `budget` characters on a char boundary.
pub fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

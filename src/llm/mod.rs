//! AI extraction for inbound case emails.
//!
//! Supports:
//! - **Local**: two-stage (vision, then mapping) on an Ollama-compatible server
//! - **Cloud**: single multimodal call to Gemini
//!
//! `CaseExtractor` picks the active provider and fails over from local to
//! cloud once, permanently.

pub mod cloud;
pub mod extractor;
pub mod json;
pub mod local;
pub mod prompts;
pub mod provider;

pub use cloud::{CloudSettings, CloudSingleStageProvider};
pub use extractor::{CaseExtractor, ExtractionMetrics, ExtractionOutcome};
pub use local::{LocalModelClient, LocalModels, LocalTwoStageProvider, OllamaClient};
pub use provider::*;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::LlmSettings;

/// Build the extractor from configuration.
///
/// A provider that cannot be constructed is left out; the extractor then
/// degrades as if that provider were failing.
pub fn create_extractor(settings: &LlmSettings) -> CaseExtractor {
    let local: Option<Arc<dyn ExtractionProvider>> =
        match OllamaClient::new(&settings.local_url, settings.timeout) {
            Ok(client) => Some(Arc::new(LocalTwoStageProvider::new(
                Arc::new(client),
                LocalModels {
                    vision_model: settings.vision_model.clone(),
                    mapping_model: settings.mapping_model.clone(),
                    text_budget: settings.text_budget,
                },
            ))),
            Err(e) => {
                warn!(error = %e, "Local provider unavailable");
                None
            }
        };

    let cloud: Option<Arc<dyn ExtractionProvider>> =
        match CloudSingleStageProvider::new(CloudSettings {
            base_url: settings.cloud_base_url.clone(),
            model: settings.cloud_model.clone(),
            api_key: settings.cloud_api_key.clone(),
            timeout: settings.timeout,
            text_budget: settings.text_budget,
        }) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                warn!(error = %e, "Cloud provider unavailable");
                None
            }
        };

    info!(
        provider = %settings.provider,
        local = local.is_some(),
        cloud = cloud.is_some(),
        "Extraction providers initialized"
    );

    CaseExtractor::new(settings.provider, local, cloud)
}

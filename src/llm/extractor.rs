//! Extraction orchestrator: provider selection, one-way failover, and
//! normalization into `CaseData`.
//!
//! The active provider starts at the configured value. Any local failure
//! switches it to cloud for the lifetime of the extractor; there is no way
//! back. Extraction never fails: an unusable cloud answer becomes a degraded
//! `CaseData` carrying the error in `zusammenfassung`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::case::CaseData;
use crate::error::LlmError;
use crate::llm::provider::{ExtractionProvider, ExtractionRequest, ProviderKind, StageTiming};

/// Timing and outcome of one extraction, for logging.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionMetrics {
    /// Provider that produced the returned data.
    pub provider: ProviderKind,
    /// The local provider failed during this call and cloud took over.
    pub fallback_triggered: bool,
    pub stages: Vec<StageTiming>,
    pub total: Duration,
    /// Top-level `CaseData` sections with content.
    pub fields_extracted: usize,
}

/// Result of `CaseExtractor::extract`.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub data: CaseData,
    pub metrics: ExtractionMetrics,
}

/// Chooses between the local and cloud providers.
pub struct CaseExtractor {
    local: Option<Arc<dyn ExtractionProvider>>,
    cloud: Option<Arc<dyn ExtractionProvider>>,
    active: Mutex<ProviderKind>,
}

impl CaseExtractor {
    /// A provider slot may be empty when it could not be constructed
    /// (e.g. no cloud API key).
    pub fn new(
        initial: ProviderKind,
        local: Option<Arc<dyn ExtractionProvider>>,
        cloud: Option<Arc<dyn ExtractionProvider>>,
    ) -> Self {
        Self {
            local,
            cloud,
            active: Mutex::new(initial),
        }
    }

    /// Currently selected provider.
    pub fn active_provider(&self) -> ProviderKind {
        *self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Extract case data, returning only the normalized record.
    pub async fn extract_case_data(&self, request: &ExtractionRequest) -> CaseData {
        self.extract(request).await.data
    }

    /// Extract case data with metrics.
    pub async fn extract(&self, request: &ExtractionRequest) -> ExtractionOutcome {
        let start = Instant::now();
        let mut fallback_triggered = false;
        let mut stages = Vec::new();

        if self.active_provider() == ProviderKind::Local {
            match self.try_local(request).await {
                Ok((data, local_stages)) => {
                    return self.finish(data, ProviderKind::Local, false, local_stages, start);
                }
                Err(e) => {
                    self.fail_over(&e);
                    fallback_triggered = true;
                }
            }
        }

        let data = match &self.cloud {
            None => {
                warn!("Cloud provider not configured, returning empty case data");
                CaseData::default()
            }
            Some(cloud) => match cloud.extract(request).await {
                Ok(output) => {
                    stages = output.stages;
                    match CaseData::from_value(output.value) {
                        Ok(data) => data,
                        Err(e) => {
                            error!(error = %e, "Cloud output does not match the case schema");
                            CaseData::degraded(format!("Fehler bei KI-Analyse: {e}"))
                        }
                    }
                }
                Err(e) => {
                    error!(
                        error = %e,
                        provider = %cloud.kind(),
                        model = %cloud.model_name(),
                        "Cloud extraction failed"
                    );
                    CaseData::degraded(format!("Fehler bei KI-Analyse: {e}"))
                }
            },
        };

        self.finish(data, ProviderKind::Cloud, fallback_triggered, stages, start)
    }

    /// Run the local provider and normalize its output. A schema mismatch
    /// counts as malformed output.
    async fn try_local(
        &self,
        request: &ExtractionRequest,
    ) -> Result<(CaseData, Vec<StageTiming>), LlmError> {
        let local = self.local.as_ref().ok_or_else(|| LlmError::NotConfigured {
            provider: ProviderKind::Local.to_string(),
            reason: "no local provider available".to_string(),
        })?;

        debug!(
            provider = %local.kind(),
            model = %local.model_name(),
            "Extracting with local provider"
        );
        let output = local.extract(request).await?;
        let data = CaseData::from_value(output.value)?;
        Ok((data, output.stages))
    }

    /// Switch to cloud permanently. Logs only when this call flipped the flag.
    fn fail_over(&self, cause: &LlmError) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if *active == ProviderKind::Local {
            *active = ProviderKind::Cloud;
            warn!(
                error = %cause,
                connectivity = cause.is_connectivity(),
                "Local provider failed, switching to cloud permanently"
            );
        } else {
            debug!(error = %cause, "Local provider failed after failover already happened");
        }
    }

    fn finish(
        &self,
        data: CaseData,
        provider: ProviderKind,
        fallback_triggered: bool,
        stages: Vec<StageTiming>,
        start: Instant,
    ) -> ExtractionOutcome {
        let metrics = ExtractionMetrics {
            provider,
            fallback_triggered,
            stages,
            total: start.elapsed(),
            fields_extracted: data.filled_sections(),
        };

        info!(
            provider = %metrics.provider,
            fallback = metrics.fallback_triggered,
            total_secs = metrics.total.as_secs_f64(),
            fields = metrics.fields_extracted,
            "Extraction finished"
        );

        ExtractionOutcome { data, metrics }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::llm::provider::ProviderOutput;

    enum Behavior {
        Reply(serde_json::Value),
        Unreachable,
        Garbage,
    }

    /// Provider mock that counts calls.
    struct MockProvider {
        kind: ProviderKind,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn new(kind: ProviderKind, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                kind,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExtractionProvider for MockProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn model_name(&self) -> &str {
            "mock"
        }

        async fn extract(&self, _request: &ExtractionRequest) -> Result<ProviderOutput, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Reply(value) => Ok(ProviderOutput {
                    value: value.clone(),
                    stages: vec![StageTiming {
                        stage: "mock",
                        elapsed: Duration::from_millis(1),
                    }],
                }),
                Behavior::Unreachable => Err(LlmError::Connection {
                    provider: self.kind.to_string(),
                    endpoint: "http://10.10.10.5:11434".into(),
                    reason: "connection refused".into(),
                }),
                Behavior::Garbage => Err(LlmError::InvalidResponse {
                    provider: self.kind.to_string(),
                    reason: "not json".into(),
                }),
            }
        }
    }

    fn request() -> ExtractionRequest {
        ExtractionRequest {
            text: "Sehr geehrte Damen und Herren, ...".into(),
            attachments: vec![],
        }
    }

    fn cloud_reply() -> serde_json::Value {
        serde_json::json!({
            "mandant": {"vorname": "Erika", "nachname": "Musterfrau"},
            "betreff": "Verkehrsunfall vom 2024-03-01"
        })
    }

    fn assert_nested_present(value: &serde_json::Value) {
        for key in ["mandant", "gegner_versicherung", "unfall", "fahrzeug"] {
            assert!(value[key].is_object(), "{key} must be an object");
        }
        assert!(value["mandant"]["adresse"].is_object());
    }

    #[tokio::test]
    async fn local_success_stays_local() {
        let local = MockProvider::new(
            ProviderKind::Local,
            Behavior::Reply(serde_json::json!({"betreff": "lokal"})),
        );
        let cloud = MockProvider::new(ProviderKind::Cloud, Behavior::Reply(cloud_reply()));
        let extractor = CaseExtractor::new(
            ProviderKind::Local,
            Some(local.clone()),
            Some(cloud.clone()),
        );

        let outcome = extractor.extract(&request()).await;
        assert_eq!(outcome.data.betreff, "lokal");
        assert_eq!(outcome.metrics.provider, ProviderKind::Local);
        assert!(!outcome.metrics.fallback_triggered);
        assert_eq!(cloud.calls(), 0);
        assert_eq!(extractor.active_provider(), ProviderKind::Local);
    }

    #[tokio::test]
    async fn connectivity_failure_fails_over_once_and_permanently() {
        let local = MockProvider::new(ProviderKind::Local, Behavior::Unreachable);
        let cloud = MockProvider::new(ProviderKind::Cloud, Behavior::Reply(cloud_reply()));
        let extractor = CaseExtractor::new(
            ProviderKind::Local,
            Some(local.clone()),
            Some(cloud.clone()),
        );

        let first = extractor.extract(&request()).await;
        assert!(first.metrics.fallback_triggered);
        assert_eq!(first.metrics.provider, ProviderKind::Cloud);
        assert_eq!(first.data.mandant.vorname, "Erika");
        assert_eq!(local.calls(), 1);
        assert_eq!(cloud.calls(), 1);
        assert_eq!(extractor.active_provider(), ProviderKind::Cloud);

        let second = extractor.extract(&request()).await;
        assert!(!second.metrics.fallback_triggered);
        assert_eq!(local.calls(), 1, "local must not be retried");
        assert_eq!(cloud.calls(), 2);
    }

    #[tokio::test]
    async fn cloud_stays_active_when_cloud_also_fails() {
        let local = MockProvider::new(ProviderKind::Local, Behavior::Unreachable);
        let cloud = MockProvider::new(ProviderKind::Cloud, Behavior::Unreachable);
        let extractor = CaseExtractor::new(
            ProviderKind::Local,
            Some(local.clone()),
            Some(cloud.clone()),
        );

        for _ in 0..3 {
            let data = extractor.extract_case_data(&request()).await;
            assert!(data.zusammenfassung.starts_with("Fehler bei KI-Analyse"));
            assert_eq!(extractor.active_provider(), ProviderKind::Cloud);
        }
        assert_eq!(local.calls(), 1);
        assert_eq!(cloud.calls(), 3);
    }

    #[tokio::test]
    async fn malformed_local_output_also_fails_over() {
        let local = MockProvider::new(ProviderKind::Local, Behavior::Garbage);
        let cloud = MockProvider::new(ProviderKind::Cloud, Behavior::Reply(cloud_reply()));
        let extractor = CaseExtractor::new(ProviderKind::Local, Some(local), Some(cloud));

        let outcome = extractor.extract(&request()).await;
        assert!(outcome.metrics.fallback_triggered);
        assert_eq!(extractor.active_provider(), ProviderKind::Cloud);
    }

    #[tokio::test]
    async fn local_schema_mismatch_counts_as_failure() {
        let local = MockProvider::new(
            ProviderKind::Local,
            Behavior::Reply(serde_json::json!({"mandant": "Max Mustermann"})),
        );
        let cloud = MockProvider::new(ProviderKind::Cloud, Behavior::Reply(cloud_reply()));
        let extractor =
            CaseExtractor::new(ProviderKind::Local, Some(local), Some(cloud.clone()));

        let data = extractor.extract_case_data(&request()).await;
        assert_eq!(data.mandant.nachname, "Musterfrau");
        assert_eq!(cloud.calls(), 1);
    }

    #[tokio::test]
    async fn missing_cloud_yields_empty_case_data() {
        let local = MockProvider::new(ProviderKind::Local, Behavior::Unreachable);
        let extractor = CaseExtractor::new(ProviderKind::Local, Some(local), None);

        let data = extractor.extract_case_data(&request()).await;
        assert_eq!(data, CaseData::default());
        assert_eq!(extractor.active_provider(), ProviderKind::Cloud);
    }

    #[tokio::test]
    async fn cloud_initial_never_touches_local() {
        let local = MockProvider::new(ProviderKind::Local, Behavior::Reply(cloud_reply()));
        let cloud = MockProvider::new(ProviderKind::Cloud, Behavior::Reply(cloud_reply()));
        let extractor = CaseExtractor::new(
            ProviderKind::Cloud,
            Some(local.clone()),
            Some(cloud.clone()),
        );

        extractor.extract(&request()).await;
        assert_eq!(local.calls(), 0);
        assert_eq!(cloud.calls(), 1);
    }

    #[tokio::test]
    async fn nested_objects_present_on_every_path() {
        let ok = CaseExtractor::new(
            ProviderKind::Cloud,
            None,
            Some(MockProvider::new(
                ProviderKind::Cloud,
                Behavior::Reply(serde_json::json!({"mandant": null, "unfall": null})),
            )),
        );
        let failed = CaseExtractor::new(
            ProviderKind::Cloud,
            None,
            Some(MockProvider::new(ProviderKind::Cloud, Behavior::Garbage)),
        );
        let absent = CaseExtractor::new(ProviderKind::Cloud, None, None);

        for extractor in [ok, failed, absent] {
            let data = extractor.extract_case_data(&request()).await;
            assert_nested_present(&serde_json::to_value(&data).unwrap());
        }
    }

    #[tokio::test]
    async fn concurrent_failures_flip_flag_once() {
        let local = MockProvider::new(ProviderKind::Local, Behavior::Unreachable);
        let cloud = MockProvider::new(ProviderKind::Cloud, Behavior::Reply(cloud_reply()));
        let extractor = Arc::new(CaseExtractor::new(
            ProviderKind::Local,
            Some(local),
            Some(cloud.clone()),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let extractor = Arc::clone(&extractor);
                tokio::spawn(async move { extractor.extract(&request()).await })
            })
            .collect();
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert_eq!(outcome.metrics.provider, ProviderKind::Cloud);
        }
        assert_eq!(extractor.active_provider(), ProviderKind::Cloud);
        assert_eq!(cloud.calls(), 8);
    }
}

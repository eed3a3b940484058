//! `CaseBackend` over the backend's `/api/ai/` HTTP endpoints.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::backend::CaseBackend;
use crate::backend::types::{
    CasePayload, ClientPayload, CreatedCase, DocumentUpload, InsurerPayload, RecordId,
    TicketPayload,
};
use crate::config::BackendSettings;
use crate::email::guess_mime;
use crate::error::BackendError;

/// Bearer-authenticated JSON and multipart client.
pub struct HttpBackend {
    base_url: String,
    token: SecretString,
    client: reqwest::Client,
    upload_client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self, BackendError> {
        let build = |timeout| {
            reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| BackendError::Connection {
                    endpoint: settings.base_url.clone(),
                    reason: format!("Failed to create HTTP client: {e}"),
                })
        };

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.api_token.clone(),
            client: build(settings.timeout)?,
            upload_client: build(settings.upload_timeout)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/ai/{endpoint}", self.base_url)
    }

    async fn post_json<B, R>(&self, endpoint: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        debug!(endpoint, "Calling backend");
        let response = self
            .client
            .post(self.url(endpoint))
            .bearer_auth(self.token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| connection_error(endpoint, e))?;

        decode(endpoint, response).await
    }
}

fn connection_error(endpoint: &str, err: reqwest::Error) -> BackendError {
    error!(endpoint, error = %err, "Backend connection error");
    BackendError::Connection {
        endpoint: endpoint.to_string(),
        reason: err.to_string(),
    }
}

async fn decode<R: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<R, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(endpoint, status = status.as_u16(), body = %body, "Backend returned an error");
        return Err(BackendError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| BackendError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl CaseBackend for HttpBackend {
    async fn create_client(&self, payload: &ClientPayload) -> Result<RecordId, BackendError> {
        self.post_json("mandant/create", payload).await
    }

    async fn resolve_or_create_insurer(
        &self,
        payload: &InsurerPayload,
    ) -> Result<RecordId, BackendError> {
        self.post_json("gegner/lookup-or-create", payload).await
    }

    async fn create_case(&self, payload: &CasePayload) -> Result<CreatedCase, BackendError> {
        self.post_json("akte/create", payload).await
    }

    async fn upload_document(&self, upload: DocumentUpload) -> Result<(), BackendError> {
        let endpoint = "dokument/upload";
        let mime = guess_mime(&upload.filename);
        let part = Part::bytes(upload.content)
            .file_name(upload.filename.clone())
            .mime_str(&mime)
            .map_err(|e| BackendError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: format!("invalid MIME type {mime}: {e}"),
            })?;
        let form = Form::new()
            .part("file", part)
            .text("akte", upload.case_id.to_string())
            .text("titel", upload.title);

        debug!(endpoint, filename = %upload.filename, "Uploading document");
        let response = self
            .upload_client
            .post(self.url(endpoint))
            .bearer_auth(self.token.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| connection_error(endpoint, e))?;

        let _: serde_json::Value = decode(endpoint, response).await?;
        Ok(())
    }

    async fn create_ticket(&self, payload: &TicketPayload) -> Result<(), BackendError> {
        let _: serde_json::Value = self.post_json("ticket/create", payload).await?;
        Ok(())
    }
}

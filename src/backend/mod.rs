//! Case-management backend client.
//!
//! - `types`: request/response bodies
//! - `http`: reqwest implementation of `CaseBackend`

pub mod http;
pub mod types;

pub use http::HttpBackend;
pub use types::{
    CasePayload, ClientPayload, CreatedCase, DocumentUpload, InsurerPayload, RecordId,
    TicketPayload,
};

use async_trait::async_trait;

use crate::error::BackendError;

/// Record creation and document upload against the backend.
///
/// Every call fails on a non-2xx status or transport error.
#[async_trait]
pub trait CaseBackend: Send + Sync {
    async fn create_client(&self, payload: &ClientPayload) -> Result<RecordId, BackendError>;

    async fn resolve_or_create_insurer(
        &self,
        payload: &InsurerPayload,
    ) -> Result<RecordId, BackendError>;

    async fn create_case(&self, payload: &CasePayload) -> Result<CreatedCase, BackendError>;

    async fn upload_document(&self, upload: DocumentUpload) -> Result<(), BackendError>;

    async fn create_ticket(&self, payload: &TicketPayload) -> Result<(), BackendError>;
}

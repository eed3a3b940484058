//! HTTP surface of the intake service.

pub mod routes;

pub use routes::router;

use crate::config::ServerSettings;
use crate::pipeline::CasePipeline;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: CasePipeline,
    /// Upload limits and allowed extensions.
    pub server: ServerSettings,
    /// Reported by `/health`.
    pub backend_url: String,
}

//! Error types for the intake service.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} unreachable at {endpoint}: {reason}")]
    Connection {
        provider: String,
        endpoint: String,
        reason: String,
    },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned HTTP {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Build a provider error from a transport failure, keeping the
    /// connect/timeout distinction that drives failover. The request URL is
    /// dropped from the message; `endpoint` names the target instead.
    pub fn from_transport(
        provider: &str,
        endpoint: &str,
        timeout: Duration,
        err: reqwest::Error,
    ) -> Self {
        let err = err.without_url();
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
                timeout,
            }
        } else if err.is_connect() || err.is_request() {
            Self::Connection {
                provider: provider.to_string(),
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::RequestFailed {
                provider: provider.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Connection refused, timeout, or other transport-level failure.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::RequestFailed { .. }
        )
    }
}

/// Case-management backend errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend connection error calling {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Backend API error calling {endpoint} (HTTP {status}): {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Invalid backend response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

/// Job-related errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: String },

    #[error("Job {id} already exists")]
    AlreadyExists { id: String },

    #[error("Job {id} is already {status}, no further updates allowed")]
    Terminal { id: String, status: String },

    #[error("Job {id} step {step} cannot go from {from} to {to}")]
    InvalidTransition {
        id: String,
        step: String,
        from: String,
        to: String,
    },

    #[error("Unknown job step: {0}")]
    UnknownStep(String),

    #[error("Unknown step status: {0}")]
    UnknownStatus(String),
}

/// Email parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Unsupported email format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed email {filename}: {reason}")]
    Malformed { filename: String, reason: String },
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Email parsing failed: {0}")]
    Email(#[from] EmailError),

    #[error("{0}")]
    Backend(#[from] BackendError),
}

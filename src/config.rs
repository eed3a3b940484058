//! Configuration types.
//!
//! Everything comes from environment variables. `from_lookup` takes the
//! variable source as a closure so tests never touch the process env.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::ProviderKind;

/// Extraction provider settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Initial active provider.
    pub provider: ProviderKind,
    pub cloud_api_key: SecretString,
    pub cloud_model: String,
    pub cloud_base_url: String,
    pub local_url: String,
    pub vision_model: String,
    pub mapping_model: String,
    /// Timeout for every provider call.
    pub timeout: Duration,
    /// Character budget for email text sent to a provider.
    pub text_budget: usize,
}

/// Case-management backend settings.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub api_token: SecretString,
    pub timeout: Duration,
    pub upload_timeout: Duration,
}

/// HTTP server and upload limits.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
    pub max_file_size: usize,
    /// Lowercase, with leading dot (".eml").
    pub allowed_extensions: Vec<String>,
    /// How long finished jobs stay queryable before the sweep drops them.
    pub job_retention: Duration,
}

impl ServerSettings {
    pub fn is_allowed(&self, filename: &str) -> bool {
        match file_extension(filename) {
            Some(ext) => self.allowed_extensions.iter().any(|a| *a == ext),
            None => false,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: String,
    pub file: PathBuf,
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub llm: LlmSettings,
    pub backend: BackendSettings,
    pub server: ServerSettings,
    pub log: LogSettings,
}

impl ServiceConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let provider_name = get("LLM_PROVIDER", "gemini");
        let provider =
            ProviderKind::parse(&provider_name).ok_or_else(|| ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                message: format!("unknown provider '{provider_name}', expected gemini or loki"),
            })?;

        let llm = LlmSettings {
            provider,
            cloud_api_key: SecretString::from(get("GEMINI_API_KEY", "")),
            cloud_model: get("GEMINI_MODEL", "gemini-flash-latest"),
            cloud_base_url: get(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com",
            ),
            local_url: get("LOKI_URL", "http://10.10.10.5:11434"),
            vision_model: get("LOKI_VISION_MODEL", "llama-vision-work"),
            mapping_model: get("LOKI_MAPPING_MODEL", "qwen-work"),
            timeout: Duration::from_secs(parse_number(
                &get("LLM_TIMEOUT_SECS", "120"),
                "LLM_TIMEOUT_SECS",
            )?),
            text_budget: parse_number(
                &get("EXTRACTION_TEXT_BUDGET", "15000"),
                "EXTRACTION_TEXT_BUDGET",
            )?,
        };

        let backend = BackendSettings {
            base_url: get("BACKEND_URL", "http://localhost:8000")
                .trim_end_matches('/')
                .to_string(),
            api_token: SecretString::from(get("BACKEND_API_TOKEN", "")),
            timeout: Duration::from_secs(parse_number(
                &get("BACKEND_TIMEOUT_SECS", "30"),
                "BACKEND_TIMEOUT_SECS",
            )?),
            upload_timeout: Duration::from_secs(parse_number(
                &get("BACKEND_UPLOAD_TIMEOUT_SECS", "60"),
                "BACKEND_UPLOAD_TIMEOUT_SECS",
            )?),
        };

        let max_file_size_mb: usize =
            parse_number(&get("MAX_FILE_SIZE_MB", "50"), "MAX_FILE_SIZE_MB")?;
        let max_file_size = max_file_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "MAX_FILE_SIZE_MB".to_string(),
                message: format!("'{max_file_size_mb}' MB overflows the byte limit"),
            })?;
        let retention_hours: u64 =
            parse_number(&get("JOB_RETENTION_HOURS", "24"), "JOB_RETENTION_HOURS")?;
        let job_retention = retention_hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "JOB_RETENTION_HOURS".to_string(),
                message: format!("'{retention_hours}' hours is out of range"),
            })?;
        let server = ServerSettings {
            port: parse_number(&get("SERVICE_PORT", "5000"), "SERVICE_PORT")?,
            max_file_size,
            allowed_extensions: get(
                "ALLOWED_EXTENSIONS",
                ".eml,.msg,.pdf,.jpg,.jpeg,.png,.doc,.docx",
            )
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .map(|s| if s.starts_with('.') { s } else { format!(".{s}") })
            .collect(),
            job_retention,
        };

        let log = LogSettings {
            level: get("LOG_LEVEL", "info").to_ascii_lowercase(),
            file: PathBuf::from(get("LOG_FILE", "logs/ai-service.log")),
        };

        Ok(Self {
            llm,
            backend,
            server,
            log,
        })
    }
}

fn parse_number<T>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{value}': {e}"),
    })
}

/// Lowercase extension with leading dot, if the name has one.
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

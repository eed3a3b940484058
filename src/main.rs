use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secrecy::ExposeSecret;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use kanzlei_intake::api::{self, AppState};
use kanzlei_intake::backend::HttpBackend;
use kanzlei_intake::config::{LogSettings, ServiceConfig};
use kanzlei_intake::email::EmailParser;
use kanzlei_intake::jobs::JobTracker;
use kanzlei_intake::llm::create_extractor;
use kanzlei_intake::pipeline::CasePipeline;

const JOB_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(&config.log)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        provider = %config.llm.provider,
        cloud_model = %config.llm.cloud_model,
        local_url = %config.llm.local_url,
        gemini_key_len = config.llm.cloud_api_key.expose_secret().len(),
        backend_url = %config.backend.base_url,
        backend_token_len = config.backend.api_token.expose_secret().len(),
        job_retention_hours = config.server.job_retention.as_secs() / 3600,
        "Starting Kanzlei AI Service"
    );

    let extractor = Arc::new(create_extractor(&config.llm));
    let backend = Arc::new(HttpBackend::new(&config.backend).context("Backend client setup failed")?);
    let tracker = Arc::new(JobTracker::new());
    Arc::clone(&tracker).spawn_sweeper(config.server.job_retention, JOB_SWEEP_INTERVAL);
    let pipeline = CasePipeline::new(
        tracker,
        extractor,
        backend,
        Arc::new(EmailParser::default()),
    );

    let app = api::router(AppState {
        pipeline,
        server: config.server.clone(),
        backend_url: config.backend.base_url.clone(),
    });

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Stderr plus a daily-rolling file next to `LOG_FILE`. `RUST_LOG` wins
/// over `LOG_LEVEL`.
fn init_tracing(log: &LogSettings) -> anyhow::Result<WorkerGuard> {
    let dir = log
        .file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let prefix = log
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("ai-service.log");

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, prefix));

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

//! Logging bootstrap. Everything goes to stderr; stdout carries protocol
//! output.

use anyhow::{Context, Result};
use jaby_core::config::LoggingSettings;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
///
/// The returned guard flushes the log file when dropped; keep it alive for
/// the whole run.
pub fn init_logging(config: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.json {
        layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
    } else {
        layers.push(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    let mut guard = None;
    if let Some(log_path) = &config.file {
        let dir = log_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        let file_name = log_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("jaby.log");

        let (writer, worker_guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    if let Some(log_path) = &config.file {
        tracing::info!(path = %log_path.display(), "file logging enabled");
    }
    Ok(guard)
}

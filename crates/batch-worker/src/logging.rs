use anyhow::{Context, Result};
use core_types::config::LoggingConfig;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Build the filter: `RUST_LOG` when set, otherwise the configured level.
pub fn env_filter(cfg: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&cfg.level)
            .with_context(|| format!("invalid log level {:?}", cfg.level)),
    }
}

/// Install the global subscriber: stdout (text or JSON) plus an optional
/// plain-text log file. Keep the returned guard alive until exit so buffered
/// file output is flushed.
pub fn init_tracing_with_config(cfg: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(cfg)?;

    let (file_layer, guard) = match cfg.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file {file:?} has no file name"))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_target(true).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = cfg
        .json
        .then(|| fmt::layer().json().with_target(true).with_thread_names(true));
    let text_layer = (!cfg.json).then(|| fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

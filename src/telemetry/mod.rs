//! Tracing setup and structured tutor events.

pub mod events;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::orchestrator::config::LogConfig;

/// File name prefix for the daily rolling log.
const LOG_FILE_PREFIX: &str = "hablaconmigo.log";

/// Installs the global subscriber. Keep the returned guard alive for as long
/// as file logging should flush.
///
/// Filtering follows `RUST_LOG` and falls back to `info`. Console output goes
/// to stderr, as JSON when `config.json` is set. With `config.dir` set, JSON
/// lines are also written to a daily rolling file through a non-blocking
/// writer; `None` is returned otherwise.
pub fn init_tracing(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console = if config.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(env_filter)
        .with(console)
        .with(file);

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global subscriber")?;
    Ok(guard)
}

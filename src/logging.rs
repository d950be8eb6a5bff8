use anyhow::{Error, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;

const DIAGNOSTICS_PREFIX: &str = "pingstats.diag.log";

/// Installs the global subscriber. With a diagnostics directory, events go to a daily rolling
/// file and the returned guard must be held until exit so buffered lines are flushed.
pub fn init(config: &AppConfig, diagnostics_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;
    match diagnostics_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, DIAGNOSTICS_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|err| Error::msg(err))?;
            Ok(Some(guard))
        }
        None => {
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|err| Error::msg(err))?;
            Ok(None)
        }
    }
}

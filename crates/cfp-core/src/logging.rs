//! Tracing setup for binaries.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{DEFAULT_LOG_FILTER, env};

/// Picks the filter directive: `CFP_LOG`, else the configured one, else
/// [`DEFAULT_LOG_FILTER`].
pub fn resolve_filter(env_value: Option<&str>, configured: Option<&str>) -> String {
    [env_value, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(DEFAULT_LOG_FILTER)
        .to_string()
}

/// Installs a stderr subscriber. Keep the returned guard alive until exit so
/// buffered lines get flushed.
///
/// # Errors
/// Returns an error if the filter does not parse or a global subscriber is
/// already set.
pub fn init(configured: Option<&str>) -> Result<WorkerGuard> {
    let from_env = std::env::var(env::LOG).ok();
    let directive = resolve_filter(from_env.as_deref(), configured);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter '{directive}'"))?;

    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("Failed to install logger: {err}"))?;

    Ok(guard)
}

//! # Structured Logging
//!
//! `tracing` subscriber setup. Output goes to stderr so `quote` and
//! `version` keep stdout to themselves.

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. Request traces from `tower_http`
/// stay off unless asked for.
pub const DEFAULT_FILTER: &str =
    "accrue_node=info,accrue_contracts=info,accrue_protocol=info,tower_http=warn";

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Colored, with source locations.
    Pretty,
    /// One JSON object per line, ledger fields flattened.
    Json,
}

/// Installs the global subscriber. `RUST_LOG` wins over `filter`.
///
/// # Errors
///
/// Fails if `filter` does not parse or a subscriber is already installed.
pub fn init_logging(filter: &str, format: LogFormat) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(filter)?,
    };
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))?;

    tracing::debug!(?format, "logging initialized");
    Ok(())
}

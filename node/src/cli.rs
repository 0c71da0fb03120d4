//! # CLI Interface
//!
//! Defines the command-line argument structure for `accrue-node` using
//! `clap` derive. Supports three subcommands: `run`, `quote`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use accrue_protocol::config::{DEFAULT_API_PORT, DEFAULT_INITIAL_RATE, DEFAULT_METRICS_PORT};

use crate::logging::LogFormat;

/// Accrue vault node.
///
/// Hosts a single deposit vault over a linear-accrual ledger. Serves the
/// REST API and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "accrue-node",
    about = "Accrue deposit vault node",
    version,
    propagate_version = true
)]
pub struct AccrueNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Accrue node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Compute an accrued balance offline.
    Quote(QuoteArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the ledger database. Created on first run.
    #[arg(long, short = 'd', env = "ACCRUE_DATA_DIR", default_value = "./accrue-data")]
    pub data_dir: PathBuf,

    /// Keep all state in memory and discard it on exit.
    #[arg(long, env = "ACCRUE_EPHEMERAL")]
    pub ephemeral: bool,

    /// Port for the REST API.
    #[arg(long, env = "ACCRUE_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "ACCRUE_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Global rate for a fresh ledger, per second, scaled by 1e18.
    ///
    /// Ignored when the data directory already holds a ledger.
    #[arg(long, env = "ACCRUE_INITIAL_RATE", default_value_t = DEFAULT_INITIAL_RATE)]
    pub initial_rate: u128,

    /// Account granted the rate-admin capability.
    #[arg(long, env = "ACCRUE_ADMIN", default_value = "admin")]
    pub admin: String,

    /// Bearer token required on `POST /rate`. Without one the endpoint
    /// refuses every request.
    #[arg(long, env = "ACCRUE_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Address the API and metrics servers listen on.
    #[arg(long, env = "ACCRUE_BIND", default_value = "127.0.0.1")]
    pub bind: String,

    /// Opening payout reserve when none has been saved yet.
    #[arg(long, env = "ACCRUE_RESERVE", default_value_t = 0)]
    pub reserve: u128,

    /// Log output format.
    #[arg(long, env = "ACCRUE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `quote` subcommand.
#[derive(Parser, Debug)]
pub struct QuoteArgs {
    /// Principal at the start of the period.
    #[arg(long)]
    pub principal: u128,

    /// Personal rate, per second, scaled by 1e18.
    #[arg(long, default_value_t = DEFAULT_INITIAL_RATE)]
    pub rate: u128,

    /// Seconds elapsed since the last sync.
    #[arg(long)]
    pub elapsed: u64,
}

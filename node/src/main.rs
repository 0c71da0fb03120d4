// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Accrue Vault Node
//!
//! Entry point for the `accrue-node` binary. Parses CLI arguments, initializes
//! logging and metrics, restores the ledger from disk, and serves the HTTP/WS
//! API.
//!
//! The binary supports three subcommands:
//!
//! - `run`:     start the node
//! - `quote`:   offline accrual calculator
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use accrue_contracts::payout::ReserveRail;
use accrue_contracts::vault::Vault;
use accrue_protocol::config::{
    annual_rate_bps, DEFAULT_LEDGER_ADDRESS, DEFAULT_VAULT_ADDRESS, PROTOCOL_VERSION,
};
use accrue_protocol::ledger::{
    accrued_balance, AccountId, AccrualLedger, Capability, CapabilityRegistry, Clock, SystemClock,
};
use accrue_protocol::storage::LedgerDb;

use cli::{AccrueNodeCli, Commands};
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AccrueNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Quote(args) => quote(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: restores or creates the ledger, then serves the API
/// and metrics endpoints until a shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format)?;

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        ephemeral = args.ephemeral,
        "starting accrue-node"
    );

    // --- Capabilities ---
    let admin = AccountId::parse(args.admin.clone())
        .with_context(|| format!("invalid admin account {:?}", args.admin))?;
    if args.admin_token.is_none() {
        tracing::warn!("no admin token configured, POST /rate is disabled");
    }
    let vault_address = AccountId::from(DEFAULT_VAULT_ADDRESS);
    let registry = Arc::new(CapabilityRegistry::new());
    registry.grant(&vault_address, Capability::MintBurn);
    registry.grant(&admin, Capability::RateAdmin);

    // --- Persistent storage ---
    let db = if args.ephemeral {
        None
    } else {
        let db_path = args.data_dir.join("db");
        std::fs::create_dir_all(&db_path).with_context(|| {
            format!("failed to create database directory: {}", db_path.display())
        })?;
        let db = LedgerDb::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;
        tracing::info!(path = %db_path.display(), "database opened");
        Some(Arc::new(db))
    };

    // --- Ledger ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let saved = match &db {
        Some(db) => db.load().context("failed to load ledger state")?,
        None => None,
    };
    let ledger = match saved {
        Some(state) => {
            tracing::info!(
                accounts = state.accounts.len(),
                rate = %state.rate,
                rate_version = state.rate_version,
                "ledger restored"
            );
            AccrualLedger::from_state(state, clock, registry)
        }
        None => {
            tracing::info!(rate = %args.initial_rate, "creating fresh ledger");
            AccrualLedger::new(
                AccountId::from(DEFAULT_LEDGER_ADDRESS),
                args.initial_rate,
                clock,
                registry,
            )
        }
    };

    let reserve = match &db {
        Some(db) => db
            .load_reserve()
            .context("failed to load payout reserve")?
            .unwrap_or(args.reserve),
        None => args.reserve,
    };
    let vault = Vault::new(vault_address, ledger, ReserveRail::new(reserve));

    if let Some(db) = &db {
        db.save(&vault.ledger().export_state())
            .context("failed to write initial ledger state")?;
        db.save_reserve(reserve)
            .context("failed to write initial reserve")?;
    }

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics.observe(&vault);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        vault: Arc::new(Mutex::new(vault)),
        db,
        admin,
        admin_token: args.admin_token.map(Arc::from),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("accrue-node stopped");
    Ok(())
}

/// Prints the balance `principal` grows to after `elapsed` seconds.
fn quote(args: cli::QuoteArgs) -> Result<()> {
    let balance = accrued_balance(args.principal, args.rate, 0, args.elapsed)
        .context("accrual does not fit in u128")?;

    println!("principal : {}", args.principal);
    println!("rate      : {} ({} bps/yr)", args.rate, annual_rate_bps(args.rate));
    println!("elapsed   : {}s", args.elapsed);
    println!("balance   : {}", balance);
    println!("interest  : {}", balance - args.principal);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("accrue-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", PROTOCOL_VERSION);
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that branch never resolves and the other one still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

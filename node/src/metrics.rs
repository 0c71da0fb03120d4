//! # Prometheus Metrics
//!
//! Exposes operational metrics for the vault node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use accrue_contracts::payout::{PayoutRail, ReserveRail};
use accrue_contracts::vault::Vault;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are reference counted) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Successful deposits.
    pub deposits_total: IntCounter,
    /// Successful redemptions.
    pub redemptions_total: IntCounter,
    /// Successful transfers, direct and delegated.
    pub transfers_total: IntCounter,
    /// Rejected operations, labelled by endpoint.
    pub failed_operations_total: IntCounterVec,
    /// Current global rate (per second, scaled by 1e18).
    pub global_rate: Gauge,
    /// Sum of materialized principals.
    pub total_supply: Gauge,
    /// Value held by the payout rail.
    pub reserve: Gauge,
    /// Accounts with a ledger record.
    pub accounts: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("accrue".into()), None)?;

        let deposits_total = IntCounter::new("deposits_total", "Total successful deposits")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let redemptions_total =
            IntCounter::new("redemptions_total", "Total successful redemptions")?;
        registry.register(Box::new(redemptions_total.clone()))?;

        let transfers_total = IntCounter::new(
            "transfers_total",
            "Total successful direct and delegated transfers",
        )?;
        registry.register(Box::new(transfers_total.clone()))?;

        let failed_operations_total = IntCounterVec::new(
            Opts::new("failed_operations_total", "Rejected operations by endpoint"),
            &["operation"],
        )?;
        registry.register(Box::new(failed_operations_total.clone()))?;

        let global_rate = Gauge::new("global_rate", "Current global rate, per second, 1e18 scale")?;
        registry.register(Box::new(global_rate.clone()))?;

        let total_supply = Gauge::new("total_supply", "Sum of materialized principals")?;
        registry.register(Box::new(total_supply.clone()))?;

        let reserve = Gauge::new("reserve", "Value held by the payout rail")?;
        registry.register(Box::new(reserve.clone()))?;

        let accounts = IntGauge::new("accounts", "Accounts with a ledger record")?;
        registry.register(Box::new(accounts.clone()))?;

        Ok(Self {
            registry,
            deposits_total,
            redemptions_total,
            transfers_total,
            failed_operations_total,
            global_rate,
            total_supply,
            reserve,
            accounts,
        })
    }

    /// Refreshes the gauges from the vault's current state.
    pub fn observe(&self, vault: &Vault<ReserveRail>) {
        let ledger = vault.ledger();
        self.global_rate.set(ledger.rate() as f64);
        self.total_supply.set(ledger.total_supply() as f64);
        self.reserve.set(vault.rail().reserve() as f64);
        self.accounts
            .set(i64::try_from(ledger.account_count()).unwrap_or(i64::MAX));
    }

    /// Counts a rejected call to `operation`.
    pub fn record_failure(&self, operation: &str) {
        self.failed_operations_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

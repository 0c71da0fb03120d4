//! # Protocol Configuration & Constants
//!
//! Every magic number in Accrue lives here. If you're hardcoding a constant
//! somewhere else, move it here.
//!
//! Rates are fixed-point values scaled by [`PRECISION`]. A rate of
//! `5 * 10^10` means "5e-8 units of value per unit of principal per second",
//! which is roughly 158% simple interest per year. Pick rates accordingly.

/// Fixed-point scale shared by every rate and accrual factor. 18 decimals,
/// same convention as most on-chain token math.
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Seconds in a (non-leap) year. Only used for display and quoting; the
/// ledger itself accrues per second.
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// Global rate a freshly created ledger starts with: 5e-8 per second.
pub const DEFAULT_INITIAL_RATE: u128 = 50_000_000_000;

/// Default display name for the receipt token.
pub const DEFAULT_TOKEN_NAME: &str = "Accrue Receipt";

/// Default ticker symbol for the receipt token.
pub const DEFAULT_TOKEN_SYMBOL: &str = "aRCPT";

/// Display decimals of the receipt token. The ledger never divides by this.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Identifier the ledger uses for itself when no other is configured.
pub const DEFAULT_LEDGER_ADDRESS: &str = "accrue:ledger";

/// Identifier the vault uses when it calls into the ledger.
pub const DEFAULT_VAULT_ADDRESS: &str = "accrue:vault";

/// Allowance value treated as "unlimited": `transfer_from` never decrements it.
pub const UNLIMITED_ALLOWANCE: u128 = u128::MAX;

/// Crate version string, surfaced by the node's `/status` endpoint.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Node defaults
// ---------------------------------------------------------------------------

/// Default REST API port.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Returns the annualized simple rate in basis points for a per-second
/// fixed-point rate. Display helper only.
pub fn annual_rate_bps(rate: u128) -> u128 {
    rate.saturating_mul(SECONDS_PER_YEAR as u128)
        .saturating_mul(10_000)
        / PRECISION
}

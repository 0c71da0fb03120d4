//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the vault node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                            | Description                          |
//! |--------|---------------------------------|--------------------------------------|
//! | GET    | `/health`                       | Liveness probe                       |
//! | GET    | `/status`                       | Rate, supply, reserve                |
//! | GET    | `/accounts/:id`                 | Balance and accrual record           |
//! | GET    | `/allowances/:owner/:spender`   | Delegated-transfer allowance         |
//! | GET    | `/ws`                           | WebSocket for live ledger events     |
//! | POST   | `/deposit`                      | Deposit and mint                     |
//! | POST   | `/redeem`                       | Burn and pay out                     |
//! | POST   | `/transfer`                     | Direct transfer                      |
//! | POST   | `/approve`                      | Set an allowance                     |
//! | POST   | `/transfer-from`                | Delegated transfer                   |
//! | POST   | `/rate`                         | Lower the global rate                |
//!
//! Amounts in request bodies accept a JSON number, a decimal string (for
//! values above `u64::MAX`), or `"all"` where the full balance is meant.
//!
//! ## Trust model
//!
//! `POST /rate` acts as the configured admin account and requires
//! `Authorization: Bearer <admin token>`. The caller is never read from the
//! body. Without a configured token the endpoint refuses every request.
//!
//! The user endpoints take account identities from the request body as-is.
//! They are a trusted local surface for a wallet or gateway that has already
//! authenticated its users, which is why the node binds to loopback unless
//! told otherwise.

use axum::{
    async_trait,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRequestParts, Path, State,
    },
    http::{header::AUTHORIZATION, request::Parts, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use accrue_contracts::payout::{PayoutRail, ReserveRail};
use accrue_contracts::vault::{Vault, VaultError, VaultEvent};
use accrue_protocol::config::annual_rate_bps;
use accrue_protocol::ledger::{AccountId, AmountRequest, LedgerError, LedgerEvent, Rate};
use accrue_protocol::storage::LedgerDb;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// The vault served by this node.
pub type SharedVault = Arc<Mutex<Vault<ReserveRail>>>;

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The vault and, through it, the ledger and payout rail.
    pub vault: SharedVault,
    /// Persistent store. `None` runs the node in memory only.
    pub db: Option<Arc<LedgerDb>>,
    /// Account that `POST /rate` acts as.
    pub admin: AccountId,
    /// Bearer token guarding `POST /rate`. `None` disables the endpoint.
    pub admin_token: Option<Arc<str>>,
    /// Broadcast channel for live event notifications.
    pub event_tx: broadcast::Sender<NodeEvent>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum NodeEvent {
    /// Something changed on the ledger.
    Ledger { event: LedgerEvent },
    /// A deposit or redemption completed.
    Vault { event: VaultEvent },
}

impl AppState {
    /// Publishes pending events, refreshes the gauges, then persists the
    /// ledger and reserve. Called with the vault lock held after every
    /// successful mutation.
    ///
    /// The mutation has already happened in memory by now, so events and
    /// gauges go out even when the write fails.
    fn commit(&self, vault: &mut Vault<ReserveRail>) -> Result<(), ApiError> {
        for event in vault.ledger_mut().take_events() {
            // No subscribers is not an error.
            let _ = self.event_tx.send(NodeEvent::Ledger { event });
        }
        for event in vault.take_events() {
            let _ = self.event_tx.send(NodeEvent::Vault { event });
        }
        self.metrics.observe(vault);

        let Some(db) = &self.db else {
            return Ok(());
        };
        db.save(&vault.ledger().export_state())
            .and_then(|()| db.save_reserve(vault.rail().reserve()))
            .map_err(|err| {
                tracing::error!(
                    error = %err,
                    "ledger changed in memory but was not persisted"
                );
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "operation applied but not persisted",
                )
            })
    }

    /// Runs `op` against the locked vault and commits on success.
    fn mutate<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut Vault<ReserveRail>) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut vault = self.vault.lock();
        let result = op(&mut vault).and_then(|value| {
            self.commit(&mut vault)?;
            Ok(value)
        });
        if let Err(e) = &result {
            self.metrics.record_failure(operation);
            tracing::debug!(operation, status = %e.status, error = %e.message, "request rejected");
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/accounts/:id", get(account_handler))
        .route("/allowances/:owner/:spender", get(allowance_handler))
        .route("/ws", get(ws_handler))
        .route("/deposit", post(deposit_handler))
        .route("/redeem", post(redeem_handler))
        .route("/transfer", post(transfer_handler))
        .route("/approve", post(approve_handler))
        .route("/transfer-from", post(transfer_from_handler))
        .route("/rate", post(rate_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An error rendered as `{"error": ...}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            LedgerError::InsufficientBalance { .. }
            | LedgerError::InsufficientAllowance { .. }
            | LedgerError::RateIncreaseRejected { .. }
            | LedgerError::StaleRateVersion { .. } => StatusCode::CONFLICT,
            LedgerError::InvalidAccount => StatusCode::BAD_REQUEST,
            LedgerError::ArithmeticOverflow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, err.to_string())
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Ledger(inner) => inner.into(),
            VaultError::ZeroAmount => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            VaultError::PayoutFailed { .. } | VaultError::DepositRejected { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// The node's rate administrator, proven by the bearer token.
#[derive(Debug)]
pub struct RateAdmin(pub AccountId);

#[async_trait]
impl FromRequestParts<AppState> for RateAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let Some(expected) = state.admin_token.as_deref() else {
            return Err(ApiError::new(
                StatusCode::FORBIDDEN,
                "rate administration is disabled on this node",
            ));
        };
        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "missing bearer token"))?;

        if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            tracing::warn!("rejected rate change with an invalid admin token");
            return Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid bearer token"));
        }
        Ok(RateAdmin(state.admin.clone()))
    }
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body of `POST /deposit`.
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub account: AccountId,
    #[serde(deserialize_with = "deserialize_exact")]
    pub value: u128,
}

/// Body of `POST /redeem`.
#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub account: AccountId,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: AmountRequest,
}

/// Body of `POST /transfer`.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from: AccountId,
    pub to: AccountId,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: AmountRequest,
}

/// Body of `POST /approve`. `"all"` grants an unlimited allowance.
#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub owner: AccountId,
    pub spender: AccountId,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: AmountRequest,
}

/// Body of `POST /transfer-from`.
#[derive(Debug, Deserialize)]
pub struct TransferFromRequest {
    pub spender: AccountId,
    pub from: AccountId,
    pub to: AccountId,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: AmountRequest,
}

/// Body of `POST /rate`. With `expected_version` the change only applies
/// if nobody else changed the rate first.
#[derive(Debug, Deserialize)]
pub struct RateRequest {
    #[serde(deserialize_with = "deserialize_exact")]
    pub rate: Rate,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

struct AmountVisitor;

impl<'de> serde::de::Visitor<'de> for AmountVisitor {
    type Value = AmountRequest;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer, a decimal string, or \"all\"")
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(AmountRequest::Exact(u128::from(v)))
    }

    fn visit_u128<E: serde::de::Error>(self, v: u128) -> Result<Self::Value, E> {
        Ok(AmountRequest::Exact(v))
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u128::try_from(v)
            .map(AmountRequest::Exact)
            .map_err(|_| E::custom("amount must not be negative"))
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        if v.eq_ignore_ascii_case("all") {
            return Ok(AmountRequest::All);
        }
        v.parse::<u128>()
            .map(AmountRequest::Exact)
            .map_err(|_| E::custom(format!("invalid amount: {v:?}")))
    }
}

fn deserialize_amount<'de, D: Deserializer<'de>>(d: D) -> Result<AmountRequest, D::Error> {
    d.deserialize_any(AmountVisitor)
}

fn deserialize_exact<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
    match deserialize_amount(d)? {
        AmountRequest::Exact(v) => Ok(v),
        AmountRequest::All => Err(serde::de::Error::custom("\"all\" is not allowed here")),
    }
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub ledger_address: String,
    pub vault_address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub rate: Rate,
    pub rate_version: u64,
    /// Simple annual yield of `rate`, in basis points.
    pub annual_rate_bps: u128,
    /// Sum of materialized principals.
    pub total_supply: u128,
    /// Sum of current balances, including unmaterialized interest.
    pub projected_total_supply: u128,
    pub reserve: u128,
    pub accounts: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /accounts/:id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub account: String,
    pub balance: u128,
    pub principal: u128,
    pub personal_rate: Rate,
    pub last_sync: u64,
    pub pending_interest: u128,
}

/// Response payload for `GET /allowances/:owner/:spender`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AllowanceResponse {
    pub owner: String,
    pub spender: String,
    pub allowance: u128,
}

/// Result of a deposit, redeem or transfer.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    /// Amount minted, burned or moved.
    pub amount: u128,
    /// Balance of the acting account afterwards.
    pub balance: u128,
}

/// Result of a rate change.
#[derive(Debug, Serialize, Deserialize)]
pub struct RateResponse {
    pub rate: Rate,
    pub rate_version: u64,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: ledger and reserve summary.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let vault = state.vault.lock();
    let ledger = vault.ledger();
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        ledger_address: ledger.address().to_string(),
        vault_address: vault.address().to_string(),
        name: ledger.name().to_string(),
        symbol: ledger.symbol().to_string(),
        decimals: ledger.decimals(),
        rate: ledger.rate(),
        rate_version: ledger.rate_version(),
        annual_rate_bps: annual_rate_bps(ledger.rate()),
        total_supply: ledger.total_supply(),
        projected_total_supply: ledger.projected_total_supply()?,
        reserve: vault.rail().reserve(),
        accounts: ledger.account_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /accounts/:id`: balance and raw record. Unknown accounts read as
/// empty.
async fn account_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = AccountId::parse(id)?;
    let vault = state.vault.lock();
    let ledger = vault.ledger();
    let record = ledger.account(&account).unwrap_or_default();
    Ok(Json(AccountResponse {
        account: account.to_string(),
        balance: ledger.balance_of(&account)?,
        principal: record.principal,
        personal_rate: record.personal_rate,
        last_sync: record.last_sync,
        pending_interest: record.pending_interest(ledger.now())?,
    }))
}

/// `GET /allowances/:owner/:spender`.
async fn allowance_handler(
    Path((owner, spender)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let owner = AccountId::parse(owner)?;
    let spender = AccountId::parse(spender)?;
    let allowance = state.vault.lock().ledger().allowance(&owner, &spender);
    Ok(Json(AllowanceResponse {
        owner: owner.to_string(),
        spender: spender.to_string(),
        allowance,
    }))
}

/// `POST /deposit`.
async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let balance = state.mutate("deposit", |vault| {
        let balance = vault.deposit(&req.account, req.value)?;
        state.metrics.deposits_total.inc();
        Ok(balance)
    })?;
    Ok(Json(OperationResponse {
        amount: req.value,
        balance,
    }))
}

/// `POST /redeem`.
async fn redeem_handler(
    State(state): State<AppState>,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let (amount, balance) = state.mutate("redeem", |vault| {
        let amount = vault.redeem(&req.account, req.amount)?;
        state.metrics.redemptions_total.inc();
        Ok((amount, settled_balance(vault, &req.account)))
    })?;
    Ok(Json(OperationResponse { amount, balance }))
}

/// `POST /transfer`.
async fn transfer_handler(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let (amount, balance) = state.mutate("transfer", |vault| {
        let amount = vault.ledger_mut().transfer(&req.from, &req.to, req.amount)?;
        state.metrics.transfers_total.inc();
        Ok((amount, settled_balance(vault, &req.from)))
    })?;
    Ok(Json(OperationResponse { amount, balance }))
}

/// `POST /approve`.
async fn approve_handler(
    State(state): State<AppState>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let amount = match req.amount {
        AmountRequest::Exact(v) => v,
        AmountRequest::All => accrue_protocol::config::UNLIMITED_ALLOWANCE,
    };
    state.mutate("approve", |vault| {
        Ok(vault.ledger_mut().approve(&req.owner, &req.spender, amount)?)
    })?;
    Ok(Json(AllowanceResponse {
        owner: req.owner.to_string(),
        spender: req.spender.to_string(),
        allowance: amount,
    }))
}

/// `POST /transfer-from`.
async fn transfer_from_handler(
    State(state): State<AppState>,
    Json(req): Json<TransferFromRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let (amount, balance) = state.mutate("transfer_from", |vault| {
        let amount = vault
            .ledger_mut()
            .transfer_from(&req.spender, &req.from, &req.to, req.amount)?;
        state.metrics.transfers_total.inc();
        Ok((amount, settled_balance(vault, &req.from)))
    })?;
    Ok(Json(OperationResponse { amount, balance }))
}

/// `POST /rate`: lower (or re-set) the global rate as the admin account.
async fn rate_handler(
    State(state): State<AppState>,
    RateAdmin(admin): RateAdmin,
    Json(req): Json<RateRequest>,
) -> Result<Json<RateResponse>, ApiError> {
    let response = state.mutate("rate", |vault| {
        let ledger = vault.ledger_mut();
        match req.expected_version {
            Some(expected) => ledger.compare_and_set_rate(&admin, expected, req.rate)?,
            None => ledger.set_rate(&admin, req.rate)?,
        }
        Ok(RateResponse {
            rate: ledger.rate(),
            rate_version: ledger.rate_version(),
        })
    })?;
    Ok(Json(response))
}

/// Balance of an account a mutation just touched. The mutation materialized
/// the record, so its principal is the balance and nothing can fail here.
fn settled_balance(vault: &Vault<ReserveRail>, account: &AccountId) -> u128 {
    vault
        .ledger()
        .account(account)
        .map_or(0, |record| record.principal)
}

/// `GET /ws`: WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`NodeEvent`] messages. The connection is
/// read-only from the server's perspective; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use accrue_protocol::config::{DEFAULT_INITIAL_RATE, PRECISION};
    use accrue_protocol::ledger::{
        AccrualLedger, Capability, CapabilityRegistry, ManualClock,
    };

    struct TestNode {
        state: AppState,
        clock: Arc<ManualClock>,
        registry: Arc<CapabilityRegistry>,
    }

    const ADMIN_TOKEN: &str = "s3cret-admin-token";

    /// Creates a node over a manual clock, optionally backed by a
    /// temporary database.
    fn test_node(reserve: u128, persistent: bool) -> TestNode {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let registry = Arc::new(CapabilityRegistry::new());
        let vault_address = AccountId::from("vault");
        registry.grant(&vault_address, Capability::MintBurn);
        registry.grant(&AccountId::from("admin"), Capability::RateAdmin);
        let ledger = AccrualLedger::new(
            AccountId::from("ledger"),
            DEFAULT_INITIAL_RATE,
            clock.clone(),
            registry.clone(),
        );
        let vault = Vault::new(vault_address, ledger, ReserveRail::new(reserve));
        let db = persistent.then(|| Arc::new(LedgerDb::open_temporary().expect("temp db")));
        let (event_tx, _) = broadcast::channel(64);

        TestNode {
            state: AppState {
                version: "0.1.0-test".into(),
                vault: Arc::new(Mutex::new(vault)),
                db,
                admin: AccountId::from("admin"),
                admin_token: Some(Arc::from(ADMIN_TOKEN)),
                event_tx,
                metrics: Arc::new(crate::metrics::NodeMetrics::new().unwrap()),
            },
            clock,
            registry,
        }
    }

    async fn read(resp: Response) -> (StatusCode, serde_json::Value) {
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        read(router.clone().oneshot(req).await.unwrap()).await
    }

    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        read(send(router, path, None, body).await).await
    }

    async fn post_rate(
        router: &Router,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        read(send(router, "/rate", token, body).await).await
    }

    async fn send(
        router: &Router,
        path: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> Response {
        let mut req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let req = req
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        router.clone().oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let node = test_node(0, false);
        let router = create_router(node.state);
        let (status, json) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn deposit_then_accrue_then_redeem_all() {
        let node = test_node(10, false);
        let router = create_router(node.state.clone());

        let (status, json) = post_json(
            &router,
            "/deposit",
            serde_json::json!({ "account": "alice", "value": 100 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["balance"], 100);

        node.clock.advance(2_000_000);
        let (status, json) = get(&router, "/accounts/alice").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["balance"], 110);
        assert_eq!(json["principal"], 100);
        assert_eq!(json["pending_interest"], 10);

        let (status, json) = post_json(
            &router,
            "/redeem",
            serde_json::json!({ "account": "alice", "amount": "all" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["amount"], 110);
        assert_eq!(json["balance"], 0);

        let (_, json) = get(&router, "/status").await;
        assert_eq!(json["reserve"], 0);
        assert_eq!(json["total_supply"], 0);
        assert_eq!(node.state.metrics.redemptions_total.get(), 1);
    }

    #[tokio::test]
    async fn error_statuses() {
        let node = test_node(0, false);
        let router = create_router(node.state.clone());
        post_json(
            &router,
            "/deposit",
            serde_json::json!({ "account": "alice", "value": 100 }),
        )
        .await;

        let (status, _) = post_json(
            &router,
            "/deposit",
            serde_json::json!({ "account": "alice", "value": 0 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = post_json(
            &router,
            "/redeem",
            serde_json::json!({ "account": "alice", "amount": 101 }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("insufficient balance"));

        let (status, _) = post_rate(
            &router,
            Some(ADMIN_TOKEN),
            serde_json::json!({ "rate": DEFAULT_INITIAL_RATE as u64 + 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        node.registry
            .revoke(&AccountId::from("admin"), Capability::RateAdmin);
        let (status, _) = post_rate(&router, Some(ADMIN_TOKEN), serde_json::json!({ "rate": 1 })).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = post_json(
            &router,
            "/transfer",
            serde_json::json!({ "from": "alice", "to": " ", "amount": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Both reached the ledger; rejected tokens never do.
        assert_eq!(
            node.state
                .metrics
                .failed_operations_total
                .with_label_values(&["rate"])
                .get(),
            2
        );
    }

    #[tokio::test]
    async fn failed_payout_is_bad_gateway_and_rolled_back() {
        let node = test_node(0, false);
        let router = create_router(node.state.clone());
        post_json(
            &router,
            "/deposit",
            serde_json::json!({ "account": "alice", "value": 100 }),
        )
        .await;
        node.state.vault.lock().rail_mut().halt();

        let (status, _) = post_json(
            &router,
            "/redeem",
            serde_json::json!({ "account": "alice", "amount": 40 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (_, json) = get(&router, "/accounts/alice").await;
        assert_eq!(json["balance"], 100);
    }

    #[tokio::test]
    async fn transfer_inherits_rate_and_rate_can_be_lowered() {
        let node = test_node(0, false);
        let router = create_router(node.state.clone());
        post_json(
            &router,
            "/deposit",
            serde_json::json!({ "account": "alice", "value": 100 }),
        )
        .await;

        let (status, json) = post_rate(
            &router,
            Some(ADMIN_TOKEN),
            serde_json::json!({ "rate": 40_000_000_000u64, "expected_version": 0 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["rate_version"], 1);

        let (status, _) = post_rate(
            &router,
            Some(ADMIN_TOKEN),
            serde_json::json!({ "rate": 1, "expected_version": 0 }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, json) = post_json(
            &router,
            "/transfer",
            serde_json::json!({ "from": "alice", "to": "bob", "amount": "30" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["balance"], 70);

        let (_, json) = get(&router, "/accounts/bob").await;
        assert_eq!(json["personal_rate"], DEFAULT_INITIAL_RATE as u64);
    }

    #[tokio::test]
    async fn rate_changes_require_the_admin_token() {
        let node = test_node(0, false);
        let router = create_router(node.state.clone());

        // A caller named in the body grants nothing.
        let (status, _) = post_rate(
            &router,
            None,
            serde_json::json!({ "caller": "admin", "rate": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, json) = post_rate(&router, Some("guess"), serde_json::json!({ "rate": 1 })).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "invalid bearer token");
        assert_eq!(node.state.vault.lock().ledger().rate(), DEFAULT_INITIAL_RATE);

        let (status, json) = post_rate(&router, Some(ADMIN_TOKEN), serde_json::json!({ "rate": 1 })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["rate"], 1);
    }

    #[tokio::test]
    async fn rate_endpoint_disabled_without_token() {
        let mut node = test_node(0, false);
        node.state.admin_token = None;
        let router = create_router(node.state.clone());

        let (status, _) = post_rate(&router, Some(ADMIN_TOKEN), serde_json::json!({ "rate": 1 })).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(node.state.vault.lock().ledger().rate_version(), 0);
    }

    #[tokio::test]
    async fn whole_token_amounts_report_settled_balances() {
        let node = test_node(0, true);
        let mut rx = node.state.event_tx.subscribe();
        let router = create_router(node.state.clone());
        let value = 1_000 * PRECISION;

        let (status, _) = post_json(
            &router,
            "/deposit",
            serde_json::json!({ "account": "alice", "value": value.to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        node.state
            .vault
            .lock()
            .rail_mut()
            .fund_reserve(PRECISION)
            .unwrap();
        node.clock.advance(1);

        let resp = send(
            &router,
            "/transfer",
            None,
            serde_json::json!({ "from": "alice", "to": "bob", "amount": 1 }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: OperationResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.amount, 1);
        assert_eq!(body.balance, value + 1_000 * DEFAULT_INITIAL_RATE - 1);

        node.clock.advance(1);
        let (status, json) = post_json(
            &router,
            "/redeem",
            serde_json::json!({ "account": "alice", "amount": "all" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["balance"], 0);
        assert_eq!(node.state.metrics.redemptions_total.get(), 1);

        // Everything the mutations produced was handed off, none is retained.
        assert!(node.state.vault.lock().events().is_empty());
        let mut vault_events = 0;
        while let Ok(event) = rx.try_recv() {
            vault_events += usize::from(matches!(event, NodeEvent::Vault { .. }));
        }
        assert_eq!(vault_events, 2);

        let saved = node.state.db.as_ref().unwrap().load().unwrap().unwrap();
        assert_eq!(saved.total_supply, 1);
    }

    #[tokio::test]
    async fn delegated_transfer_consumes_allowance() {
        let node = test_node(0, false);
        let router = create_router(node.state.clone());
        post_json(
            &router,
            "/deposit",
            serde_json::json!({ "account": "owner", "value": 100 }),
        )
        .await;
        post_json(
            &router,
            "/approve",
            serde_json::json!({ "owner": "owner", "spender": "spender", "amount": 60 }),
        )
        .await;

        let (status, json) = post_json(
            &router,
            "/transfer-from",
            serde_json::json!({ "spender": "spender", "from": "owner", "to": "target", "amount": 50 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["amount"], 50);

        let (_, json) = get(&router, "/allowances/owner/spender").await;
        assert_eq!(json["allowance"], 10);

        let (status, _) = post_json(
            &router,
            "/transfer-from",
            serde_json::json!({ "spender": "spender", "from": "owner", "to": "target", "amount": 11 }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn mutations_are_persisted() {
        let node = test_node(0, true);
        let router = create_router(node.state.clone());
        post_json(
            &router,
            "/deposit",
            serde_json::json!({ "account": "alice", "value": 100 }),
        )
        .await;

        let db = node.state.db.clone().unwrap();
        let saved = db.load().unwrap().unwrap();
        assert_eq!(saved.total_supply, 100);
        assert_eq!(saved.accounts.len(), 1);
        assert_eq!(db.load_reserve().unwrap(), Some(100));
    }

    #[tokio::test]
    async fn events_are_broadcast() {
        let node = test_node(0, false);
        let mut rx = node.state.event_tx.subscribe();
        let router = create_router(node.state.clone());
        post_json(
            &router,
            "/deposit",
            serde_json::json!({ "account": "alice", "value": 5 }),
        )
        .await;

        let first = rx.try_recv().unwrap();
        assert!(matches!(first, NodeEvent::Ledger { .. }));
        let mut saw_vault = false;
        while let Ok(event) = rx.try_recv() {
            saw_vault |= matches!(event, NodeEvent::Vault { .. });
        }
        assert!(saw_vault);
        assert!(node.state.vault.lock().ledger().events().is_empty());
    }

    #[test]
    fn amount_field_forms() {
        let parse = |v: serde_json::Value| {
            serde_json::from_value::<RedeemRequest>(serde_json::json!({ "account": "a", "amount": v }))
                .map(|r| r.amount)
        };
        assert_eq!(parse(serde_json::json!(7)).unwrap(), AmountRequest::Exact(7));
        assert_eq!(parse(serde_json::json!("ALL")).unwrap(), AmountRequest::All);
        assert_eq!(
            parse(serde_json::json!("340282366920938463463374607431768211455")).unwrap(),
            AmountRequest::Exact(u128::MAX)
        );
        assert!(parse(serde_json::json!(-1)).is_err());
        assert!(parse(serde_json::json!("lots")).is_err());
    }
}

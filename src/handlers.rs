// HTTP request handlers for the friend-market API

use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    response::Json,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::app_state::{lock_state, AppState, SharedState};
use crate::auth::{AuthError, SignedRequest};
use crate::models::*;
use crate::wager::{
    Address, ErrorKind, EventTrackingRequest, MarketId, OneVsOneRequest, Payment, PublicMarketId, SmallGroupRequest,
    StakeAsset, WagerError, SECONDS_PER_DAY,
};

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult = Result<Json<Value>, ApiError>;

/// Maps a rejected engine call onto the HTTP status of its kind
pub fn wager_error(e: WagerError) -> ApiError {
    let kind = e.kind();
    let status = match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::State => StatusCode::CONFLICT,
    };
    (status, Json(json!({ "success": false, "error": e.to_string(), "kind": kind })))
}

pub fn auth_error(e: AuthError) -> ApiError {
    let (status, kind) = match e {
        AuthError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "validation"),
        _ => (StatusCode::UNAUTHORIZED, "authentication"),
    };
    warn!(error = %e, "rejected signed request");
    (status, Json(json!({ "success": false, "error": e.to_string(), "kind": kind })))
}

/// Verified caller plus decoded payload
fn signed<T: DeserializeOwned>(app: &mut AppState, uri: &Uri, request: SignedRequest) -> Result<(Address, T), ApiError> {
    app.authenticate(uri.path(), request).map_err(auth_error)
}

// ===== HEALTH =====

pub async fn health_check(State(state): State<SharedState>) -> Json<Value> {
    let app = lock_state(&state);
    Json(json!({
        "status": "ok",
        "service": "friend-market-ledger",
        "now": app.now(),
        "markets": app.engine.markets().count(),
        "oracle_timeout_secs": app.engine.oracle_timeout(),
        "open_creation": app.entitlements.is_open(),
        "last_feed_sync": app.last_feed_sync,
    }))
}

// ===== WALLETS =====

pub async fn fund_account(State(state): State<SharedState>, uri: Uri, Json(request): Json<SignedRequest>) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, payload): (Address, FundRequest) = signed(&mut app, &uri, request)?;
    let now = app.now();
    let amount = app.faucet_amount;
    let balance = app
        .engine
        .fund_account(&caller, &payload.asset, amount, now)
        .map_err(wager_error)?;
    app.commit();
    Ok(Json(json!({
        "success": true,
        "account": caller,
        "asset": payload.asset,
        "credited": amount,
        "balance": balance,
    })))
}

pub async fn get_balances(State(state): State<SharedState>, Path(address): Path<String>) -> Json<Value> {
    let app = lock_state(&state);
    let address = Address::new(address);
    let balances = app.engine.balances_of(&address);
    Json(json!({
        "address": address,
        "native": app.engine.balance_of(&address, &StakeAsset::Native),
        "balances": balances,
    }))
}

// ===== CREATION =====

pub async fn create_one_vs_one(
    State(state): State<SharedState>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut guard = lock_state(&state);
    let app = &mut *guard;
    let (caller, market): (Address, OneVsOneRequest) = signed(app, &uri, request)?;
    let now = app.now();
    let market_id = app
        .engine
        .create_one_vs_one(&app.entitlements, &app.public_markets, &caller, market, now)
        .map_err(wager_error)?;
    app.commit();
    created(app, market_id, now)
}

pub async fn create_small_group(
    State(state): State<SharedState>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut guard = lock_state(&state);
    let app = &mut *guard;
    let (caller, market): (Address, SmallGroupRequest) = signed(app, &uri, request)?;
    let now = app.now();
    let market_id = app
        .engine
        .create_small_group(&app.entitlements, &caller, market, now)
        .map_err(wager_error)?;
    app.commit();
    created(app, market_id, now)
}

pub async fn create_event_tracking(
    State(state): State<SharedState>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut guard = lock_state(&state);
    let app = &mut *guard;
    let (caller, market): (Address, EventTrackingRequest) = signed(app, &uri, request)?;
    let now = app.now();
    let market_id = app
        .engine
        .create_event_tracking(&app.entitlements, &caller, market, now)
        .map_err(wager_error)?;
    app.commit();
    created(app, market_id, now)
}

fn created(app: &AppState, market_id: MarketId, now: u64) -> ApiResult {
    let view = app.engine.get_friend_market_with_status(market_id, now).map_err(wager_error)?;
    Ok(Json(json!({ "success": true, "market_id": market_id, "market": view })))
}

// ===== MARKET VIEWS =====

pub async fn get_market(State(state): State<SharedState>, Path(id): Path<MarketId>) -> ApiResult {
    let app = lock_state(&state);
    let view = app.engine.get_friend_market_with_status(id, app.now()).map_err(wager_error)?;
    let resolution = app.engine.get_resolution(id).map_err(wager_error)?;
    Ok(Json(json!({ "market": view, "resolution": resolution })))
}

pub async fn get_user_markets(State(state): State<SharedState>, Path(address): Path<String>) -> Json<Value> {
    let app = lock_state(&state);
    let address = Address::new(address);
    let market_ids = app.engine.get_user_markets(&address);
    Json(json!({ "address": address, "market_ids": market_ids }))
}

pub async fn get_pegged_markets(
    State(state): State<SharedState>,
    Path(public_market_id): Path<PublicMarketId>,
) -> Json<Value> {
    let app = lock_state(&state);
    Json(json!({
        "public_market_id": public_market_id,
        "public_market": app.public_markets.get(public_market_id),
        "market_ids": app.engine.get_pegged_friend_markets(public_market_id),
    }))
}

// ===== ACCEPTANCE & MEMBERSHIP =====

/// A pegged wager whose public market already resolved settles as soon as
/// the accept activates it
pub async fn accept_market(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, payment): (Address, Payment) = signed(&mut app, &uri, request)?;
    let now = app.now();
    let mut status = app
        .engine
        .accept_market(id, &caller, &payment, now)
        .map_err(wager_error)?;

    let peg = app.engine.get_friend_market(id).map_err(wager_error)?.peg;
    if let Some(public_market_id) = peg {
        if !app.settle_pegged(public_market_id, &caller).is_empty() {
            status = app.engine.get_friend_market(id).map_err(wager_error)?.status;
        }
    }
    app.commit();
    Ok(Json(json!({ "success": true, "market_id": id, "status": status })))
}

pub async fn add_member(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, payload): (Address, AddMemberRequest) = signed(&mut app, &uri, request)?;
    let now = app.now();
    app.engine
        .add_member(id, &caller, &payload.member, now)
        .map_err(wager_error)?;
    app.commit();
    Ok(Json(json!({ "success": true, "market_id": id, "member": payload.member })))
}

pub async fn leave_market(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, _): (Address, EmptyRequest) = signed(&mut app, &uri, request)?;
    app.engine.remove_self(id, &caller).map_err(wager_error)?;
    app.commit();
    Ok(Json(json!({ "success": true, "market_id": id, "left": caller })))
}

pub async fn cancel_market(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, _): (Address, EmptyRequest) = signed(&mut app, &uri, request)?;
    let now = app.now();
    let refunds = app
        .engine
        .cancel_pending_market(id, &caller, now)
        .map_err(wager_error)?;
    app.commit();
    Ok(Json(json!({ "success": true, "market_id": id, "refunds": refunds })))
}

pub async fn void_market(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, _): (Address, EmptyRequest) = signed(&mut app, &uri, request)?;
    let now = app.now();
    let refunds = app
        .engine
        .void_expired_market(id, &caller, now)
        .map_err(wager_error)?;
    app.commit();
    Ok(Json(json!({ "success": true, "market_id": id, "refunds": refunds })))
}

// ===== RESOLUTION =====

/// Permissionless, so it takes no signature
pub async fn close_trading(State(state): State<SharedState>, Path(id): Path<MarketId>) -> ApiResult {
    let mut app = lock_state(&state);
    let now = app.now();
    app.engine.close_trading(id, now).map_err(wager_error)?;
    app.commit();
    let status = app.engine.get_friend_market(id).map_err(wager_error)?.status;
    Ok(Json(json!({ "success": true, "market_id": id, "status": status })))
}

pub async fn resolve_market(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, payload): (Address, ResolveRequest) = signed(&mut app, &uri, request)?;
    let now = app.now();
    let payout = app
        .engine
        .resolve_friend_market(id, &caller, &payload.claim, now)
        .map_err(wager_error)?;
    app.commit();
    Ok(Json(json!({ "success": true, "market_id": id, "payout": payout })))
}

pub async fn peg_market(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut guard = lock_state(&state);
    let app = &mut *guard;
    let (caller, payload): (Address, PegRequest) = signed(app, &uri, request)?;
    app.engine
        .peg_to_public_market(&app.public_markets, id, &caller, payload.public_market_id)
        .map_err(wager_error)?;
    let settled = app.settle_pegged(payload.public_market_id, &caller);
    app.commit();
    Ok(Json(json!({
        "success": true,
        "market_id": id,
        "public_market_id": payload.public_market_id,
        "settled": settled,
    })))
}

pub async fn settle_pegged_market(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut guard = lock_state(&state);
    let app = &mut *guard;
    let (caller, _): (Address, EmptyRequest) = signed(app, &uri, request)?;
    let now = app.now();
    let payout = app
        .engine
        .settle_pegged_market(&app.public_markets, id, &caller, now)
        .map_err(wager_error)?;
    app.commit();
    Ok(Json(json!({ "success": true, "market_id": id, "payout": payout })))
}

// ===== ORACLE TIMEOUT =====

pub async fn set_expected_time(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, payload): (Address, ExpectedTimeRequest) = signed(&mut app, &uri, request)?;
    let now = app.now();
    app.engine
        .set_expected_resolution_time(id, &caller, payload.expected_time, now)
        .map_err(wager_error)?;
    app.commit();
    let status = app.engine.get_oracle_timeout_status(id, now).map_err(wager_error)?;
    Ok(Json(json!({ "success": true, "oracle": status })))
}

pub async fn report_oracle_outcome(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, payload): (Address, OutcomeRequest) = signed(&mut app, &uri, request)?;
    let now = app.now();
    let payout = app
        .engine
        .report_oracle_outcome(id, &caller, payload.outcome, now)
        .map_err(wager_error)?;
    app.commit();
    Ok(Json(json!({ "success": true, "market_id": id, "payout": payout })))
}

pub async fn trigger_oracle_timeout(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, _): (Address, EmptyRequest) = signed(&mut app, &uri, request)?;
    let now = app.now();
    app.engine
        .trigger_oracle_timeout(id, &caller, now)
        .map_err(wager_error)?;
    app.commit();
    let status = app.engine.get_oracle_timeout_status(id, now).map_err(wager_error)?;
    Ok(Json(json!({ "success": true, "market_id": id, "oracle": status })))
}

pub async fn accept_mutual_refund(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, _): (Address, EmptyRequest) = signed(&mut app, &uri, request)?;
    let now = app.now();
    let progress = app
        .engine
        .accept_mutual_refund(id, &caller, now)
        .map_err(wager_error)?;
    app.commit();
    Ok(Json(json!({ "success": true, "market_id": id, "refund": progress })))
}

pub async fn force_oracle_resolution(
    State(state): State<SharedState>,
    Path(id): Path<MarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, payload): (Address, OutcomeRequest) = signed(&mut app, &uri, request)?;
    let now = app.now();
    let payout = app
        .engine
        .force_oracle_resolution(id, &caller, payload.outcome, now)
        .map_err(wager_error)?;
    app.commit();
    Ok(Json(json!({ "success": true, "market_id": id, "payout": payout })))
}

pub async fn get_oracle_status(State(state): State<SharedState>, Path(id): Path<MarketId>) -> ApiResult {
    let app = lock_state(&state);
    let now = app.now();
    let status = app.engine.get_oracle_timeout_status(id, now).map_err(wager_error)?;
    Ok(Json(json!({
        "oracle": status,
        "can_trigger_oracle_timeout": app.engine.can_trigger_oracle_timeout(id, now),
    })))
}

// ===== PUBLIC MARKETS =====

pub async fn list_public_markets(State(state): State<SharedState>) -> Json<Value> {
    let app = lock_state(&state);
    Json(json!({ "public_markets": app.public_markets.all() }))
}

pub async fn register_public_market(
    State(state): State<SharedState>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, payload): (Address, RegisterPublicMarketRequest) = signed(&mut app, &uri, request)?;
    app.engine.require_owner(&caller).map_err(wager_error)?;
    let record = app.public_markets.register(payload.id, payload.question).clone();
    app.log_activity("🌐", "PUBLIC_MARKET_REGISTERED", &format!("public #{}", record.id));
    app.commit();
    Ok(Json(json!({ "success": true, "public_market": record })))
}

/// Owner-recorded outcome; every pegged wager that can settle does so here
pub async fn record_public_outcome(
    State(state): State<SharedState>,
    Path(id): Path<PublicMarketId>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, payload): (Address, OutcomeRequest) = signed(&mut app, &uri, request)?;
    app.engine.require_owner(&caller).map_err(wager_error)?;
    let now = app.now();
    let changed = app
        .public_markets
        .record_outcome(id, payload.outcome, now)
        .map_err(wager_error)?;

    let mut settled = Vec::new();
    if changed {
        settled = app.settle_pegged(id, &caller);
        app.log_activity(
            "🌐",
            "PUBLIC_OUTCOME",
            &format!("public #{} resolved {} | {} pegged friend market(s) settled", id, payload.outcome, settled.len()),
        );
        app.commit();
    }
    Ok(Json(json!({
        "success": true,
        "public_market": app.public_markets.get(id),
        "changed": changed,
        "settled": settled,
    })))
}

// ===== ADMIN =====

pub async fn set_oracle_timeout(
    State(state): State<SharedState>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, payload): (Address, OracleTimeoutRequest) = signed(&mut app, &uri, request)?;
    let secs = payload.timeout_days.saturating_mul(SECONDS_PER_DAY);
    let previous = app
        .engine
        .set_oracle_timeout(&caller, secs)
        .map_err(wager_error)?;
    app.commit();
    Ok(Json(json!({ "success": true, "previous_secs": previous, "oracle_timeout_secs": secs })))
}

pub async fn withdraw_fees(
    State(state): State<SharedState>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, payload): (Address, WithdrawFeesRequest) = signed(&mut app, &uri, request)?;
    let now = app.now();
    let payout = app
        .engine
        .withdraw_fees(&caller, &payload.asset, now)
        .map_err(wager_error)?;
    app.commit();
    Ok(Json(json!({ "success": true, "payout": payout })))
}

pub async fn manage_entitlement(
    State(state): State<SharedState>,
    uri: Uri,
    Json(request): Json<SignedRequest>,
) -> ApiResult {
    let mut app = lock_state(&state);
    let (caller, payload): (Address, EntitlementRequest) = signed(&mut app, &uri, request)?;
    app.engine.require_owner(&caller).map_err(wager_error)?;

    let changed = match payload.action {
        EntitlementAction::Grant | EntitlementAction::Revoke => {
            let account = payload.account.as_ref().ok_or_else(|| {
                wager_error(WagerError::InvalidAddress("grant and revoke need an account".into()))
            })?;
            if payload.action == EntitlementAction::Grant {
                app.entitlements.grant(account).map_err(wager_error)?
            } else {
                app.entitlements.revoke(account)
            }
        }
        EntitlementAction::Open => {
            let changed = !app.entitlements.is_open();
            app.entitlements.set_open(true);
            changed
        }
        EntitlementAction::Restrict => {
            let changed = app.entitlements.is_open();
            app.entitlements.set_open(false);
            changed
        }
    };

    info!(action = ?payload.action, account = ?payload.account, changed, "entitlement update");
    app.log_activity("🔑", "ENTITLEMENT", &format!("{:?} {:?} | changed {}", payload.action, payload.account, changed));
    app.commit();
    let holders: Vec<Address> = app.entitlements.holders().cloned().collect();
    Ok(Json(json!({
        "success": true,
        "changed": changed,
        "open": app.entitlements.is_open(),
        "holders": holders,
    })))
}

// ===== LEDGER VIEWS =====

pub async fn get_fees(State(state): State<SharedState>) -> Json<Value> {
    let app = lock_state(&state);
    let fees: Vec<FeeBalance> = app
        .engine
        .ledger()
        .all_fees()
        .iter()
        .map(|(asset, amount)| FeeBalance { asset: asset.clone(), amount: *amount })
        .collect();
    Json(json!({ "owner": app.engine.owner(), "fees": fees }))
}

pub async fn get_stats(State(state): State<SharedState>) -> Json<Value> {
    let app = lock_state(&state);
    Json(json!({ "stats": app.engine.stats() }))
}

pub async fn get_activity(State(state): State<SharedState>) -> Json<Value> {
    let app = lock_state(&state);
    Json(json!({ "activity": app.activity }))
}

// Routes module - every HTTP endpoint of the friend-market service

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::app_state::SharedState;
use crate::handlers::*;

pub fn router(state: SharedState) -> Router {
    Router::new()
        // ===== HEALTH =====
        .route("/", get(health_check))
        .route("/health", get(health_check))
        // ===== WALLETS =====
        .route("/accounts/fund", post(fund_account))
        .route("/balances/:address", get(get_balances))
        // ===== CREATION =====
        .route("/markets/one-vs-one", post(create_one_vs_one))
        .route("/markets/small-group", post(create_small_group))
        .route("/markets/event-tracking", post(create_event_tracking))
        // ===== MARKET LIFECYCLE =====
        .route("/markets/:id", get(get_market))
        .route("/markets/:id/accept", post(accept_market))
        .route("/markets/:id/members", post(add_member))
        .route("/markets/:id/leave", post(leave_market))
        .route("/markets/:id/cancel", post(cancel_market))
        .route("/markets/:id/void", post(void_market))
        .route("/markets/:id/close", post(close_trading))
        .route("/markets/:id/resolve", post(resolve_market))
        .route("/markets/:id/peg", post(peg_market))
        .route("/markets/:id/settle-pegged", post(settle_pegged_market))
        // ===== ORACLE TIMEOUT =====
        .route("/markets/:id/oracle", get(get_oracle_status))
        .route("/markets/:id/oracle/expected-time", post(set_expected_time))
        .route("/markets/:id/oracle/report", post(report_oracle_outcome))
        .route("/markets/:id/oracle/timeout", post(trigger_oracle_timeout))
        .route("/markets/:id/oracle/refund", post(accept_mutual_refund))
        .route("/markets/:id/oracle/force", post(force_oracle_resolution))
        // ===== INDEXES =====
        .route("/users/:address/markets", get(get_user_markets))
        .route("/pegged/:public_market_id", get(get_pegged_markets))
        .route("/public-markets", get(list_public_markets).post(register_public_market))
        .route("/public-markets/:id/outcome", post(record_public_outcome))
        // ===== ADMIN =====
        .route("/admin/oracle-timeout", post(set_oracle_timeout))
        .route("/admin/withdraw-fees", post(withdraw_fees))
        .route("/admin/entitlements", post(manage_entitlement))
        // ===== LEDGER VIEWS =====
        .route("/fees", get(get_fees))
        .route("/stats", get(get_stats))
        .route("/activity", get(get_activity))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

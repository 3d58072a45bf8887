// Friend Market Ledger - Main Entry Point

use std::net::SocketAddr;
use tracing::{error, info, warn};

use friend_markets::app_state::{lock_state, AppState};
use friend_markets::config::Config;
use friend_markets::logging::init_tracing;
use friend_markets::public_feed::PublicMarketFeed;
use friend_markets::routes::router;
use friend_markets::wager::engine::DEFAULT_OWNER;
use friend_markets::wager::Address;

#[tokio::main]
async fn main() -> Result<(), String> {
    let config = Config::from_env()?;
    init_tracing(&config);

    info!("🎲 Friend Market Ledger starting");

    if config.owner == Address::new(DEFAULT_OWNER) {
        warn!("FRIEND_MARKETS_OWNER not set; no key controls the default owner, admin calls will be refused");
    }

    let state = AppState::from_config(&config)?.into_shared();

    let feed = PublicMarketFeed::new(config.public_market_feed_url.clone(), config.public_market_poll_secs);
    feed.log_status();
    feed.spawn(state.clone());

    let shutdown_state = state.clone();
    let app = router(state);

    let addr: SocketAddr = config
        .bind
        .parse()
        .map_err(|e| format!("Invalid FRIEND_MARKETS_BIND {}: {}", config.bind, e))?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;

    info!(
        %addr,
        owner = %config.owner,
        oracle_reporter = ?config.oracle_reporter,
        state_path = %config.state_path,
        "🚀 server running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to install Ctrl-C handler");
                return;
            }
            info!("🛑 shutdown signal received, saving state");
            let app_state = lock_state(&shutdown_state);
            match app_state.save_to_disk() {
                Ok(()) => info!("💾 state saved"),
                Err(e) => error!(error = %e, "failed to save state"),
            }
        })
        .await
        .map_err(|e| format!("Server error: {}", e))
}

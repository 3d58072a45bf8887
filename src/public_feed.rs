//! Public market feed
//!
//! HTTP client that pulls resolved outcomes of public conditional markets
//! into the local `PublicMarketBook` and settles the friend markets pegged
//! to them.
//! Runs in mock mode (no polling, outcomes recorded by the owner) when
//! `PUBLIC_MARKET_FEED_URL` is unset.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app_state::{lock_state, SharedState};
use crate::wager::PublicMarketId;

// ============================================================================
// CONSTANTS
// ============================================================================

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeedError {
    /// No feed URL configured
    NotConnected,
    RequestFailed(String),
    InvalidResponse(String),
    MarketNotFound(PublicMarketId),
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::NotConnected => write!(f, "Public market feed not connected"),
            FeedError::RequestFailed(msg) => write!(f, "Feed request failed: {}", msg),
            FeedError::InvalidResponse(msg) => write!(f, "Invalid feed response: {}", msg),
            FeedError::MarketNotFound(id) => write!(f, "Public market {} not found on feed", id),
        }
    }
}

impl std::error::Error for FeedError {}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// `GET {feed}/markets/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedMarket {
    pub id: PublicMarketId,
    #[serde(default)]
    pub question: Option<String>,
    pub resolved: bool,
    #[serde(default)]
    pub outcome: Option<bool>,
}

impl FeedMarket {
    /// Outcome only counts once the market reports itself resolved
    pub fn final_outcome(&self) -> Option<bool> {
        if self.resolved {
            self.outcome
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedSyncResult {
    pub success: bool,
    pub checked: usize,
    pub resolved: usize,
    pub error: Option<String>,
    pub timestamp: u64,
}

// ============================================================================
// FEED CLIENT
// ============================================================================

pub struct PublicMarketFeed {
    endpoint_url: Option<String>,
    client: Client,
    poll_interval: Duration,
}

impl PublicMarketFeed {
    pub fn new(endpoint_url: Option<String>, poll_interval_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            endpoint_url: endpoint_url.map(|u| u.trim_end_matches('/').to_string()),
            client,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
        }
    }

    pub fn is_mock_mode(&self) -> bool {
        self.endpoint_url.is_none()
    }

    pub fn log_status(&self) {
        match &self.endpoint_url {
            Some(url) => info!(url = %url, every_secs = self.poll_interval.as_secs(), "public market feed connected"),
            None => warn!("public market feed in mock mode (PUBLIC_MARKET_FEED_URL not set); owner records outcomes"),
        }
    }

    pub async fn fetch_market(&self, id: PublicMarketId) -> Result<FeedMarket, FeedError> {
        let Some(base) = &self.endpoint_url else {
            return Err(FeedError::NotConnected);
        };
        let url = format!("{}/markets/{}", base, id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::RequestFailed(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Err(FeedError::MarketNotFound(id));
        }
        if !response.status().is_success() {
            return Err(FeedError::RequestFailed(format!("feed returned status {}", response.status())));
        }

        let market: FeedMarket = response
            .json()
            .await
            .map_err(|e| FeedError::InvalidResponse(e.to_string()))?;
        if market.id != id {
            return Err(FeedError::InvalidResponse(format!("asked for market {}, got {}", id, market.id)));
        }
        Ok(market)
    }

    /// `Ok(None)` while the public market is still open
    pub async fn fetch_outcome(&self, id: PublicMarketId) -> Result<Option<bool>, FeedError> {
        Ok(self.fetch_market(id).await?.final_outcome())
    }

    /// One pass over every unresolved public market in the book
    pub async fn sync_once(&self, state: &SharedState) -> FeedSyncResult {
        let pending = lock_state(state).public_markets.unresolved_ids();

        if self.is_mock_mode() {
            return FeedSyncResult {
                success: true,
                checked: 0,
                resolved: 0,
                error: None,
                timestamp: lock_state(state).now(),
            };
        }

        let mut outcomes = Vec::new();
        let mut last_error = None;
        for id in &pending {
            match self.fetch_outcome(*id).await {
                Ok(Some(outcome)) => outcomes.push((*id, outcome)),
                Ok(None) => debug!(public_market_id = id, "public market still open"),
                Err(e) => {
                    warn!(public_market_id = id, error = %e, "feed lookup failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        let mut app = lock_state(state);
        let now = app.now();
        let mut resolved = 0;
        for (id, outcome) in outcomes {
            match app.public_markets.record_outcome(id, outcome, now) {
                Ok(true) => {
                    resolved += 1;
                    let settler = app.engine.owner().clone();
                    let settled = app.settle_pegged(id, &settler);
                    app.log_activity(
                        "🌐",
                        "PUBLIC_OUTCOME",
                        &format!("public #{} resolved {} | {} pegged friend market(s) settled", id, outcome, settled.len()),
                    );
                }
                Ok(false) => {}
                Err(e) => warn!(public_market_id = id, error = %e, "feed outcome conflicts with recorded outcome"),
            }
        }
        if resolved > 0 {
            app.commit();
        }

        let result = FeedSyncResult {
            success: last_error.is_none(),
            checked: pending.len(),
            resolved,
            error: last_error,
            timestamp: now,
        };
        app.last_feed_sync = Some(result.clone());
        result
    }

    /// Polls forever on the configured interval; a no-op task in mock mode
    pub fn spawn(self, state: SharedState) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.is_mock_mode() {
                return;
            }
            let mut ticker = tokio::time::interval(self.poll_interval);
            loop {
                ticker.tick().await;
                let result = self.sync_once(&state).await;
                debug!(checked = result.checked, resolved = result.resolved, "public market feed sync");
            }
        })
    }
}

//! Friend Market Ledger
//! Peer wagers between friends: escrowed stakes, arbitrated or oracle
//! resolution, and a mutual-refund path when the oracle never reports.

pub mod app_state;
pub mod auth;
pub mod clock;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod public_feed;
pub mod routes;
pub mod wager;

pub use app_state::{AppState, SharedState};
pub use auth::{address_from_pubkey, AuthError, SignedRequest};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use public_feed::{FeedError, PublicMarketFeed};
pub use routes::router;
pub use wager::{FriendMarketEngine, WagerError, WagerEvent};

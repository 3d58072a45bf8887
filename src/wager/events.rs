use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::oracle_timeout::RefundParty;
use super::types::{Address, MarketId, MarketKind, MarketStatus, PublicMarketId, ResolutionPath, StakeAsset};

/// Journal entry emitted by every committed engine operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WagerEvent {
    AccountFunded { account: Address, asset: StakeAsset, amount: Decimal },
    MarketCreated { market_id: MarketId, kind: MarketKind, creator: Address, status: MarketStatus, fee: Decimal },
    StakeDeposited { market_id: MarketId, member: Address, escrow_total: Decimal },
    ArbitratorAccepted { market_id: MarketId, arbitrator: Address },
    MarketActivated { market_id: MarketId, trading_ends_at: u64 },
    MemberAdded { market_id: MarketId, member: Address },
    MemberLeft { market_id: MarketId, member: Address },
    MarketCancelled { market_id: MarketId, by: Address, refunded: Decimal },
    TradingClosed { market_id: MarketId },
    MarketPegged { market_id: MarketId, public_market_id: PublicMarketId },
    MarketResolved { market_id: MarketId, winner: Address, payout: Decimal, path: ResolutionPath },
    ExpectedResolutionTimeSet { market_id: MarketId, expected: u64 },
    OracleTimedOut { market_id: MarketId, triggered_by: Address },
    MutualRefundAccepted { market_id: MarketId, party: RefundParty },
    MutualRefundCompleted { market_id: MarketId, refunded: Decimal },
    OracleTimeoutUpdated { previous_secs: u64, new_secs: u64 },
    FeesWithdrawn { asset: StakeAsset, amount: Decimal, to: Address },
}

impl WagerEvent {
    /// (emoji, action, details) for the activity log
    pub fn describe(&self) -> (&'static str, &'static str, String) {
        match self {
            WagerEvent::AccountFunded { account, asset, amount } => {
                ("💰", "ACCOUNT_FUNDED", format!("{} +{} {}", account, amount, asset))
            }
            WagerEvent::MarketCreated { market_id, kind, creator, status, fee } => (
                "📊",
                "MARKET_CREATED",
                format!("#{} {} by {} | {} {} | fee {}", market_id, kind, creator, status.emoji(), status, fee),
            ),
            WagerEvent::StakeDeposited { market_id, member, escrow_total } => (
                "🎯",
                "STAKE_DEPOSITED",
                format!("#{} {} | escrow {}", market_id, member, escrow_total),
            ),
            WagerEvent::ArbitratorAccepted { market_id, arbitrator } => {
                ("⚖️", "ARBITRATOR_ACCEPTED", format!("#{} {}", market_id, arbitrator))
            }
            WagerEvent::MarketActivated { market_id, trading_ends_at } => (
                "🟢",
                "MARKET_ACTIVE",
                format!("#{} trading ends at {}", market_id, trading_ends_at),
            ),
            WagerEvent::MemberAdded { market_id, member } => {
                ("➕", "MEMBER_ADDED", format!("#{} {}", market_id, member))
            }
            WagerEvent::MemberLeft { market_id, member } => {
                ("➖", "MEMBER_LEFT", format!("#{} {}", market_id, member))
            }
            WagerEvent::MarketCancelled { market_id, by, refunded } => (
                "🚫",
                "MARKET_CANCELLED",
                format!("#{} by {} | refunded {}", market_id, by, refunded),
            ),
            WagerEvent::TradingClosed { market_id } => ("⏳", "TRADING_CLOSED", format!("#{}", market_id)),
            WagerEvent::MarketPegged { market_id, public_market_id } => (
                "🔗",
                "MARKET_PEGGED",
                format!("#{} -> public market {}", market_id, public_market_id),
            ),
            WagerEvent::MarketResolved { market_id, winner, payout, path } => (
                "✅",
                "MARKET_RESOLVED",
                format!("#{} winner {} | payout {} | {}", market_id, winner, payout, path),
            ),
            WagerEvent::ExpectedResolutionTimeSet { market_id, expected } => (
                "🗓️",
                "EXPECTED_TIME_SET",
                format!("#{} expected resolution at {}", market_id, expected),
            ),
            WagerEvent::OracleTimedOut { market_id, triggered_by } => (
                "⌛",
                "ORACLE_TIMED_OUT",
                format!("#{} triggered by {}", market_id, triggered_by),
            ),
            WagerEvent::MutualRefundAccepted { market_id, party } => (
                "🤝",
                "REFUND_ACCEPTED",
                format!("#{} {:?} consented", market_id, party),
            ),
            WagerEvent::MutualRefundCompleted { market_id, refunded } => (
                "💸",
                "MARKET_REFUNDED",
                format!("#{} refunded {}", market_id, refunded),
            ),
            WagerEvent::OracleTimeoutUpdated { previous_secs, new_secs } => (
                "🛠️",
                "ORACLE_TIMEOUT_UPDATED",
                format!("{}s -> {}s", previous_secs, new_secs),
            ),
            WagerEvent::FeesWithdrawn { asset, amount, to } => {
                ("🏦", "FEES_WITHDRAWN", format!("{} {} -> {}", amount, asset, to))
            }
        }
    }

    pub fn market_id(&self) -> Option<MarketId> {
        match self {
            WagerEvent::MarketCreated { market_id, .. }
            | WagerEvent::StakeDeposited { market_id, .. }
            | WagerEvent::ArbitratorAccepted { market_id, .. }
            | WagerEvent::MarketActivated { market_id, .. }
            | WagerEvent::MemberAdded { market_id, .. }
            | WagerEvent::MemberLeft { market_id, .. }
            | WagerEvent::MarketCancelled { market_id, .. }
            | WagerEvent::TradingClosed { market_id }
            | WagerEvent::MarketPegged { market_id, .. }
            | WagerEvent::MarketResolved { market_id, .. }
            | WagerEvent::ExpectedResolutionTimeSet { market_id, .. }
            | WagerEvent::OracleTimedOut { market_id, .. }
            | WagerEvent::MutualRefundAccepted { market_id, .. }
            | WagerEvent::MutualRefundCompleted { market_id, .. } => Some(*market_id),
            WagerEvent::AccountFunded { .. }
            | WagerEvent::OracleTimeoutUpdated { .. }
            | WagerEvent::FeesWithdrawn { .. } => None,
        }
    }
}

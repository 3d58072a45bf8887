use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::membership::Roster;

/// Sequential market identifier, assigned at creation
pub type MarketId = u64;

/// Public conditional-market identifier a friend market can peg to
pub type PublicMarketId = u64;

pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

// ============================================================================
// ADDRESSES & ASSETS
// ============================================================================

/// Participant address. Stored lower-cased so comparisons are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Address(raw.as_ref().trim().to_lowercase())
    }

    pub fn zero() -> Self {
        Address("0x0000000000000000000000000000000000000000".to_string())
    }

    /// `0x`, `0x0`, `0x000…0` and the empty string all count as the zero address
    pub fn is_zero(&self) -> bool {
        let body = self.0.strip_prefix("0x").unwrap_or(&self.0);
        body.chars().all(|c| c == '0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Address::new(raw)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Address::new(raw)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

/// Settlement asset of a market. Serialised as `"native"` or the token address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StakeAsset {
    /// Native settlement currency
    Native,
    /// Designated fungible payment token
    Token(Address),
}

impl StakeAsset {
    /// A missing or zero token address denotes the native currency
    pub fn from_token_address(token: Option<&Address>) -> Self {
        match token {
            Some(addr) if !addr.is_zero() => StakeAsset::Token(addr.clone()),
            _ => StakeAsset::Native,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, StakeAsset::Native)
    }
}

impl Default for StakeAsset {
    fn default() -> Self {
        StakeAsset::Native
    }
}

impl fmt::Display for StakeAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakeAsset::Native => write!(f, "native"),
            StakeAsset::Token(addr) => write!(f, "{}", addr),
        }
    }
}

impl From<String> for StakeAsset {
    fn from(raw: String) -> Self {
        if raw.trim().eq_ignore_ascii_case("native") {
            StakeAsset::Native
        } else {
            StakeAsset::from_token_address(Some(&Address::new(raw)))
        }
    }
}

impl From<StakeAsset> for String {
    fn from(asset: StakeAsset) -> Self {
        asset.to_string()
    }
}

// ============================================================================
// MARKET KIND
// ============================================================================

/// Which creation entry point produced a market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    /// Two parties, gated by opponent acceptance
    OneVsOne,
    /// 3-10 members, active immediately
    SmallGroup,
    /// 3-10 players following a real-world event, active immediately
    EventTracking,
}

impl MarketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::OneVsOne => "one_vs_one",
            MarketKind::SmallGroup => "small_group",
            MarketKind::EventTracking => "event_tracking",
        }
    }

    pub fn is_group(&self) -> bool {
        !matches!(self, MarketKind::OneVsOne)
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// LIFECYCLE STATUS
// ============================================================================

/// Friend market lifecycle status
///
/// Flow: PendingAcceptance → Active → PendingResolution → Resolved
///              ↓                ↓
///          Cancelled      OracleTimedOut → Refunded | Resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    /// Waiting for the counterpart (and arbitrator, if required) to accept
    PendingAcceptance,
    /// Fully escrowed, wager running
    Active,
    /// Trading period over, awaiting an outcome
    PendingResolution,
    /// Reserved for disputed resolutions
    Challenged,
    /// Winner paid out
    Resolved,
    /// Voided before activation, stakes returned
    Cancelled,
    /// Both parties agreed to a refund after an oracle timeout
    Refunded,
    /// The oracle missed its window; awaiting refund consensus or forced resolution
    OracleTimedOut,
}

impl MarketStatus {
    /// `active` flag exposed on market views
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MarketStatus::Active | MarketStatus::PendingResolution | MarketStatus::Challenged
        )
    }

    /// Funds released, no further mutation permitted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MarketStatus::Resolved | MarketStatus::Cancelled | MarketStatus::Refunded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::PendingAcceptance => "pending_acceptance",
            MarketStatus::Active => "active",
            MarketStatus::PendingResolution => "pending_resolution",
            MarketStatus::Challenged => "challenged",
            MarketStatus::Resolved => "resolved",
            MarketStatus::Cancelled => "cancelled",
            MarketStatus::Refunded => "refunded",
            MarketStatus::OracleTimedOut => "oracle_timed_out",
        }
    }

    /// Get emoji for activity log display
    pub fn emoji(&self) -> &'static str {
        match self {
            MarketStatus::PendingAcceptance => "📨",
            MarketStatus::Active => "🟢",
            MarketStatus::PendingResolution => "⏳",
            MarketStatus::Challenged => "⚖️",
            MarketStatus::Resolved => "✅",
            MarketStatus::Cancelled => "🚫",
            MarketStatus::Refunded => "💸",
            MarketStatus::OracleTimedOut => "⌛",
        }
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RESOLUTION MODES
// ============================================================================

/// Who may assert the outcome of a market. Fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Any member, first valid call wins
    Either,
    /// Only the creator
    Initiator,
    /// Only the counterpart
    Receiver,
    /// Only the named arbitrator
    ThirdParty { arbitrator: Address },
    /// Settled from a public conditional market's outcome
    AutoPegged { public_market_id: PublicMarketId },
    /// Settled by an external oracle feed, with timeout fallback
    PolymarketOracle {
        condition_id: String,
        #[serde(default)]
        arbitrator: Option<Address>,
    },
}

/// Flat name of a resolution mode, used in views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    Either,
    Initiator,
    Receiver,
    ThirdParty,
    AutoPegged,
    PolymarketOracle,
}

impl ResolutionMode {
    pub fn resolution_type(&self) -> ResolutionType {
        match self {
            ResolutionMode::Either => ResolutionType::Either,
            ResolutionMode::Initiator => ResolutionType::Initiator,
            ResolutionMode::Receiver => ResolutionType::Receiver,
            ResolutionMode::ThirdParty { .. } => ResolutionType::ThirdParty,
            ResolutionMode::AutoPegged { .. } => ResolutionType::AutoPegged,
            ResolutionMode::PolymarketOracle { .. } => ResolutionType::PolymarketOracle,
        }
    }

    pub fn arbitrator(&self) -> Option<&Address> {
        match self {
            ResolutionMode::ThirdParty { arbitrator } => Some(arbitrator),
            ResolutionMode::PolymarketOracle { arbitrator, .. } => arbitrator.as_ref(),
            _ => None,
        }
    }

    pub fn is_oracle(&self) -> bool {
        matches!(self, ResolutionMode::PolymarketOracle { .. })
    }

    pub fn pegged_market_id(&self) -> Option<PublicMarketId> {
        match self {
            ResolutionMode::AutoPegged { public_market_id } => Some(*public_market_id),
            _ => None,
        }
    }
}

impl fmt::Display for ResolutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionType::Either => "either",
            ResolutionType::Initiator => "initiator",
            ResolutionType::Receiver => "receiver",
            ResolutionType::ThirdParty => "third_party",
            ResolutionType::AutoPegged => "auto_pegged",
            ResolutionType::PolymarketOracle => "polymarket_oracle",
        };
        write!(f, "{}", name)
    }
}

/// Outcome asserted by a resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ResolutionClaim {
    /// Two-party markets only: `true` means the creator wins
    Binary(bool),
    /// Names the winning member directly
    Winner(Address),
}

/// How the final outcome was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    Manual,
    Oracle,
    Pegged,
    Forced,
}

impl fmt::Display for ResolutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionPath::Manual => "manual",
            ResolutionPath::Oracle => "oracle",
            ResolutionPath::Pegged => "pegged",
            ResolutionPath::Forced => "forced",
        };
        write!(f, "{}", name)
    }
}

/// Written once per market, at terminal resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagerResolution {
    pub winner: Address,
    pub resolved_at: u64,
    pub resolved_by: Address,
    pub path: ResolutionPath,
    pub payout: Decimal,
}

// ============================================================================
// FRIEND MARKET
// ============================================================================

/// One peer wager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendMarket {
    pub id: MarketId,
    pub kind: MarketKind,
    pub creator: Address,
    /// Participants, limits and deposit progress
    pub roster: Roster,
    pub description: String,
    /// Seconds the wager runs once active
    pub trading_period: u64,
    pub mode: ResolutionMode,
    pub stake_asset: StakeAsset,
    pub stake_per_participant: Decimal,
    /// Only set for markets gated by acceptance
    pub acceptance_deadline: Option<u64>,
    /// Public market this wager settles from, if any
    pub peg: Option<PublicMarketId>,
    pub status: MarketStatus,
    pub created_at: u64,
    pub activated_at: Option<u64>,
    pub trading_ends_at: Option<u64>,
    pub resolution: Option<WagerResolution>,
}

impl FriendMarket {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn arbitrator(&self) -> Option<&Address> {
        self.mode.arbitrator()
    }

    pub fn is_auto_pegged(&self) -> bool {
        self.peg.is_some()
    }

    /// The two original wager parties (creator and counterpart)
    pub fn original_parties(&self) -> Option<(&Address, &Address)> {
        self.roster.counterparty().map(|opponent| (&self.creator, opponent))
    }

    pub fn trading_ended(&self, now: u64) -> bool {
        self.trading_ends_at.map(|end| now >= end).unwrap_or(false)
    }
}

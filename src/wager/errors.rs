use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::{Address, MarketId, MarketStatus, PublicMarketId, ResolutionType, StakeAsset};

// ============================================================================
// ERROR KIND
// ============================================================================

/// Coarse classification of a rejected call. None of these are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad parameters, resubmit with corrected input
    Validation,
    /// Caller lacks the privilege for this call
    Authorization,
    /// Market is not in the status (or time window) the call requires
    State,
    /// Unknown market, escrow or public market
    NotFound,
}

// ============================================================================
// WAGER ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum WagerError {
    // --- validation ---
    InvalidOpponent(String),
    InvalidAddress(String),
    InvalidMemberCount { min: usize, max: usize, requested: usize },
    InvalidMemberLimit { min: usize, max: usize, requested: usize },
    MemberLimitReached { limit: usize },
    DuplicateMember(Address),
    InsufficientFee { required: Decimal, provided: Decimal },
    DeadlineNotInFuture { deadline: u64, now: u64 },
    InvalidTradingPeriod { min: u64, max: u64, requested: u64 },
    InvalidStake(String),
    WrongAsset { expected: StakeAsset, provided: StakeAsset },
    WrongStakeAmount { expected: Decimal, provided: Decimal },
    InsufficientBalance { available: Decimal, required: Decimal },
    InvalidResolutionMode(String),
    InvalidClaim(String),
    InvalidOracleTimeout { min: u64, max: u64, requested: u64 },
    EmptyDescription,

    // --- authorization ---
    NotEntitled(Address),
    NotCreator(Address),
    NotMember(Address),
    NotOwner(Address),
    NotAuthorizedToResolve { mode: ResolutionType, caller: Address },
    ManualResolutionDisabled(ResolutionType),
    NotOriginalParty(Address),
    NotOracleReporter(Address),

    // --- state ---
    InvalidStatus { market_id: MarketId, status: MarketStatus, action: &'static str },
    AcceptanceDeadlinePassed { deadline: u64, now: u64 },
    AcceptanceWindowOpen { deadline: u64, now: u64 },
    AlreadyDeposited(Address),
    AlreadyAccepted(Address),
    CannotLeave(String),
    TradingNotEnded { ends_at: u64, now: u64 },
    TradingClosed { ended_at: u64, now: u64 },
    ExpectedTimeNotSet(MarketId),
    ExpectedTimeAlreadySet(MarketId),
    TimeoutNotReached { timeout_at: u64, now: u64 },
    RefundAlreadyAccepted(Address),
    AlreadyPegged { market_id: MarketId, public_market_id: PublicMarketId },
    NotPegged(MarketId),
    PublicMarketUnresolved(PublicMarketId),
    OutcomeAlreadyRecorded(PublicMarketId),
    EscrowAlreadyReleased(MarketId),
    NoFeesToWithdraw(StakeAsset),

    // --- not found ---
    MarketNotFound(MarketId),
    EscrowNotFound(MarketId),
    PublicMarketNotFound(PublicMarketId),
}

impl WagerError {
    pub fn kind(&self) -> ErrorKind {
        use WagerError::*;
        match self {
            InvalidOpponent(_)
            | InvalidAddress(_)
            | InvalidMemberCount { .. }
            | InvalidMemberLimit { .. }
            | MemberLimitReached { .. }
            | DuplicateMember(_)
            | InsufficientFee { .. }
            | DeadlineNotInFuture { .. }
            | InvalidTradingPeriod { .. }
            | InvalidStake(_)
            | WrongAsset { .. }
            | WrongStakeAmount { .. }
            | InsufficientBalance { .. }
            | InvalidResolutionMode(_)
            | InvalidClaim(_)
            | InvalidOracleTimeout { .. }
            | EmptyDescription => ErrorKind::Validation,

            NotEntitled(_)
            | NotCreator(_)
            | NotMember(_)
            | NotOwner(_)
            | NotAuthorizedToResolve { .. }
            | ManualResolutionDisabled(_)
            | NotOriginalParty(_)
            | NotOracleReporter(_) => ErrorKind::Authorization,

            InvalidStatus { .. }
            | AcceptanceDeadlinePassed { .. }
            | AcceptanceWindowOpen { .. }
            | AlreadyDeposited(_)
            | AlreadyAccepted(_)
            | CannotLeave(_)
            | TradingNotEnded { .. }
            | TradingClosed { .. }
            | ExpectedTimeNotSet(_)
            | ExpectedTimeAlreadySet(_)
            | TimeoutNotReached { .. }
            | RefundAlreadyAccepted(_)
            | AlreadyPegged { .. }
            | NotPegged(_)
            | PublicMarketUnresolved(_)
            | OutcomeAlreadyRecorded(_)
            | EscrowAlreadyReleased(_)
            | NoFeesToWithdraw(_) => ErrorKind::State,

            MarketNotFound(_) | EscrowNotFound(_) | PublicMarketNotFound(_) => ErrorKind::NotFound,
        }
    }
}

impl fmt::Display for WagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use WagerError::*;
        match self {
            InvalidOpponent(msg) => write!(f, "Invalid opponent: {}", msg),
            InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
            InvalidMemberCount { min, max, requested } => {
                write!(f, "Member count {} outside {}..={}", requested, min, max)
            }
            InvalidMemberLimit { min, max, requested } => {
                write!(f, "Member limit {} outside {}..={}", requested, min, max)
            }
            MemberLimitReached { limit } => write!(f, "Member limit of {} reached", limit),
            DuplicateMember(addr) => write!(f, "Duplicate member: {}", addr),
            InsufficientFee { required, provided } => {
                write!(f, "Insufficient fee: need {}, got {}", required, provided)
            }
            DeadlineNotInFuture { deadline, now } => {
                write!(f, "Deadline {} is not after current time {}", deadline, now)
            }
            InvalidTradingPeriod { min, max, requested } => {
                write!(f, "Trading period {}s outside {}s..={}s", requested, min, max)
            }
            InvalidStake(msg) => write!(f, "Invalid stake: {}", msg),
            WrongAsset { expected, provided } => {
                write!(f, "Wrong asset: market settles in {}, got {}", expected, provided)
            }
            WrongStakeAmount { expected, provided } => {
                write!(f, "Stake must be exactly {}, got {}", expected, provided)
            }
            InsufficientBalance { available, required } => {
                write!(f, "Insufficient balance: have {}, need {}", available, required)
            }
            InvalidResolutionMode(msg) => write!(f, "Invalid resolution mode: {}", msg),
            InvalidClaim(msg) => write!(f, "Invalid outcome claim: {}", msg),
            InvalidOracleTimeout { min, max, requested } => {
                write!(f, "Oracle timeout {}s outside {}s..={}s", requested, min, max)
            }
            EmptyDescription => write!(f, "Description must not be empty"),

            NotEntitled(addr) => write!(f, "{} does not hold the wager-creation entitlement", addr),
            NotCreator(addr) => write!(f, "{} is not the market creator", addr),
            NotMember(addr) => write!(f, "{} is not a member of this market", addr),
            NotOwner(addr) => write!(f, "{} is not the contract owner", addr),
            NotAuthorizedToResolve { mode, caller } => {
                write!(f, "{} may not resolve a {} market", caller, mode)
            }
            ManualResolutionDisabled(mode) => {
                write!(f, "Manual resolution is disabled for {} markets", mode)
            }
            NotOriginalParty(addr) => write!(f, "{} is not one of the original wager parties", addr),
            NotOracleReporter(addr) => write!(f, "{} is not the oracle reporter", addr),

            InvalidStatus { market_id, status, action } => {
                write!(f, "Cannot {} market {} while {}", action, market_id, status)
            }
            AcceptanceDeadlinePassed { deadline, now } => {
                write!(f, "Acceptance deadline {} passed (now {})", deadline, now)
            }
            AcceptanceWindowOpen { deadline, now } => {
                write!(f, "Acceptance window open until {} (now {})", deadline, now)
            }
            AlreadyDeposited(addr) => write!(f, "{} has already deposited", addr),
            AlreadyAccepted(addr) => write!(f, "{} has already accepted", addr),
            CannotLeave(msg) => write!(f, "Cannot leave market: {}", msg),
            TradingNotEnded { ends_at, now } => {
                write!(f, "Trading period ends at {} (now {})", ends_at, now)
            }
            TradingClosed { ended_at, now } => {
                write!(f, "Trading period ended at {} (now {})", ended_at, now)
            }
            ExpectedTimeNotSet(id) => write!(f, "Market {} has no expected resolution time", id),
            ExpectedTimeAlreadySet(id) => write!(f, "Market {} already has an expected resolution time", id),
            TimeoutNotReached { timeout_at, now } => {
                write!(f, "Oracle timeout reached at {} (now {})", timeout_at, now)
            }
            RefundAlreadyAccepted(addr) => write!(f, "{} already accepted the refund", addr),
            AlreadyPegged { market_id, public_market_id } => {
                write!(f, "Market {} already pegged to public market {}", market_id, public_market_id)
            }
            NotPegged(id) => write!(f, "Market {} is not pegged", id),
            PublicMarketUnresolved(id) => write!(f, "Public market {} has not resolved", id),
            OutcomeAlreadyRecorded(id) => write!(f, "Public market {} outcome already recorded", id),
            EscrowAlreadyReleased(id) => write!(f, "Escrow for market {} already released", id),
            NoFeesToWithdraw(asset) => write!(f, "No {} fees to withdraw", asset),

            MarketNotFound(id) => write!(f, "Market not found: {}", id),
            EscrowNotFound(id) => write!(f, "Escrow not found: {}", id),
            PublicMarketNotFound(id) => write!(f, "Public market not found: {}", id),
        }
    }
}

impl std::error::Error for WagerError {}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            WagerError::InsufficientFee { required: dec!(0.1), provided: dec!(0.05) }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(WagerError::NotOwner(Address::new("0xabc")).kind(), ErrorKind::Authorization);
        assert_eq!(
            WagerError::InvalidStatus {
                market_id: 1,
                status: MarketStatus::Cancelled,
                action: "resolve",
            }
            .kind(),
            ErrorKind::State
        );
        assert_eq!(WagerError::MarketNotFound(9).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_display_mentions_status() {
        let err = WagerError::InvalidStatus {
            market_id: 4,
            status: MarketStatus::Resolved,
            action: "accept",
        };
        assert_eq!(err.to_string(), "Cannot accept market 4 while resolved");
    }
}

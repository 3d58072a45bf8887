// Payloads carried inside signed requests for the friend-market HTTP API.
// The caller never appears here; it comes from the verified signature.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::wager::{Address, PublicMarketId, ResolutionClaim, StakeAsset};

/// Leave, cancel, void, timeout, refund and settle calls carry no fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyRequest {}

/// Faucet: credits the signer with the configured faucet amount
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundRequest {
    #[serde(default)]
    pub asset: StakeAsset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemberRequest {
    pub member: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub claim: ResolutionClaim,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PegRequest {
    pub public_market_id: PublicMarketId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedTimeRequest {
    pub expected_time: u64,
}

/// Used by the oracle report, the forced resolution and public outcomes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRequest {
    pub outcome: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleTimeoutRequest {
    pub timeout_days: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawFeesRequest {
    #[serde(default)]
    pub asset: StakeAsset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementAction {
    Grant,
    Revoke,
    /// Switch the registry to open creation
    Open,
    /// Switch the registry to allowlist-only creation
    Restrict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementRequest {
    pub action: EntitlementAction,
    #[serde(default)]
    pub account: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPublicMarketRequest {
    pub id: PublicMarketId,
    #[serde(default)]
    pub question: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeBalance {
    pub asset: StakeAsset,
    pub amount: Decimal,
}

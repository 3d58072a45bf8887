// ============================================================================
// Wager Module - Friend Market Lifecycle & Oracle-Timeout Engine
// ============================================================================
//
// Peer wagers between a bounded set of friends, escrowed on the ledger:
//   - types: addresses, assets, statuses, resolution modes, the market record
//   - errors: WagerError and its Validation/Authorization/State/NotFound kinds
//   - membership: rosters, member limits and the per-user market index
//   - stake_ledger: wallets, per-market escrow and the creation-fee pot
//   - lifecycle: allowed status transitions
//   - authority: who may resolve under each resolution mode
//   - oracle_timeout: expected-time clock and mutual-refund consent
//   - collaborators: creation entitlements and public-market outcomes
//   - events: journal entries emitted by committed operations
//   - engine: the operations themselves
//
// ============================================================================

pub mod authority;
pub mod collaborators;
pub mod engine;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod membership;
pub mod oracle_timeout;
pub mod stake_ledger;
pub mod types;

pub use collaborators::{CreationGate, EntitlementRegistry, PublicMarketBook, PublicMarketRecord, PublicMarketSource};
pub use engine::{
    EngineParams, EngineStats, EventTrackingRequest, FriendMarketEngine, FriendMarketView, OneVsOneRequest,
    RefundProgress, SmallGroupRequest,
};
pub use errors::{ErrorKind, WagerError};
pub use events::WagerEvent;
pub use membership::{Role, Roster};
pub use oracle_timeout::{OracleTimeoutStatus, RefundAcceptance, RefundParty};
pub use stake_ledger::{Payment, Payout, PayoutKind};
pub use types::*;

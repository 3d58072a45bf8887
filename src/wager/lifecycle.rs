// ============================================================================
// Market Lifecycle - status transitions
// ============================================================================
//
//   PendingAcceptance ──► Active ──► PendingResolution ──► Resolved
//          │                │  └──────────┬──────────────────▲
//          ▼                │             ▼                  │
//      Cancelled            └────► OracleTimedOut ──► Refunded
//
// Challenged is reserved: reachable from Active/PendingResolution and leads
// only to Resolved, but no operation drives a market into it yet.
//
// Every mutating operation checks the current status through `require_status`
// before doing anything else, so a duplicate call (second accept, second
// timeout trigger, second resolve) fails here instead of repeating an effect.
// ============================================================================

use super::errors::WagerError;
use super::types::{FriendMarket, MarketStatus};

impl MarketStatus {
    pub fn can_transition_to(&self, next: MarketStatus) -> bool {
        use MarketStatus::*;
        matches!(
            (self, next),
            (PendingAcceptance, Active)
                | (PendingAcceptance, Cancelled)
                | (Active, PendingResolution)
                | (Active, Resolved)
                | (Active, OracleTimedOut)
                | (Active, Challenged)
                | (PendingResolution, Resolved)
                | (PendingResolution, OracleTimedOut)
                | (PendingResolution, Challenged)
                | (Challenged, Resolved)
                | (OracleTimedOut, Refunded)
                | (OracleTimedOut, Resolved)
        )
    }
}

/// Rejects the call unless the market is in one of `allowed`
pub fn require_status(
    market: &FriendMarket,
    allowed: &[MarketStatus],
    action: &'static str,
) -> Result<(), WagerError> {
    if allowed.contains(&market.status) {
        Ok(())
    } else {
        Err(WagerError::InvalidStatus { market_id: market.id, status: market.status, action })
    }
}

/// Moves the market forward; statuses are never revisited
pub fn transition(
    market: &mut FriendMarket,
    next: MarketStatus,
    action: &'static str,
) -> Result<MarketStatus, WagerError> {
    if !market.status.can_transition_to(next) {
        return Err(WagerError::InvalidStatus { market_id: market.id, status: market.status, action });
    }
    let previous = market.status;
    market.status = next;
    Ok(previous)
}

/// Activates a market and starts its trading clock
pub fn activate(market: &mut FriendMarket, now: u64) -> Result<(), WagerError> {
    transition(market, MarketStatus::Active, "activate")?;
    market.activated_at = Some(now);
    market.trading_ends_at = Some(now.saturating_add(market.trading_period));
    Ok(())
}

/// Statuses from which a market may be resolved by a member, oracle or peg
pub const RESOLVABLE: &[MarketStatus] = &[MarketStatus::Active, MarketStatus::PendingResolution];

/// Statuses during which membership may still change
pub const MEMBERSHIP_OPEN: &[MarketStatus] = &[MarketStatus::PendingAcceptance, MarketStatus::Active];

#[cfg(test)]
mod tests {
    use super::*;
    use MarketStatus::*;

    const ALL: [MarketStatus; 8] = [
        PendingAcceptance,
        Active,
        PendingResolution,
        Challenged,
        Resolved,
        Cancelled,
        Refunded,
        OracleTimedOut,
    ];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [Resolved, Cancelled, Refunded] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {} should be rejected", from, to);
            }
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for status in ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_cancellation_only_before_activation() {
        assert!(PendingAcceptance.can_transition_to(Cancelled));
        assert!(!Active.can_transition_to(Cancelled));
        assert!(!PendingResolution.can_transition_to(Cancelled));
    }

    #[test]
    fn test_timeout_branches() {
        assert!(Active.can_transition_to(OracleTimedOut));
        assert!(OracleTimedOut.can_transition_to(Refunded));
        assert!(OracleTimedOut.can_transition_to(Resolved));
        assert!(!OracleTimedOut.can_transition_to(Active));
        assert!(!PendingAcceptance.can_transition_to(OracleTimedOut));
    }

    #[test]
    fn test_active_flag() {
        assert!(Active.is_active());
        assert!(PendingResolution.is_active());
        assert!(Challenged.is_active());
        assert!(!PendingAcceptance.is_active());
        assert!(!OracleTimedOut.is_active());
        assert!(!Resolved.is_active());
    }
}

//! Resolution Authority Resolver
//!
//! Decides, per resolution mode, who may assert an outcome and which address
//! an asserted outcome makes the winner. The match over `ResolutionMode` is
//! exhaustive so every mode has an explicit rule.

use super::errors::WagerError;
use super::types::{Address, FriendMarket, MarketKind, ResolutionClaim, ResolutionMode};

/// Checks that `caller` may resolve `market` by hand
pub fn authorize_manual_resolution(market: &FriendMarket, caller: &Address) -> Result<(), WagerError> {
    let allowed = match &market.mode {
        // Only members with a stake in escrow may declare the outcome
        ResolutionMode::Either => market.roster.is_member(caller) && market.roster.has_deposited(caller),
        ResolutionMode::Initiator => &market.creator == caller,
        ResolutionMode::Receiver => market.roster.counterparty() == Some(caller),
        ResolutionMode::ThirdParty { arbitrator } => arbitrator == caller,
        ResolutionMode::AutoPegged { .. } | ResolutionMode::PolymarketOracle { .. } => {
            return Err(WagerError::ManualResolutionDisabled(market.mode.resolution_type()));
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(WagerError::NotAuthorizedToResolve {
            mode: market.mode.resolution_type(),
            caller: caller.clone(),
        })
    }
}

/// Address allowed to force a timed-out oracle market: the arbitrator if one
/// was named, otherwise the contract owner
pub fn forced_resolution_authority<'a>(market: &'a FriendMarket, owner: &'a Address) -> &'a Address {
    market.arbitrator().unwrap_or(owner)
}

pub fn authorize_forced_resolution(
    market: &FriendMarket,
    owner: &Address,
    caller: &Address,
) -> Result<(), WagerError> {
    if forced_resolution_authority(market, owner) == caller {
        Ok(())
    } else {
        Err(WagerError::NotAuthorizedToResolve {
            mode: market.mode.resolution_type(),
            caller: caller.clone(),
        })
    }
}

/// Maps an asserted outcome to the winning member
///
/// `Binary(true)` is the creator and `Binary(false)` the counterpart, which
/// only makes sense for one-vs-one wagers. `Winner` must name a member whose
/// stake is escrowed.
pub fn winner_for_claim(market: &FriendMarket, claim: &ResolutionClaim) -> Result<Address, WagerError> {
    match claim {
        ResolutionClaim::Binary(creator_wins) => {
            if market.kind != MarketKind::OneVsOne {
                return Err(WagerError::InvalidClaim(
                    "group markets must name a winning member".into(),
                ));
            }
            let (creator, opponent) = market
                .original_parties()
                .ok_or_else(|| WagerError::InvalidClaim("market has no counterpart".into()))?;
            Ok(if *creator_wins { creator.clone() } else { opponent.clone() })
        }
        ResolutionClaim::Winner(addr) => {
            if !market.roster.has_deposited(addr) {
                return Err(WagerError::InvalidClaim(format!(
                    "{} has no escrowed stake in market {}",
                    addr, market.id
                )));
            }
            Ok(addr.clone())
        }
    }
}

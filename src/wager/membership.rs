// ============================================================================
// Membership Registry - Participants, Roles & Member Limits
// ============================================================================
//
// Each market owns a Roster: the ordered member list (creator first,
// counterpart second for one-vs-one), the member limit for its kind, which
// members have escrowed their stake, and the arbitrator if one is named.
// UserIndex maps addresses to the markets they take part in.
// ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::errors::WagerError;
use super::types::{Address, MarketId};

pub const ONE_VS_ONE_MEMBER_LIMIT: usize = 2;

/// Small-group member limits (limit must be > 2)
pub const SMALL_GROUP_MIN_LIMIT: usize = 3;
pub const SMALL_GROUP_MAX_LIMIT: usize = 10;

/// Event-tracking roster bounds
pub const EVENT_TRACKING_MIN_PLAYERS: usize = 3;
pub const EVENT_TRACKING_MAX_PLAYERS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Creator,
    Counterparty,
    Member,
    Arbitrator,
}

// ============================================================================
// ROSTER
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    members: Vec<Address>,
    member_limit: usize,
    /// Members whose stake is escrowed, in deposit order
    deposited: Vec<Address>,
    arbitrator: Option<Address>,
    /// Whether the arbitrator must accept before activation
    arbitrator_must_accept: bool,
    arbitrator_accepted: bool,
}

impl Roster {
    /// Creator plus one opponent
    pub fn one_vs_one(
        creator: &Address,
        opponent: &Address,
        arbitrator: Option<&Address>,
        arbitrator_must_accept: bool,
    ) -> Result<Self, WagerError> {
        if opponent.is_zero() {
            return Err(WagerError::InvalidOpponent("opponent is the zero address".into()));
        }
        if opponent == creator {
            return Err(WagerError::InvalidOpponent("cannot bet against yourself".into()));
        }
        let members = vec![creator.clone(), opponent.clone()];
        Self::build(members, ONE_VS_ONE_MEMBER_LIMIT, arbitrator, arbitrator_must_accept)
    }

    /// Creator plus proposed members; the creator is prepended when absent
    pub fn small_group(
        creator: &Address,
        proposed: &[Address],
        member_limit: usize,
        arbitrator: Option<&Address>,
    ) -> Result<Self, WagerError> {
        if member_limit < SMALL_GROUP_MIN_LIMIT || member_limit > SMALL_GROUP_MAX_LIMIT {
            return Err(WagerError::InvalidMemberLimit {
                min: SMALL_GROUP_MIN_LIMIT,
                max: SMALL_GROUP_MAX_LIMIT,
                requested: member_limit,
            });
        }
        let members = with_creator_first(creator, proposed)?;
        if members.len() > member_limit {
            return Err(WagerError::InvalidMemberCount {
                min: 1,
                max: member_limit,
                requested: members.len(),
            });
        }
        Self::build(members, member_limit, arbitrator, false)
    }

    /// Fixed roster of 3-10 players; the limit equals the roster size
    pub fn event_tracking(
        creator: &Address,
        players: &[Address],
        arbitrator: Option<&Address>,
    ) -> Result<Self, WagerError> {
        let members = with_creator_first(creator, players)?;
        if members.len() < EVENT_TRACKING_MIN_PLAYERS || members.len() > EVENT_TRACKING_MAX_PLAYERS {
            return Err(WagerError::InvalidMemberCount {
                min: EVENT_TRACKING_MIN_PLAYERS,
                max: EVENT_TRACKING_MAX_PLAYERS,
                requested: members.len(),
            });
        }
        let limit = members.len();
        Self::build(members, limit, arbitrator, false)
    }

    fn build(
        members: Vec<Address>,
        member_limit: usize,
        arbitrator: Option<&Address>,
        arbitrator_must_accept: bool,
    ) -> Result<Self, WagerError> {
        if let Some(arb) = arbitrator {
            if arb.is_zero() {
                return Err(WagerError::InvalidAddress("arbitrator is the zero address".into()));
            }
            if members.contains(arb) {
                return Err(WagerError::InvalidAddress(format!(
                    "arbitrator {} cannot also be a participant",
                    arb
                )));
            }
        }
        Ok(Self {
            members,
            member_limit,
            deposited: Vec::new(),
            arbitrator: arbitrator.cloned(),
            arbitrator_must_accept: arbitrator.is_some() && arbitrator_must_accept,
            arbitrator_accepted: false,
        })
    }

    pub fn members(&self) -> &[Address] {
        &self.members
    }

    pub fn member_limit(&self) -> usize {
        self.member_limit
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn creator(&self) -> &Address {
        &self.members[0]
    }

    /// Second member; the designated counterpart of a one-vs-one wager
    pub fn counterparty(&self) -> Option<&Address> {
        self.members.get(1)
    }

    pub fn arbitrator(&self) -> Option<&Address> {
        self.arbitrator.as_ref()
    }

    pub fn is_member(&self, addr: &Address) -> bool {
        self.members.contains(addr)
    }

    pub fn role_of(&self, addr: &Address) -> Option<Role> {
        if self.arbitrator.as_ref() == Some(addr) {
            return Some(Role::Arbitrator);
        }
        match self.members.iter().position(|m| m == addr) {
            Some(0) => Some(Role::Creator),
            Some(1) if self.member_limit == ONE_VS_ONE_MEMBER_LIMIT => Some(Role::Counterparty),
            Some(_) => Some(Role::Member),
            None => None,
        }
    }

    pub fn deposited(&self) -> &[Address] {
        &self.deposited
    }

    pub fn deposited_count(&self) -> usize {
        self.deposited.len()
    }

    pub fn has_deposited(&self, addr: &Address) -> bool {
        self.deposited.contains(addr)
    }

    pub fn all_deposited(&self) -> bool {
        self.members.iter().all(|m| self.deposited.contains(m))
    }

    pub fn arbitrator_must_accept(&self) -> bool {
        self.arbitrator_must_accept
    }

    pub fn arbitrator_accepted(&self) -> bool {
        self.arbitrator_accepted
    }

    /// Every deposit and the arbitrator's acceptance (when required) are in
    pub fn ready_to_activate(&self) -> bool {
        self.all_deposited() && (!self.arbitrator_must_accept || self.arbitrator_accepted)
    }

    pub fn check_deposit(&self, member: &Address) -> Result<(), WagerError> {
        if !self.is_member(member) {
            return Err(WagerError::NotMember(member.clone()));
        }
        if self.has_deposited(member) {
            return Err(WagerError::AlreadyDeposited(member.clone()));
        }
        Ok(())
    }

    pub fn record_deposit(&mut self, member: &Address) -> Result<(), WagerError> {
        self.check_deposit(member)?;
        self.deposited.push(member.clone());
        Ok(())
    }

    pub fn record_arbitrator_acceptance(&mut self, caller: &Address) -> Result<(), WagerError> {
        if self.arbitrator.as_ref() != Some(caller) {
            return Err(WagerError::NotMember(caller.clone()));
        }
        if self.arbitrator_accepted {
            return Err(WagerError::AlreadyAccepted(caller.clone()));
        }
        self.arbitrator_accepted = true;
        Ok(())
    }

    pub fn check_add(&self, member: &Address) -> Result<(), WagerError> {
        if member.is_zero() {
            return Err(WagerError::InvalidAddress("member is the zero address".into()));
        }
        if self.is_member(member) {
            return Err(WagerError::DuplicateMember(member.clone()));
        }
        if self.arbitrator.as_ref() == Some(member) {
            return Err(WagerError::InvalidAddress(format!(
                "arbitrator {} cannot also be a participant",
                member
            )));
        }
        if self.members.len() >= self.member_limit {
            return Err(WagerError::MemberLimitReached { limit: self.member_limit });
        }
        Ok(())
    }

    pub fn add_member(&mut self, member: &Address) -> Result<(), WagerError> {
        self.check_add(member)?;
        self.members.push(member.clone());
        Ok(())
    }

    /// Only a member who has not escrowed a stake, and never the creator
    pub fn check_remove_self(&self, member: &Address) -> Result<(), WagerError> {
        if !self.is_member(member) {
            return Err(WagerError::NotMember(member.clone()));
        }
        if self.creator() == member {
            return Err(WagerError::CannotLeave("the creator cannot leave their own market".into()));
        }
        if self.has_deposited(member) {
            return Err(WagerError::CannotLeave(format!("{} has an escrowed stake", member)));
        }
        Ok(())
    }

    pub fn remove_self(&mut self, member: &Address) -> Result<(), WagerError> {
        self.check_remove_self(member)?;
        self.members.retain(|m| m != member);
        Ok(())
    }
}

/// Prepends the creator when missing and rejects duplicates or zero addresses
fn with_creator_first(creator: &Address, proposed: &[Address]) -> Result<Vec<Address>, WagerError> {
    let mut members = vec![creator.clone()];
    let mut seen: HashSet<&Address> = HashSet::new();
    seen.insert(creator);

    let mut creator_listed = false;
    for addr in proposed {
        if addr.is_zero() {
            return Err(WagerError::InvalidAddress("member is the zero address".into()));
        }
        if addr == creator {
            if creator_listed {
                return Err(WagerError::DuplicateMember(addr.clone()));
            }
            creator_listed = true;
            continue;
        }
        if !seen.insert(addr) {
            return Err(WagerError::DuplicateMember(addr.clone()));
        }
        members.push(addr.clone());
    }
    Ok(members)
}

// ============================================================================
// USER INDEX
// ============================================================================

/// Markets each address participates in (as member or arbitrator)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserIndex {
    by_user: BTreeMap<Address, Vec<MarketId>>,
}

impl UserIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&mut self, user: &Address, market_id: MarketId) {
        let markets = self.by_user.entry(user.clone()).or_insert_with(Vec::new);
        if !markets.contains(&market_id) {
            markets.push(market_id);
        }
    }

    pub fn unlink(&mut self, user: &Address, market_id: MarketId) {
        if let Some(markets) = self.by_user.get_mut(user) {
            markets.retain(|id| *id != market_id);
        }
    }

    pub fn link_roster(&mut self, roster: &Roster, market_id: MarketId) {
        for member in roster.members() {
            self.link(member, market_id);
        }
        if let Some(arb) = roster.arbitrator() {
            self.link(arb, market_id);
        }
    }

    pub fn markets_of(&self, user: &Address) -> Vec<MarketId> {
        self.by_user.get(user).cloned().unwrap_or_default()
    }
}

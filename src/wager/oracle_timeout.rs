// ============================================================================
// Oracle Timeout & Refund Coordinator
// ============================================================================
//
// Oracle-pegged markets carry a creator-set expected resolution time. Once
// `expected + oracle_timeout` has passed without an oracle report, anyone may
// trigger the timeout. From there the two original parties can agree on a
// mutual refund, or the arbitrator (else the owner) forces an outcome.
//
// This module owns the clock arithmetic and the two-slot refund record; the
// engine owns the status transitions and fund movements.
// ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::errors::WagerError;
use super::types::{Address, MarketId, SECONDS_PER_DAY};

pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30 * SECONDS_PER_DAY;
pub const MIN_ORACLE_TIMEOUT_SECS: u64 = 7 * SECONDS_PER_DAY;
pub const MAX_ORACLE_TIMEOUT_SECS: u64 = 180 * SECONDS_PER_DAY;

/// Which of the two original parties is consenting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundParty {
    Creator,
    Opponent,
}

/// Two-slot consent record. Slots only ever go from false to true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundAcceptance {
    pub creator: bool,
    pub opponent: bool,
}

impl RefundAcceptance {
    pub fn both_accepted(&self) -> bool {
        self.creator && self.opponent
    }

    pub fn has_accepted(&self, party: RefundParty) -> bool {
        match party {
            RefundParty::Creator => self.creator,
            RefundParty::Opponent => self.opponent,
        }
    }
}

/// Read-only snapshot for `getOracleTimeoutStatus`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleTimeoutStatus {
    pub market_id: MarketId,
    pub expected_resolution_time: Option<u64>,
    pub oracle_timeout_secs: u64,
    /// `expected + timeout`, once an expected time is set
    pub timeout_at: Option<u64>,
    /// Seconds left before the timeout can be triggered (0 once reachable)
    pub seconds_remaining: Option<u64>,
    pub can_trigger: bool,
    pub timed_out: bool,
    pub creator_accepted_refund: bool,
    pub opponent_accepted_refund: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleTimeoutCoordinator {
    oracle_timeout_secs: u64,
    expected_times: BTreeMap<MarketId, u64>,
    refunds: BTreeMap<MarketId, RefundAcceptance>,
}

impl Default for OracleTimeoutCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_ORACLE_TIMEOUT_SECS)
    }
}

impl OracleTimeoutCoordinator {
    pub fn new(oracle_timeout_secs: u64) -> Self {
        Self {
            oracle_timeout_secs,
            expected_times: BTreeMap::new(),
            refunds: BTreeMap::new(),
        }
    }

    pub fn validate_timeout(secs: u64) -> Result<(), WagerError> {
        if !(MIN_ORACLE_TIMEOUT_SECS..=MAX_ORACLE_TIMEOUT_SECS).contains(&secs) {
            return Err(WagerError::InvalidOracleTimeout {
                min: MIN_ORACLE_TIMEOUT_SECS,
                max: MAX_ORACLE_TIMEOUT_SECS,
                requested: secs,
            });
        }
        Ok(())
    }

    pub fn oracle_timeout(&self) -> u64 {
        self.oracle_timeout_secs
    }

    /// Returns the previous timeout. Applies to every market at its next trigger check.
    pub fn set_oracle_timeout(&mut self, secs: u64) -> Result<u64, WagerError> {
        Self::validate_timeout(secs)?;
        let previous = self.oracle_timeout_secs;
        self.oracle_timeout_secs = secs;
        Ok(previous)
    }

    /// Set once per market so the creator cannot keep pushing the timeout back
    pub fn set_expected_time(&mut self, market_id: MarketId, expected: u64, now: u64) -> Result<(), WagerError> {
        if self.expected_times.contains_key(&market_id) {
            return Err(WagerError::ExpectedTimeAlreadySet(market_id));
        }
        if expected <= now {
            return Err(WagerError::DeadlineNotInFuture { deadline: expected, now });
        }
        self.expected_times.insert(market_id, expected);
        Ok(())
    }

    pub fn expected_time(&self, market_id: MarketId) -> Option<u64> {
        self.expected_times.get(&market_id).copied()
    }

    pub fn timeout_at(&self, market_id: MarketId) -> Option<u64> {
        self.expected_time(market_id)
            .map(|expected| expected.saturating_add(self.oracle_timeout_secs))
    }

    /// Pure clock check; the engine separately requires an eligible status
    pub fn timeout_reached(&self, market_id: MarketId, now: u64) -> bool {
        self.timeout_at(market_id).map(|at| now >= at).unwrap_or(false)
    }

    pub fn check_trigger(&self, market_id: MarketId, now: u64) -> Result<(), WagerError> {
        let timeout_at = self.timeout_at(market_id).ok_or(WagerError::ExpectedTimeNotSet(market_id))?;
        if now < timeout_at {
            return Err(WagerError::TimeoutNotReached { timeout_at, now });
        }
        Ok(())
    }

    /// Creates the empty refund record when the timeout fires
    pub fn open_refund_record(&mut self, market_id: MarketId) {
        self.refunds.entry(market_id).or_default();
    }

    pub fn refund_acceptance(&self, market_id: MarketId) -> RefundAcceptance {
        self.refunds.get(&market_id).copied().unwrap_or_default()
    }

    pub fn check_refund_acceptance(
        &self,
        market_id: MarketId,
        party: RefundParty,
        who: &Address,
    ) -> Result<(), WagerError> {
        if self.refund_acceptance(market_id).has_accepted(party) {
            return Err(WagerError::RefundAlreadyAccepted(who.clone()));
        }
        Ok(())
    }

    /// Marks `party`'s consent; a second consent from the same party is rejected
    pub fn accept_refund(
        &mut self,
        market_id: MarketId,
        party: RefundParty,
        who: &Address,
    ) -> Result<RefundAcceptance, WagerError> {
        self.check_refund_acceptance(market_id, party, who)?;
        let record = self.refunds.entry(market_id).or_default();
        match party {
            RefundParty::Creator => record.creator = true,
            RefundParty::Opponent => record.opponent = true,
        }
        Ok(*record)
    }

    pub fn status(&self, market_id: MarketId, now: u64, timed_out: bool, eligible: bool) -> OracleTimeoutStatus {
        let timeout_at = self.timeout_at(market_id);
        let refund = self.refund_acceptance(market_id);
        OracleTimeoutStatus {
            market_id,
            expected_resolution_time: self.expected_time(market_id),
            oracle_timeout_secs: self.oracle_timeout_secs,
            timeout_at,
            seconds_remaining: timeout_at.map(|at| at.saturating_sub(now)),
            can_trigger: eligible && self.timeout_reached(market_id, now),
            timed_out,
            creator_accepted_refund: refund.creator,
            opponent_accepted_refund: refund.opponent,
        }
    }
}

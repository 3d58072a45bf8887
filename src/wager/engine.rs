// ============================================================================
// Friend Market Engine
// ============================================================================
//
// Owns every friend market, the stake ledger and the oracle-timeout
// coordinator, and exposes the wager operations. Each operation:
//
//   1. looks up the market and checks its status first (stale calls fail here)
//   2. checks caller authority and every input
//   3. mutates the ledger, then the market, then records a WagerEvent
//
// Step 3 only starts once nothing left can fail, so a rejected call leaves
// the engine exactly as it was.
//
// Time is always an explicit `now` argument (unix seconds).
// ============================================================================

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::authority::{authorize_forced_resolution, authorize_manual_resolution, winner_for_claim};
use super::collaborators::{CreationGate, PublicMarketSource};
use super::errors::WagerError;
use super::events::WagerEvent;
use super::lifecycle::{self, require_status, MEMBERSHIP_OPEN, RESOLVABLE};
use super::membership::{Roster, UserIndex};
use super::oracle_timeout::{
    OracleTimeoutCoordinator, OracleTimeoutStatus, RefundAcceptance, RefundParty, DEFAULT_ORACLE_TIMEOUT_SECS,
};
use super::stake_ledger::{Payment, Payout, StakeLedger};
use super::types::{
    Address, FriendMarket, MarketId, MarketKind, MarketStatus, PublicMarketId, ResolutionClaim, ResolutionMode,
    ResolutionPath, ResolutionType, StakeAsset, WagerResolution, SECONDS_PER_DAY,
};

/// One-vs-one and small-group wagers
pub const MIN_SHORT_TRADING_PERIOD: u64 = SECONDS_PER_DAY;
/// Event-tracking and oracle-resolved wagers
pub const MIN_LONG_TRADING_PERIOD: u64 = 7 * SECONDS_PER_DAY;
pub const MAX_TRADING_PERIOD: u64 = 365 * SECONDS_PER_DAY;

pub const DEFAULT_OWNER: &str = "0x00000000000000000000000000000000000000ad";

// ============================================================================
// PARAMETERS & REQUESTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineParams {
    /// Contract owner: fee withdrawal, oracle timeout, forced-resolution fallback
    pub owner: Address,
    /// Only address allowed to push oracle outcomes
    pub oracle_reporter: Option<Address>,
    pub one_vs_one_fee: Decimal,
    pub group_fee: Decimal,
    /// Applied to a fresh engine; a persisted engine keeps its own timeout
    pub oracle_timeout_secs: u64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            owner: Address::new(DEFAULT_OWNER),
            oracle_reporter: None,
            one_vs_one_fee: dec!(0.1),
            group_fee: dec!(0.2),
            oracle_timeout_secs: DEFAULT_ORACLE_TIMEOUT_SECS,
        }
    }
}

impl EngineParams {
    pub fn minimum_fee(&self, kind: MarketKind) -> Decimal {
        match kind {
            MarketKind::OneVsOne => self.one_vs_one_fee,
            MarketKind::SmallGroup | MarketKind::EventTracking => self.group_fee,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneVsOneRequest {
    pub opponent: Address,
    pub description: String,
    pub trading_period: u64,
    pub acceptance_deadline: u64,
    pub mode: ResolutionMode,
    /// Omitted or zero means the native currency
    #[serde(default)]
    pub stake_token: Option<Address>,
    pub stake_per_participant: Decimal,
    /// Creation fee offered; must cover the one-vs-one minimum
    pub fee: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmallGroupRequest {
    pub members: Vec<Address>,
    pub member_limit: usize,
    pub description: String,
    pub trading_period: u64,
    pub mode: ResolutionMode,
    #[serde(default)]
    pub stake_token: Option<Address>,
    pub stake_per_participant: Decimal,
    pub fee: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTrackingRequest {
    pub players: Vec<Address>,
    pub description: String,
    pub trading_period: u64,
    pub mode: ResolutionMode,
    #[serde(default)]
    pub stake_token: Option<Address>,
    pub stake_per_participant: Decimal,
    pub fee: Decimal,
}

// ============================================================================
// VIEWS
// ============================================================================

/// `getFriendMarketWithStatus`
#[derive(Debug, Clone, Serialize)]
pub struct FriendMarketView {
    #[serde(flatten)]
    pub market: FriendMarket,
    pub active: bool,
    /// `pending_resolution` once an active market's trading period is over
    pub effective_status: MarketStatus,
    pub resolution_type: ResolutionType,
    pub arbitrator: Option<Address>,
    pub seconds_until_trading_ends: Option<u64>,
    pub member_count: usize,
    pub deposited_count: usize,
    pub escrow_balance: Decimal,
    pub expected_resolution_time: Option<u64>,
    pub can_trigger_oracle_timeout: bool,
}

/// Result of one `acceptMutualRefund` call
#[derive(Debug, Clone, Serialize)]
pub struct RefundProgress {
    pub acceptance: RefundAcceptance,
    pub status: MarketStatus,
    /// Empty until both parties have consented
    pub refunds: Vec<Payout>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_markets: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub by_kind: BTreeMap<&'static str, usize>,
    pub escrowed: BTreeMap<String, Decimal>,
    pub fees: BTreeMap<String, Decimal>,
    pub oracle_timeout_secs: u64,
}

/// Validated market, not yet funded
struct MarketDraft {
    kind: MarketKind,
    roster: Roster,
    description: String,
    trading_period: u64,
    mode: ResolutionMode,
    stake_asset: StakeAsset,
    stake: Decimal,
    fee: Decimal,
    acceptance_deadline: Option<u64>,
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendMarketEngine {
    params: EngineParams,
    next_market_id: MarketId,
    markets: BTreeMap<MarketId, FriendMarket>,
    users: UserIndex,
    /// public market id -> friend markets settling from it
    pegged: BTreeMap<PublicMarketId, Vec<MarketId>>,
    ledger: StakeLedger,
    oracle: OracleTimeoutCoordinator,
    #[serde(skip)]
    events: Vec<WagerEvent>,
}

impl Default for FriendMarketEngine {
    fn default() -> Self {
        Self::new(EngineParams::default())
    }
}

impl FriendMarketEngine {
    pub fn new(params: EngineParams) -> Self {
        let oracle = OracleTimeoutCoordinator::new(params.oracle_timeout_secs);
        Self {
            params,
            next_market_id: 1,
            markets: BTreeMap::new(),
            users: UserIndex::new(),
            pegged: BTreeMap::new(),
            ledger: StakeLedger::new(),
            oracle,
            events: Vec::new(),
        }
    }

    /// Re-applies owner, reporter and fee tiers after loading persisted state
    pub fn with_params(mut self, params: EngineParams) -> Self {
        self.params = params;
        self
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn owner(&self) -> &Address {
        &self.params.owner
    }

    pub fn require_owner(&self, caller: &Address) -> Result<(), WagerError> {
        if caller != &self.params.owner {
            return Err(WagerError::NotOwner(caller.clone()));
        }
        Ok(())
    }

    /// Takes every event recorded since the last drain
    pub fn drain_events(&mut self) -> Vec<WagerEvent> {
        std::mem::take(&mut self.events)
    }

    fn market(&self, market_id: MarketId) -> Result<&FriendMarket, WagerError> {
        self.markets.get(&market_id).ok_or(WagerError::MarketNotFound(market_id))
    }

    // ========================================================================
    // WALLETS
    // ========================================================================

    /// Credits an account from outside the wager system; returns the new balance
    pub fn fund_account(
        &mut self,
        account: &Address,
        asset: &StakeAsset,
        amount: Decimal,
        now: u64,
    ) -> Result<Decimal, WagerError> {
        let balance = self.ledger.fund(account, asset, amount, now)?;
        debug!(account = %account, asset = %asset, amount = %amount, "account funded");
        self.events.push(WagerEvent::AccountFunded {
            account: account.clone(),
            asset: asset.clone(),
            amount,
        });
        Ok(balance)
    }

    pub fn balance_of(&self, account: &Address, asset: &StakeAsset) -> Decimal {
        self.ledger.balance_of(account, asset)
    }

    pub fn balances_of(&self, account: &Address) -> BTreeMap<StakeAsset, Decimal> {
        self.ledger.balances_of(account)
    }

    pub fn ledger(&self) -> &StakeLedger {
        &self.ledger
    }

    // ========================================================================
    // CREATION
    // ========================================================================

    /// `createOneVsOneMarketPending`: escrows the creator's stake and waits for
    /// the opponent (and a ThirdParty arbitrator) to accept
    pub fn create_one_vs_one(
        &mut self,
        gate: &dyn CreationGate,
        source: &dyn PublicMarketSource,
        caller: &Address,
        req: OneVsOneRequest,
        now: u64,
    ) -> Result<MarketId, WagerError> {
        self.check_entitlement(gate, caller)?;
        let kind = MarketKind::OneVsOne;
        self.validate_terms(kind, &req.description, req.trading_period, &req.mode, req.stake_per_participant, req.fee)?;

        if req.acceptance_deadline <= now {
            return Err(WagerError::DeadlineNotInFuture { deadline: req.acceptance_deadline, now });
        }
        if let Some(public_market_id) = req.mode.pegged_market_id() {
            if !source.market_exists(public_market_id) {
                return Err(WagerError::PublicMarketNotFound(public_market_id));
            }
        }

        let arbitrator_must_accept = matches!(req.mode, ResolutionMode::ThirdParty { .. });
        let roster = Roster::one_vs_one(caller, &req.opponent, req.mode.arbitrator(), arbitrator_must_accept)?;

        self.open_market(
            caller,
            MarketDraft {
                kind,
                roster,
                description: req.description,
                trading_period: req.trading_period,
                stake_asset: StakeAsset::from_token_address(req.stake_token.as_ref()),
                mode: req.mode,
                stake: req.stake_per_participant,
                fee: req.fee,
                acceptance_deadline: Some(req.acceptance_deadline),
            },
            now,
        )
    }

    /// `createSmallGroupMarket`: active immediately with the creator's stake
    pub fn create_small_group(
        &mut self,
        gate: &dyn CreationGate,
        caller: &Address,
        req: SmallGroupRequest,
        now: u64,
    ) -> Result<MarketId, WagerError> {
        self.check_entitlement(gate, caller)?;
        let kind = MarketKind::SmallGroup;
        self.validate_terms(kind, &req.description, req.trading_period, &req.mode, req.stake_per_participant, req.fee)?;
        let roster = Roster::small_group(caller, &req.members, req.member_limit, req.mode.arbitrator())?;

        self.open_market(
            caller,
            MarketDraft {
                kind,
                roster,
                description: req.description,
                trading_period: req.trading_period,
                stake_asset: StakeAsset::from_token_address(req.stake_token.as_ref()),
                mode: req.mode,
                stake: req.stake_per_participant,
                fee: req.fee,
                acceptance_deadline: None,
            },
            now,
        )
    }

    /// `createEventTrackingMarket`: fixed roster of 3-10 players, active immediately
    pub fn create_event_tracking(
        &mut self,
        gate: &dyn CreationGate,
        caller: &Address,
        req: EventTrackingRequest,
        now: u64,
    ) -> Result<MarketId, WagerError> {
        self.check_entitlement(gate, caller)?;
        let kind = MarketKind::EventTracking;
        self.validate_terms(kind, &req.description, req.trading_period, &req.mode, req.stake_per_participant, req.fee)?;
        let roster = Roster::event_tracking(caller, &req.players, req.mode.arbitrator())?;

        self.open_market(
            caller,
            MarketDraft {
                kind,
                roster,
                description: req.description,
                trading_period: req.trading_period,
                stake_asset: StakeAsset::from_token_address(req.stake_token.as_ref()),
                mode: req.mode,
                stake: req.stake_per_participant,
                fee: req.fee,
                acceptance_deadline: None,
            },
            now,
        )
    }

    fn check_entitlement(&self, gate: &dyn CreationGate, caller: &Address) -> Result<(), WagerError> {
        if caller.is_zero() {
            return Err(WagerError::InvalidAddress("creator is the zero address".into()));
        }
        if !gate.has_creation_entitlement(caller) {
            warn!(caller = %caller, "creation rejected: no entitlement");
            return Err(WagerError::NotEntitled(caller.clone()));
        }
        Ok(())
    }

    fn validate_terms(
        &self,
        kind: MarketKind,
        description: &str,
        trading_period: u64,
        mode: &ResolutionMode,
        stake: Decimal,
        fee: Decimal,
    ) -> Result<(), WagerError> {
        if description.trim().is_empty() {
            return Err(WagerError::EmptyDescription);
        }
        if stake <= Decimal::ZERO {
            return Err(WagerError::InvalidStake("stake per participant must be positive".into()));
        }
        let required = self.params.minimum_fee(kind);
        if fee < required {
            return Err(WagerError::InsufficientFee { required, provided: fee });
        }
        validate_mode(kind, mode)?;

        let min = minimum_trading_period(kind, mode);
        if trading_period < min || trading_period > MAX_TRADING_PERIOD {
            return Err(WagerError::InvalidTradingPeriod { min, max: MAX_TRADING_PERIOD, requested: trading_period });
        }
        Ok(())
    }

    fn open_market(&mut self, caller: &Address, draft: MarketDraft, now: u64) -> Result<MarketId, WagerError> {
        let MarketDraft {
            kind,
            mut roster,
            description,
            trading_period,
            mode,
            stake_asset,
            stake,
            fee,
            acceptance_deadline,
        } = draft;

        let market_id = self.next_market_id;
        roster.record_deposit(caller)?;

        let mut market = FriendMarket {
            id: market_id,
            kind,
            creator: caller.clone(),
            roster,
            description,
            trading_period,
            peg: mode.pegged_market_id(),
            mode,
            stake_asset: stake_asset.clone(),
            stake_per_participant: stake,
            acceptance_deadline,
            status: MarketStatus::PendingAcceptance,
            created_at: now,
            activated_at: None,
            trading_ends_at: None,
            resolution: None,
        };
        if kind.is_group() {
            lifecycle::activate(&mut market, now)?;
        }

        // only fallible mutation; it validates the whole fee + stake first
        self.ledger.open_escrow(market_id, caller, &stake_asset, stake, fee, now)?;

        self.next_market_id += 1;
        self.users.link_roster(&market.roster, market_id);
        if let Some(public_market_id) = market.peg {
            self.pegged.entry(public_market_id).or_default().push(market_id);
        }

        info!(
            market_id,
            kind = %kind,
            creator = %caller,
            status = %market.status,
            stake = %stake,
            fee = %fee,
            "{} friend market created",
            market.status.emoji()
        );
        self.events.push(WagerEvent::MarketCreated {
            market_id,
            kind,
            creator: caller.clone(),
            status: market.status,
            fee,
        });
        self.events.push(WagerEvent::StakeDeposited {
            market_id,
            member: caller.clone(),
            escrow_total: self.ledger.escrow_total(market_id),
        });
        if let Some(trading_ends_at) = market.trading_ends_at {
            self.events.push(WagerEvent::MarketActivated { market_id, trading_ends_at });
        }

        self.markets.insert(market_id, market);
        Ok(market_id)
    }

    // ========================================================================
    // ACCEPTANCE & MEMBERSHIP
    // ========================================================================

    /// `acceptMarket`: a member escrows exactly one stake, or a ThirdParty
    /// arbitrator confirms participation. Returns the status after the call.
    pub fn accept_market(
        &mut self,
        market_id: MarketId,
        caller: &Address,
        payment: &Payment,
        now: u64,
    ) -> Result<MarketStatus, WagerError> {
        let market = self.markets.get_mut(&market_id).ok_or(WagerError::MarketNotFound(market_id))?;

        if market.roster.arbitrator() == Some(caller) {
            require_status(market, &[MarketStatus::PendingAcceptance], "accept")?;
            if !market.roster.arbitrator_must_accept() {
                return Err(WagerError::NotMember(caller.clone()));
            }
            check_acceptance_window(market, now)?;
            market.roster.record_arbitrator_acceptance(caller)?;

            info!(market_id, arbitrator = %caller, "arbitrator accepted");
            self.events.push(WagerEvent::ArbitratorAccepted { market_id, arbitrator: caller.clone() });
        } else {
            match market.status {
                MarketStatus::PendingAcceptance => check_acceptance_window(market, now)?,
                MarketStatus::Active if market.kind.is_group() => check_trading_open(market, now)?,
                status => return Err(WagerError::InvalidStatus { market_id, status, action: "accept" }),
            }
            market.roster.check_deposit(caller)?;
            self.ledger.check_deposit(market_id, caller, payment)?;

            let escrow_total = self.ledger.deposit(market_id, caller, payment, now)?;
            market.roster.record_deposit(caller)?;

            info!(market_id, member = %caller, escrow = %escrow_total, "stake deposited");
            self.events.push(WagerEvent::StakeDeposited { market_id, member: caller.clone(), escrow_total });
        }

        if market.status == MarketStatus::PendingAcceptance && market.roster.ready_to_activate() {
            lifecycle::activate(market, now)?;
            let trading_ends_at = market.trading_ends_at.unwrap_or(now);
            info!(market_id, trading_ends_at, "🟢 market active");
            self.events.push(WagerEvent::MarketActivated { market_id, trading_ends_at });
        }
        Ok(market.status)
    }

    /// `addMember`: creator only, within the member limit
    pub fn add_member(
        &mut self,
        market_id: MarketId,
        caller: &Address,
        member: &Address,
        now: u64,
    ) -> Result<(), WagerError> {
        let market = self.markets.get_mut(&market_id).ok_or(WagerError::MarketNotFound(market_id))?;
        require_status(market, MEMBERSHIP_OPEN, "add a member to")?;
        if &market.creator != caller {
            return Err(WagerError::NotCreator(caller.clone()));
        }
        if market.status == MarketStatus::Active {
            check_trading_open(market, now)?;
        }
        market.roster.add_member(member)?;
        self.users.link(member, market_id);

        info!(market_id, member = %member, "member added");
        self.events.push(WagerEvent::MemberAdded { market_id, member: member.clone() });
        Ok(())
    }

    /// `removeSelf`: a group member who has not deposited leaves
    pub fn remove_self(&mut self, market_id: MarketId, caller: &Address) -> Result<(), WagerError> {
        let market = self.markets.get_mut(&market_id).ok_or(WagerError::MarketNotFound(market_id))?;
        require_status(market, MEMBERSHIP_OPEN, "leave")?;
        if !market.kind.is_group() {
            return Err(WagerError::CannotLeave("a two-party wager has a fixed roster".into()));
        }
        market.roster.remove_self(caller)?;
        self.users.unlink(caller, market_id);

        info!(market_id, member = %caller, "member left");
        self.events.push(WagerEvent::MemberLeft { market_id, member: caller.clone() });
        Ok(())
    }

    /// Creator voids a market nobody has matched yet; stakes return, the fee stays
    pub fn cancel_pending_market(
        &mut self,
        market_id: MarketId,
        caller: &Address,
        now: u64,
    ) -> Result<Vec<Payout>, WagerError> {
        let market = self.market(market_id)?;
        require_status(market, &[MarketStatus::PendingAcceptance], "cancel")?;
        if &market.creator != caller {
            return Err(WagerError::NotCreator(caller.clone()));
        }
        self.cancel(market_id, caller, now)
    }

    /// Anyone voids a pending market whose acceptance deadline has passed
    pub fn void_expired_market(
        &mut self,
        market_id: MarketId,
        caller: &Address,
        now: u64,
    ) -> Result<Vec<Payout>, WagerError> {
        let market = self.market(market_id)?;
        require_status(market, &[MarketStatus::PendingAcceptance], "void")?;
        if let Some(deadline) = market.acceptance_deadline {
            if now <= deadline {
                return Err(WagerError::AcceptanceWindowOpen { deadline, now });
            }
        }
        self.cancel(market_id, caller, now)
    }

    fn cancel(&mut self, market_id: MarketId, by: &Address, now: u64) -> Result<Vec<Payout>, WagerError> {
        let market = self.markets.get_mut(&market_id).ok_or(WagerError::MarketNotFound(market_id))?;
        self.ledger.check_release(market_id)?;

        let refunds = self.ledger.refund_all(market_id, now)?;
        lifecycle::transition(market, MarketStatus::Cancelled, "cancel")?;

        let refunded: Decimal = refunds.iter().map(|p| p.amount).sum();
        info!(market_id, by = %by, refunded = %refunded, "🚫 market cancelled");
        self.events.push(WagerEvent::MarketCancelled { market_id, by: by.clone(), refunded });
        Ok(refunds)
    }

    // ========================================================================
    // RESOLUTION
    // ========================================================================

    /// Moves an active market whose trading period is over to PendingResolution
    pub fn close_trading(&mut self, market_id: MarketId, now: u64) -> Result<(), WagerError> {
        let market = self.markets.get_mut(&market_id).ok_or(WagerError::MarketNotFound(market_id))?;
        require_status(market, &[MarketStatus::Active], "close trading on")?;
        check_trading_ended(market, now)?;
        lifecycle::transition(market, MarketStatus::PendingResolution, "close trading on")?;

        debug!(market_id, "trading closed");
        self.events.push(WagerEvent::TradingClosed { market_id });
        Ok(())
    }

    /// `resolveFriendMarket`: manual resolution by whoever the mode authorizes
    pub fn resolve_friend_market(
        &mut self,
        market_id: MarketId,
        caller: &Address,
        claim: &ResolutionClaim,
        now: u64,
    ) -> Result<Payout, WagerError> {
        let market = self.market(market_id)?;
        require_status(market, RESOLVABLE, "resolve")?;
        authorize_manual_resolution(market, caller)?;
        check_trading_ended(market, now)?;
        let winner = winner_for_claim(market, claim)?;
        self.ledger.check_release(market_id)?;

        if market.status == MarketStatus::Active {
            self.close_trading(market_id, now)?;
        }
        self.settle(market_id, winner, caller, ResolutionPath::Manual, now)
    }

    /// `pegToPublicMarket`: the creator hands resolution of an unresolved
    /// one-vs-one wager over to a public market's outcome
    pub fn peg_to_public_market(
        &mut self,
        source: &dyn PublicMarketSource,
        market_id: MarketId,
        caller: &Address,
        public_market_id: PublicMarketId,
    ) -> Result<(), WagerError> {
        let market = self.markets.get_mut(&market_id).ok_or(WagerError::MarketNotFound(market_id))?;
        require_status(
            market,
            &[MarketStatus::PendingAcceptance, MarketStatus::Active, MarketStatus::PendingResolution],
            "peg",
        )?;
        if &market.creator != caller {
            return Err(WagerError::NotCreator(caller.clone()));
        }
        if let Some(existing) = market.peg {
            return Err(WagerError::AlreadyPegged { market_id, public_market_id: existing });
        }
        if market.kind != MarketKind::OneVsOne {
            return Err(WagerError::InvalidResolutionMode("only one-vs-one wagers can be pegged".into()));
        }
        match market.mode {
            ResolutionMode::Either | ResolutionMode::Initiator | ResolutionMode::Receiver => {}
            _ => {
                return Err(WagerError::InvalidResolutionMode(format!(
                    "{} markets cannot be re-pegged",
                    market.mode.resolution_type()
                )))
            }
        }
        if !source.market_exists(public_market_id) {
            return Err(WagerError::PublicMarketNotFound(public_market_id));
        }

        market.peg = Some(public_market_id);
        market.mode = ResolutionMode::AutoPegged { public_market_id };
        self.pegged.entry(public_market_id).or_default().push(market_id);

        info!(market_id, public_market_id, "🔗 market pegged");
        self.events.push(WagerEvent::MarketPegged { market_id, public_market_id });
        Ok(())
    }

    /// Settles a pegged market from the public market's recorded outcome.
    /// Anyone may call; the trading period does not need to be over.
    pub fn settle_pegged_market(
        &mut self,
        source: &dyn PublicMarketSource,
        market_id: MarketId,
        caller: &Address,
        now: u64,
    ) -> Result<Payout, WagerError> {
        let market = self.market(market_id)?;
        let public_market_id = market.peg.ok_or(WagerError::NotPegged(market_id))?;
        require_status(market, RESOLVABLE, "settle")?;
        let outcome = source
            .resolved_outcome(public_market_id)
            .ok_or(WagerError::PublicMarketUnresolved(public_market_id))?;
        let winner = winner_for_claim(market, &ResolutionClaim::Binary(outcome))?;
        self.settle(market_id, winner, caller, ResolutionPath::Pegged, now)
    }

    /// Settles every wager pegged to `public_market_id` once its outcome is
    /// recorded. Markets not yet accepted or already finished are skipped and
    /// picked up by a later pass.
    pub fn settle_pegged_markets(
        &mut self,
        source: &dyn PublicMarketSource,
        public_market_id: PublicMarketId,
        settler: &Address,
        now: u64,
    ) -> Vec<Payout> {
        if source.resolved_outcome(public_market_id).is_none() {
            return Vec::new();
        }
        let mut payouts = Vec::new();
        for market_id in self.get_pegged_friend_markets(public_market_id) {
            let ready = self
                .markets
                .get(&market_id)
                .is_some_and(|m| RESOLVABLE.contains(&m.status));
            if !ready {
                debug!(market_id, public_market_id, "pegged market not settleable yet");
                continue;
            }
            match self.settle_pegged_market(source, market_id, settler, now) {
                Ok(payout) => payouts.push(payout),
                Err(e) => warn!(market_id, public_market_id, error = %e, "pegged market left unsettled"),
            }
        }
        payouts
    }

    /// Oracle feed pushes the outcome of a PolymarketOracle wager
    pub fn report_oracle_outcome(
        &mut self,
        market_id: MarketId,
        caller: &Address,
        outcome: bool,
        now: u64,
    ) -> Result<Payout, WagerError> {
        if self.params.oracle_reporter.as_ref() != Some(caller) {
            return Err(WagerError::NotOracleReporter(caller.clone()));
        }
        let market = self.market(market_id)?;
        if !market.mode.is_oracle() {
            return Err(WagerError::InvalidResolutionMode(format!("market {} is not oracle-resolved", market_id)));
        }
        require_status(market, RESOLVABLE, "report an outcome for")?;
        check_trading_ended(market, now)?;
        let winner = winner_for_claim(market, &ResolutionClaim::Binary(outcome))?;
        self.ledger.check_release(market_id)?;

        if market.status == MarketStatus::Active {
            self.close_trading(market_id, now)?;
        }
        self.settle(market_id, winner, caller, ResolutionPath::Oracle, now)
    }

    /// Releases the escrow to `winner` and writes the resolution. Callers have
    /// already checked status, authority and the winner.
    fn settle(
        &mut self,
        market_id: MarketId,
        winner: Address,
        resolved_by: &Address,
        path: ResolutionPath,
        now: u64,
    ) -> Result<Payout, WagerError> {
        let market = self.markets.get_mut(&market_id).ok_or(WagerError::MarketNotFound(market_id))?;
        if !market.status.can_transition_to(MarketStatus::Resolved) || market.resolution.is_some() {
            return Err(WagerError::InvalidStatus { market_id, status: market.status, action: "resolve" });
        }
        self.ledger.check_release(market_id)?;

        let payout = self.ledger.release_to_winner(market_id, &winner, now)?;
        lifecycle::transition(market, MarketStatus::Resolved, "resolve")?;
        market.resolution = Some(WagerResolution {
            winner: winner.clone(),
            resolved_at: now,
            resolved_by: resolved_by.clone(),
            path,
            payout: payout.amount,
        });

        info!(
            market_id,
            winner = %winner,
            payout = %payout.amount,
            path = %path,
            receipt = %payout.receipt,
            "✅ market resolved"
        );
        self.events.push(WagerEvent::MarketResolved { market_id, winner, payout: payout.amount, path });
        Ok(payout)
    }

    // ========================================================================
    // ORACLE TIMEOUT
    // ========================================================================

    /// Creator-only, once per oracle market, and only in the future
    pub fn set_expected_resolution_time(
        &mut self,
        market_id: MarketId,
        caller: &Address,
        expected: u64,
        now: u64,
    ) -> Result<(), WagerError> {
        let market = self.market(market_id)?;
        require_status(
            market,
            &[MarketStatus::PendingAcceptance, MarketStatus::Active, MarketStatus::PendingResolution],
            "set the expected resolution time of",
        )?;
        if &market.creator != caller {
            return Err(WagerError::NotCreator(caller.clone()));
        }
        if !market.mode.is_oracle() {
            return Err(WagerError::InvalidResolutionMode(format!("market {} is not oracle-resolved", market_id)));
        }
        self.oracle.set_expected_time(market_id, expected, now)?;

        info!(market_id, expected, "expected resolution time set");
        self.events.push(WagerEvent::ExpectedResolutionTimeSet { market_id, expected });
        Ok(())
    }

    /// Anyone, once `now >= expected + oracle_timeout`; a second trigger fails
    /// because the market is no longer resolvable
    pub fn trigger_oracle_timeout(&mut self, market_id: MarketId, caller: &Address, now: u64) -> Result<(), WagerError> {
        let market = self.markets.get_mut(&market_id).ok_or(WagerError::MarketNotFound(market_id))?;
        if !market.mode.is_oracle() {
            return Err(WagerError::InvalidResolutionMode(format!("market {} is not oracle-resolved", market_id)));
        }
        require_status(market, RESOLVABLE, "trigger the oracle timeout of")?;
        self.oracle.check_trigger(market_id, now)?;

        lifecycle::transition(market, MarketStatus::OracleTimedOut, "trigger the oracle timeout of")?;
        self.oracle.open_refund_record(market_id);

        warn!(market_id, triggered_by = %caller, "⌛ oracle timed out");
        self.events.push(WagerEvent::OracleTimedOut { market_id, triggered_by: caller.clone() });
        Ok(())
    }

    /// Records one original party's consent; the second consent refunds both
    /// stakes and marks the market Refunded
    pub fn accept_mutual_refund(
        &mut self,
        market_id: MarketId,
        caller: &Address,
        now: u64,
    ) -> Result<RefundProgress, WagerError> {
        let market = self.markets.get_mut(&market_id).ok_or(WagerError::MarketNotFound(market_id))?;
        require_status(market, &[MarketStatus::OracleTimedOut], "accept a refund for")?;
        let party = match market.original_parties() {
            Some((creator, _)) if creator == caller => RefundParty::Creator,
            Some((_, opponent)) if opponent == caller => RefundParty::Opponent,
            _ => return Err(WagerError::NotOriginalParty(caller.clone())),
        };
        self.oracle.check_refund_acceptance(market_id, party, caller)?;

        let mut projected = self.oracle.refund_acceptance(market_id);
        match party {
            RefundParty::Creator => projected.creator = true,
            RefundParty::Opponent => projected.opponent = true,
        }
        if projected.both_accepted() {
            self.ledger.check_release(market_id)?;
        }

        let acceptance = self.oracle.accept_refund(market_id, party, caller)?;
        info!(market_id, party = ?party, "🤝 refund accepted");
        self.events.push(WagerEvent::MutualRefundAccepted { market_id, party });

        let mut refunds = Vec::new();
        if acceptance.both_accepted() {
            refunds = self.ledger.refund_all(market_id, now)?;
            lifecycle::transition(market, MarketStatus::Refunded, "refund")?;

            let refunded: Decimal = refunds.iter().map(|p| p.amount).sum();
            info!(market_id, refunded = %refunded, "💸 market refunded");
            self.events.push(WagerEvent::MutualRefundCompleted { market_id, refunded });
        }

        Ok(RefundProgress { acceptance, status: market.status, refunds })
    }

    /// Non-cooperative exit: the arbitrator, else the owner, picks the outcome
    pub fn force_oracle_resolution(
        &mut self,
        market_id: MarketId,
        caller: &Address,
        outcome: bool,
        now: u64,
    ) -> Result<Payout, WagerError> {
        let market = self.market(market_id)?;
        require_status(market, &[MarketStatus::OracleTimedOut], "force resolution of")?;
        authorize_forced_resolution(market, &self.params.owner, caller)?;
        let winner = winner_for_claim(market, &ResolutionClaim::Binary(outcome))?;
        self.settle(market_id, winner, caller, ResolutionPath::Forced, now)
    }

    // ========================================================================
    // OWNER
    // ========================================================================

    /// `setOracleTimeout` (7-180 days); returns the previous value
    pub fn set_oracle_timeout(&mut self, caller: &Address, secs: u64) -> Result<u64, WagerError> {
        self.require_owner(caller)?;
        let previous = self.oracle.set_oracle_timeout(secs)?;
        info!(previous_secs = previous, new_secs = secs, "oracle timeout updated");
        self.events.push(WagerEvent::OracleTimeoutUpdated { previous_secs: previous, new_secs: secs });
        Ok(previous)
    }

    /// `withdrawFees`: drains the fee pot for one asset to the owner
    pub fn withdraw_fees(&mut self, caller: &Address, asset: &StakeAsset, now: u64) -> Result<Payout, WagerError> {
        self.require_owner(caller)?;
        let payout = self.ledger.withdraw_fees(asset, &self.params.owner, now)?;
        info!(asset = %asset, amount = %payout.amount, "🏦 fees withdrawn");
        self.events.push(WagerEvent::FeesWithdrawn {
            asset: asset.clone(),
            amount: payout.amount,
            to: payout.recipient.clone(),
        });
        Ok(payout)
    }

    // ========================================================================
    // VIEWS
    // ========================================================================

    pub fn get_friend_market(&self, market_id: MarketId) -> Result<&FriendMarket, WagerError> {
        self.market(market_id)
    }

    pub fn get_friend_market_with_status(&self, market_id: MarketId, now: u64) -> Result<FriendMarketView, WagerError> {
        let market = self.market(market_id)?;
        let effective_status = if market.status == MarketStatus::Active && market.trading_ended(now) {
            MarketStatus::PendingResolution
        } else {
            market.status
        };
        Ok(FriendMarketView {
            active: market.is_active(),
            effective_status,
            resolution_type: market.mode.resolution_type(),
            arbitrator: market.arbitrator().cloned(),
            seconds_until_trading_ends: market.trading_ends_at.map(|end| end.saturating_sub(now)),
            member_count: market.roster.member_count(),
            deposited_count: market.roster.deposited_count(),
            escrow_balance: self.ledger.escrow_total(market_id),
            expected_resolution_time: self.oracle.expected_time(market_id),
            can_trigger_oracle_timeout: self.can_trigger_oracle_timeout(market_id, now),
            market: market.clone(),
        })
    }

    pub fn get_user_markets(&self, user: &Address) -> Vec<MarketId> {
        self.users.markets_of(user)
    }

    pub fn get_pegged_friend_markets(&self, public_market_id: PublicMarketId) -> Vec<MarketId> {
        self.pegged.get(&public_market_id).cloned().unwrap_or_default()
    }

    pub fn get_oracle_timeout_status(&self, market_id: MarketId, now: u64) -> Result<OracleTimeoutStatus, WagerError> {
        let market = self.market(market_id)?;
        let eligible = market.mode.is_oracle() && RESOLVABLE.contains(&market.status);
        let timed_out = market.status == MarketStatus::OracleTimedOut;
        Ok(self.oracle.status(market_id, now, timed_out, eligible))
    }

    pub fn can_trigger_oracle_timeout(&self, market_id: MarketId, now: u64) -> bool {
        match self.markets.get(&market_id) {
            Some(market) => {
                market.mode.is_oracle()
                    && RESOLVABLE.contains(&market.status)
                    && self.oracle.timeout_reached(market_id, now)
            }
            None => false,
        }
    }

    pub fn oracle_timeout(&self) -> u64 {
        self.oracle.oracle_timeout()
    }

    pub fn get_resolution(&self, market_id: MarketId) -> Result<Option<&WagerResolution>, WagerError> {
        Ok(self.market(market_id)?.resolution.as_ref())
    }

    pub fn escrow_balance(&self, market_id: MarketId) -> Result<Decimal, WagerError> {
        self.market(market_id)?;
        Ok(self.ledger.escrow_total(market_id))
    }

    pub fn accumulated_fees(&self, asset: &StakeAsset) -> Decimal {
        self.ledger.accumulated_fees(asset)
    }

    pub fn markets(&self) -> impl Iterator<Item = &FriendMarket> {
        self.markets.values()
    }

    pub fn stats(&self) -> EngineStats {
        let mut by_status = BTreeMap::new();
        let mut by_kind = BTreeMap::new();
        let mut escrowed: BTreeMap<String, Decimal> = BTreeMap::new();
        for market in self.markets.values() {
            *by_status.entry(market.status.as_str()).or_insert(0) += 1;
            *by_kind.entry(market.kind.as_str()).or_insert(0) += 1;
            *escrowed.entry(market.stake_asset.to_string()).or_insert(Decimal::ZERO) +=
                self.ledger.escrow_total(market.id);
        }
        EngineStats {
            total_markets: self.markets.len(),
            by_status,
            by_kind,
            escrowed,
            fees: self.ledger.all_fees().iter().map(|(asset, amount)| (asset.to_string(), *amount)).collect(),
            oracle_timeout_secs: self.oracle.oracle_timeout(),
        }
    }
}

// ============================================================================
// RULES
// ============================================================================

/// Which modes each market kind supports
fn validate_mode(kind: MarketKind, mode: &ResolutionMode) -> Result<(), WagerError> {
    match (kind, mode) {
        (_, ResolutionMode::Either) | (_, ResolutionMode::Initiator) | (_, ResolutionMode::ThirdParty { .. }) => Ok(()),
        (MarketKind::OneVsOne, ResolutionMode::Receiver) | (MarketKind::OneVsOne, ResolutionMode::AutoPegged { .. }) => {
            Ok(())
        }
        (MarketKind::OneVsOne, ResolutionMode::PolymarketOracle { condition_id, .. }) => {
            if condition_id.trim().is_empty() {
                return Err(WagerError::InvalidResolutionMode("oracle condition id is empty".into()));
            }
            Ok(())
        }
        (_, ResolutionMode::Receiver) => Err(WagerError::InvalidResolutionMode(
            "receiver mode needs a single designated counterpart".into(),
        )),
        (_, ResolutionMode::AutoPegged { .. }) | (_, ResolutionMode::PolymarketOracle { .. }) => Err(
            WagerError::InvalidResolutionMode("only one-vs-one wagers can be pegged or oracle-resolved".into()),
        ),
    }
}

fn minimum_trading_period(kind: MarketKind, mode: &ResolutionMode) -> u64 {
    if kind == MarketKind::EventTracking || mode.is_oracle() {
        MIN_LONG_TRADING_PERIOD
    } else {
        MIN_SHORT_TRADING_PERIOD
    }
}

fn check_acceptance_window(market: &FriendMarket, now: u64) -> Result<(), WagerError> {
    match market.acceptance_deadline {
        Some(deadline) if now > deadline => Err(WagerError::AcceptanceDeadlinePassed { deadline, now }),
        _ => Ok(()),
    }
}

fn check_trading_open(market: &FriendMarket, now: u64) -> Result<(), WagerError> {
    match market.trading_ends_at {
        Some(ended_at) if now >= ended_at => Err(WagerError::TradingClosed { ended_at, now }),
        _ => Ok(()),
    }
}

fn check_trading_ended(market: &FriendMarket, now: u64) -> Result<(), WagerError> {
    match market.trading_ends_at {
        Some(ends_at) if now < ends_at => Err(WagerError::TradingNotEnded { ends_at, now }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wager::collaborators::{EntitlementRegistry, PublicMarketBook};

    const T0: u64 = 1_700_000_000;
    const HOUR: u64 = 3_600;
    const DAY: u64 = SECONDS_PER_DAY;

    fn addr(s: &str) -> Address {
        Address::new(s)
    }

    fn alice() -> Address {
        addr("0xa11ce")
    }
    fn bob() -> Address {
        addr("0xb0b")
    }
    fn carol() -> Address {
        addr("0xca401")
    }
    fn arbiter() -> Address {
        addr("0xa4b17e4")
    }
    fn owner() -> Address {
        addr("0x0123")
    }
    fn reporter() -> Address {
        addr("0x4e9047e4")
    }

    struct Harness {
        engine: FriendMarketEngine,
        gate: EntitlementRegistry,
        book: PublicMarketBook,
    }

    fn harness() -> Harness {
        let mut engine = FriendMarketEngine::new(EngineParams {
            owner: owner(),
            oracle_reporter: Some(reporter()),
            ..EngineParams::default()
        });
        for who in [alice(), bob(), carol(), addr("0xd"), addr("0xe")] {
            engine.fund_account(&who, &StakeAsset::Native, dec!(10), T0 - 1).unwrap();
        }
        engine.drain_events();
        Harness { engine, gate: EntitlementRegistry::open(), book: PublicMarketBook::new() }
    }

    fn one_vs_one(mode: ResolutionMode, trading_period: u64) -> OneVsOneRequest {
        OneVsOneRequest {
            opponent: bob(),
            description: "Alice finishes the marathon under 4h".into(),
            trading_period,
            acceptance_deadline: T0 + 2 * HOUR,
            mode,
            stake_token: None,
            stake_per_participant: dec!(0.5),
            fee: dec!(0.1),
        }
    }

    fn oracle_mode(arbitrator: Option<Address>) -> ResolutionMode {
        ResolutionMode::PolymarketOracle { condition_id: "0xc0nd".into(), arbitrator }
    }

    fn native(amount: Decimal) -> Payment {
        Payment::native(amount)
    }

    impl Harness {
        fn create(&mut self, req: OneVsOneRequest) -> Result<MarketId, WagerError> {
            self.engine.create_one_vs_one(&self.gate, &self.book, &alice(), req, T0)
        }

        fn status(&self, id: MarketId) -> MarketStatus {
            self.engine.get_friend_market(id).unwrap().status
        }

        fn balance(&self, who: &Address) -> Decimal {
            self.engine.balance_of(who, &StakeAsset::Native)
        }

        /// Active oracle market with its expected time set to `T0 + 10 days`
        fn active_oracle_market(&mut self, arbitrator: Option<Address>) -> (MarketId, u64) {
            let id = self.create(one_vs_one(oracle_mode(arbitrator), 7 * DAY)).unwrap();
            self.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + HOUR).unwrap();
            let expected = T0 + 10 * DAY;
            self.engine.set_expected_resolution_time(id, &alice(), expected, T0 + HOUR).unwrap();
            (id, expected)
        }
    }

    // ------------------------------------------------------------------------
    // Scenarios
    // ------------------------------------------------------------------------

    #[test]
    fn test_scenario_a_accept_then_resolve_either() {
        let mut h = harness();
        let id = h.create(one_vs_one(ResolutionMode::Either, DAY)).unwrap();
        assert_eq!(h.status(id), MarketStatus::PendingAcceptance);
        assert_eq!(h.balance(&alice()), dec!(9.4));
        assert_eq!(h.engine.accumulated_fees(&StakeAsset::Native), dec!(0.1));

        let status = h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + HOUR).unwrap();
        assert_eq!(status, MarketStatus::Active);
        assert_eq!(h.engine.escrow_balance(id).unwrap(), dec!(1.0));

        let payout = h
            .engine
            .resolve_friend_market(id, &bob(), &ResolutionClaim::Binary(false), T0 + HOUR + DAY)
            .unwrap();
        assert_eq!(payout.amount, dec!(1.0));
        assert_eq!(h.status(id), MarketStatus::Resolved);
        assert_eq!(h.balance(&bob()), dec!(10.5));

        let resolution = h.engine.get_resolution(id).unwrap().unwrap();
        assert_eq!(resolution.winner, bob());
        assert_eq!(resolution.resolved_by, bob());
        assert_eq!(resolution.path, ResolutionPath::Manual);
        assert_eq!(h.engine.escrow_balance(id).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_scenario_b_timeout_then_mutual_refund() {
        let mut h = harness();
        let (id, expected) = h.active_oracle_market(None);
        let timeout_at = expected + DEFAULT_ORACLE_TIMEOUT_SECS;

        assert!(!h.engine.can_trigger_oracle_timeout(id, timeout_at - 1));
        let early = h.engine.trigger_oracle_timeout(id, &carol(), timeout_at - 1).unwrap_err();
        assert!(matches!(early, WagerError::TimeoutNotReached { .. }));

        h.engine.trigger_oracle_timeout(id, &carol(), timeout_at + 1).unwrap();
        assert_eq!(h.status(id), MarketStatus::OracleTimedOut);

        let first = h.engine.accept_mutual_refund(id, &alice(), timeout_at + 2).unwrap();
        assert!(first.refunds.is_empty());
        assert_eq!(first.status, MarketStatus::OracleTimedOut);

        let second = h.engine.accept_mutual_refund(id, &bob(), timeout_at + 3).unwrap();
        assert_eq!(second.status, MarketStatus::Refunded);
        assert_eq!(second.refunds.len(), 2);
        assert!(second.refunds.iter().all(|p| p.amount == dec!(0.5)));

        assert_eq!(h.balance(&alice()), dec!(9.9));
        assert_eq!(h.balance(&bob()), dec!(10));
        assert!(h.engine.get_resolution(id).unwrap().is_none());
    }

    #[test]
    fn test_scenario_c_single_consent_then_forced() {
        let mut h = harness();
        let (id, expected) = h.active_oracle_market(Some(arbiter()));
        let after = expected + DEFAULT_ORACLE_TIMEOUT_SECS + 1;

        h.engine.trigger_oracle_timeout(id, &bob(), after).unwrap();
        h.engine.accept_mutual_refund(id, &alice(), after).unwrap();

        let denied = h.engine.force_oracle_resolution(id, &owner(), true, after).unwrap_err();
        assert!(matches!(denied, WagerError::NotAuthorizedToResolve { .. }));

        let payout = h.engine.force_oracle_resolution(id, &arbiter(), true, after).unwrap();
        assert_eq!(payout.recipient, alice());
        assert_eq!(h.status(id), MarketStatus::Resolved);
        assert_eq!(h.balance(&alice()), dec!(10.4));
        assert_eq!(h.balance(&bob()), dec!(9.5));

        let resolution = h.engine.get_resolution(id).unwrap().unwrap();
        assert_eq!(resolution.path, ResolutionPath::Forced);
        assert_eq!(resolution.resolved_by, arbiter());

        let late = h.engine.accept_mutual_refund(id, &bob(), after + 1).unwrap_err();
        assert!(matches!(late, WagerError::InvalidStatus { .. }));
    }

    #[test]
    fn test_scenario_d_eleven_members_rejected() {
        let mut h = harness();
        let members: Vec<Address> = (1..=11).map(|i| addr(&format!("0xf{:02}", i))).collect();
        let err = h
            .engine
            .create_small_group(
                &h.gate,
                &alice(),
                SmallGroupRequest {
                    members,
                    member_limit: 10,
                    description: "Office fantasy league".into(),
                    trading_period: 30 * DAY,
                    mode: ResolutionMode::Either,
                    stake_token: None,
                    stake_per_participant: dec!(1),
                    fee: dec!(0.2),
                },
                T0,
            )
            .unwrap_err();
        assert!(matches!(err, WagerError::InvalidMemberCount { max: 10, .. }));
        assert!(h.engine.markets().next().is_none());
        assert_eq!(h.balance(&alice()), dec!(10));
        assert_eq!(h.engine.accumulated_fees(&StakeAsset::Native), Decimal::ZERO);
    }

    #[test]
    fn test_scenario_e_late_accept_then_void() {
        let mut h = harness();
        let id = h.create(one_vs_one(ResolutionMode::Either, DAY)).unwrap();
        let deadline = T0 + 2 * HOUR;

        let err = h.engine.accept_market(id, &bob(), &native(dec!(0.5)), deadline + 1).unwrap_err();
        assert_eq!(err, WagerError::AcceptanceDeadlinePassed { deadline, now: deadline + 1 });
        assert_eq!(h.status(id), MarketStatus::PendingAcceptance);
        assert_eq!(h.balance(&bob()), dec!(10));

        let early = h.engine.void_expired_market(id, &carol(), deadline).unwrap_err();
        assert!(matches!(early, WagerError::AcceptanceWindowOpen { .. }));

        let refunds = h.engine.void_expired_market(id, &carol(), deadline + 1).unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(h.status(id), MarketStatus::Cancelled);
        assert_eq!(h.balance(&alice()), dec!(9.9));
    }

    // ------------------------------------------------------------------------
    // Creation validation
    // ------------------------------------------------------------------------

    #[test]
    fn test_creation_validation() {
        let mut h = harness();

        let mut req = one_vs_one(ResolutionMode::Either, DAY);
        req.opponent = alice();
        assert!(matches!(h.create(req).unwrap_err(), WagerError::InvalidOpponent(_)));

        let mut req = one_vs_one(ResolutionMode::Either, DAY);
        req.opponent = Address::zero();
        assert!(matches!(h.create(req).unwrap_err(), WagerError::InvalidOpponent(_)));

        let mut req = one_vs_one(ResolutionMode::Either, DAY);
        req.fee = dec!(0.09);
        assert_eq!(
            h.create(req).unwrap_err(),
            WagerError::InsufficientFee { required: dec!(0.1), provided: dec!(0.09) }
        );

        let mut req = one_vs_one(ResolutionMode::Either, DAY);
        req.acceptance_deadline = T0;
        assert!(matches!(h.create(req).unwrap_err(), WagerError::DeadlineNotInFuture { .. }));

        let req = one_vs_one(oracle_mode(None), DAY);
        assert!(matches!(h.create(req).unwrap_err(), WagerError::InvalidTradingPeriod { .. }));

        let req = one_vs_one(ResolutionMode::AutoPegged { public_market_id: 77 }, DAY);
        assert_eq!(h.create(req).unwrap_err(), WagerError::PublicMarketNotFound(77));

        let mut req = one_vs_one(ResolutionMode::Either, DAY);
        req.stake_per_participant = dec!(20);
        assert!(matches!(h.create(req).unwrap_err(), WagerError::InsufficientBalance { .. }));

        assert!(h.engine.markets().next().is_none());
        assert_eq!(h.balance(&alice()), dec!(10));
    }

    #[test]
    fn test_creation_requires_entitlement() {
        let mut h = harness();
        h.gate = EntitlementRegistry::allowlist();
        let err = h.create(one_vs_one(ResolutionMode::Either, DAY)).unwrap_err();
        assert_eq!(err, WagerError::NotEntitled(alice()));

        h.gate.grant(&alice()).unwrap();
        assert!(h.create(one_vs_one(ResolutionMode::Either, DAY)).is_ok());
    }

    #[test]
    fn test_group_modes_restricted() {
        let mut h = harness();
        let req = SmallGroupRequest {
            members: vec![bob(), carol()],
            member_limit: 4,
            description: "Who wins the club final".into(),
            trading_period: 2 * DAY,
            mode: ResolutionMode::Receiver,
            stake_token: None,
            stake_per_participant: dec!(1),
            fee: dec!(0.2),
        };
        let err = h.engine.create_small_group(&h.gate, &alice(), req.clone(), T0).unwrap_err();
        assert!(matches!(err, WagerError::InvalidResolutionMode(_)));

        let err = h
            .engine
            .create_small_group(&h.gate, &alice(), SmallGroupRequest { fee: dec!(0.1), mode: ResolutionMode::Either, ..req }, T0)
            .unwrap_err();
        assert!(matches!(err, WagerError::InsufficientFee { .. }));
    }

    // ------------------------------------------------------------------------
    // Acceptance
    // ------------------------------------------------------------------------

    #[test]
    fn test_double_accept_rejected() {
        let mut h = harness();
        let id = h.create(one_vs_one(ResolutionMode::Either, DAY)).unwrap();
        h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + 1).unwrap();

        let err = h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + 2).unwrap_err();
        assert!(matches!(err, WagerError::InvalidStatus { action: "accept", .. }));
        assert_eq!(h.engine.escrow_balance(id).unwrap(), dec!(1.0));
        assert_eq!(h.balance(&bob()), dec!(9.5));
    }

    #[test]
    fn test_accept_rejects_wrong_amount_and_outsiders() {
        let mut h = harness();
        let id = h.create(one_vs_one(ResolutionMode::Either, DAY)).unwrap();

        let err = h.engine.accept_market(id, &bob(), &native(dec!(0.6)), T0 + 1).unwrap_err();
        assert!(matches!(err, WagerError::WrongStakeAmount { .. }));
        let err = h.engine.accept_market(id, &carol(), &native(dec!(0.5)), T0 + 1).unwrap_err();
        assert_eq!(err, WagerError::NotMember(carol()));

        assert_eq!(h.status(id), MarketStatus::PendingAcceptance);
        assert_eq!(h.engine.escrow_balance(id).unwrap(), dec!(0.5));
    }

    #[test]
    fn test_third_party_needs_arbitrator_acceptance() {
        let mut h = harness();
        let mode = ResolutionMode::ThirdParty { arbitrator: arbiter() };
        let id = h.create(one_vs_one(mode, DAY)).unwrap();

        let status = h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + 1).unwrap();
        assert_eq!(status, MarketStatus::PendingAcceptance);

        let status = h.engine.accept_market(id, &arbiter(), &native(Decimal::ZERO), T0 + 2).unwrap();
        assert_eq!(status, MarketStatus::Active);
        assert_eq!(h.balance(&arbiter()), Decimal::ZERO);
        assert_eq!(h.engine.get_user_markets(&arbiter()), vec![id]);

        let end = T0 + 2 + DAY;
        let err = h.engine.resolve_friend_market(id, &alice(), &ResolutionClaim::Binary(true), end).unwrap_err();
        assert!(matches!(err, WagerError::NotAuthorizedToResolve { .. }));
        h.engine.resolve_friend_market(id, &arbiter(), &ResolutionClaim::Binary(true), end).unwrap();
        assert_eq!(h.balance(&alice()), dec!(10.4));
    }

    #[test]
    fn test_cancel_pending_by_creator_only() {
        let mut h = harness();
        let id = h.create(one_vs_one(ResolutionMode::Either, DAY)).unwrap();

        assert_eq!(h.engine.cancel_pending_market(id, &bob(), T0 + 1).unwrap_err(), WagerError::NotCreator(bob()));
        h.engine.cancel_pending_market(id, &alice(), T0 + 1).unwrap();
        assert_eq!(h.status(id), MarketStatus::Cancelled);
        assert_eq!(h.balance(&alice()), dec!(9.9));
        assert_eq!(h.engine.accumulated_fees(&StakeAsset::Native), dec!(0.1));

        let err = h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + 2).unwrap_err();
        assert!(matches!(err, WagerError::InvalidStatus { .. }));
    }

    // ------------------------------------------------------------------------
    // Groups & membership
    // ------------------------------------------------------------------------

    #[test]
    fn test_small_group_join_and_resolve() {
        let mut h = harness();
        let id = h
            .engine
            .create_small_group(
                &h.gate,
                &alice(),
                SmallGroupRequest {
                    members: vec![bob(), carol()],
                    member_limit: 4,
                    description: "Closest guess on the river level".into(),
                    trading_period: 2 * DAY,
                    mode: ResolutionMode::Either,
                    stake_token: None,
                    stake_per_participant: dec!(1),
                    fee: dec!(0.2),
                },
                T0,
            )
            .unwrap();
        assert_eq!(h.status(id), MarketStatus::Active);
        assert_eq!(h.engine.escrow_balance(id).unwrap(), dec!(1));

        h.engine.accept_market(id, &bob(), &native(dec!(1)), T0 + 10).unwrap();
        assert_eq!(h.engine.escrow_balance(id).unwrap(), dec!(2));

        h.engine.add_member(id, &alice(), &addr("0xd"), T0 + 20).unwrap();
        assert_eq!(
            h.engine.add_member(id, &bob(), &addr("0xe"), T0 + 20).unwrap_err(),
            WagerError::NotCreator(bob())
        );
        assert_eq!(
            h.engine.add_member(id, &alice(), &addr("0xe"), T0 + 20).unwrap_err(),
            WagerError::MemberLimitReached { limit: 4 }
        );

        h.engine.remove_self(id, &carol()).unwrap();
        assert!(h.engine.get_user_markets(&carol()).is_empty());
        assert!(matches!(h.engine.remove_self(id, &bob()).unwrap_err(), WagerError::CannotLeave(_)));

        let end = T0 + 2 * DAY;
        let late = h.engine.accept_market(id, &addr("0xd"), &native(dec!(1)), end).unwrap_err();
        assert!(matches!(late, WagerError::TradingClosed { .. }));

        let outsider = h.engine.resolve_friend_market(id, &carol(), &ResolutionClaim::Winner(bob()), end).unwrap_err();
        assert!(matches!(outsider, WagerError::NotAuthorizedToResolve { .. }));
        let undeposited = h
            .engine
            .resolve_friend_market(id, &bob(), &ResolutionClaim::Winner(addr("0xd")), end)
            .unwrap_err();
        assert!(matches!(undeposited, WagerError::InvalidClaim(_)));
        let no_stake = h.engine.resolve_friend_market(id, &addr("0xd"), &ResolutionClaim::Winner(addr("0xd")), end);
        assert!(matches!(no_stake.unwrap_err(), WagerError::NotAuthorizedToResolve { .. }));

        let payout = h.engine.resolve_friend_market(id, &bob(), &ResolutionClaim::Winner(bob()), end).unwrap();
        assert_eq!(payout.amount, dec!(2));
        assert_eq!(h.balance(&bob()), dec!(11));
    }

    #[test]
    fn test_event_tracking_requires_week_and_roster() {
        let mut h = harness();
        let req = EventTrackingRequest {
            players: vec![bob(), carol()],
            description: "Tour de France podium".into(),
            trading_period: 6 * DAY,
            mode: ResolutionMode::ThirdParty { arbitrator: arbiter() },
            stake_token: None,
            stake_per_participant: dec!(1),
            fee: dec!(0.2),
        };
        let err = h.engine.create_event_tracking(&h.gate, &alice(), req.clone(), T0).unwrap_err();
        assert!(matches!(err, WagerError::InvalidTradingPeriod { .. }));

        let id = h
            .engine
            .create_event_tracking(&h.gate, &alice(), EventTrackingRequest { trading_period: 7 * DAY, ..req }, T0)
            .unwrap();
        let market = h.engine.get_friend_market(id).unwrap();
        assert_eq!(market.roster.member_limit(), 3);
        assert_eq!(market.status, MarketStatus::Active);
        assert_eq!(
            h.engine.add_member(id, &alice(), &addr("0xd"), T0 + 1).unwrap_err(),
            WagerError::MemberLimitReached { limit: 3 }
        );
    }

    // ------------------------------------------------------------------------
    // Resolution guards
    // ------------------------------------------------------------------------

    #[test]
    fn test_resolve_guards() {
        let mut h = harness();
        let id = h.create(one_vs_one(ResolutionMode::Initiator, DAY)).unwrap();

        let pending = h.engine.resolve_friend_market(id, &alice(), &ResolutionClaim::Binary(true), T0 + DAY).unwrap_err();
        assert!(matches!(pending, WagerError::InvalidStatus { .. }));

        h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + 1).unwrap();
        let early = h.engine.resolve_friend_market(id, &alice(), &ResolutionClaim::Binary(true), T0 + 2).unwrap_err();
        assert!(matches!(early, WagerError::TradingNotEnded { .. }));

        let end = T0 + 1 + DAY;
        let view = h.engine.get_friend_market_with_status(id, end).unwrap();
        assert_eq!(view.effective_status, MarketStatus::PendingResolution);
        assert_eq!(view.seconds_until_trading_ends, Some(0));

        let receiver = h.engine.resolve_friend_market(id, &bob(), &ResolutionClaim::Binary(false), end).unwrap_err();
        assert!(matches!(receiver, WagerError::NotAuthorizedToResolve { .. }));

        h.engine.resolve_friend_market(id, &alice(), &ResolutionClaim::Binary(true), end).unwrap();
        let again = h.engine.resolve_friend_market(id, &alice(), &ResolutionClaim::Binary(true), end).unwrap_err();
        assert!(matches!(again, WagerError::InvalidStatus { .. }));
        assert_eq!(h.balance(&alice()), dec!(10.4));
    }

    #[test]
    fn test_close_trading_moves_to_pending_resolution() {
        let mut h = harness();
        let id = h.create(one_vs_one(ResolutionMode::Either, DAY)).unwrap();
        h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0).unwrap();

        assert!(matches!(h.engine.close_trading(id, T0 + 1).unwrap_err(), WagerError::TradingNotEnded { .. }));
        h.engine.close_trading(id, T0 + DAY).unwrap();
        assert_eq!(h.status(id), MarketStatus::PendingResolution);
        assert!(h.engine.get_friend_market(id).unwrap().is_active());

        h.engine.resolve_friend_market(id, &alice(), &ResolutionClaim::Binary(true), T0 + DAY).unwrap();
        assert_eq!(h.status(id), MarketStatus::Resolved);
    }

    #[test]
    fn test_oracle_market_rejects_manual_resolution() {
        let mut h = harness();
        let (id, _) = h.active_oracle_market(None);
        let err = h
            .engine
            .resolve_friend_market(id, &alice(), &ResolutionClaim::Binary(true), T0 + 8 * DAY)
            .unwrap_err();
        assert!(matches!(err, WagerError::ManualResolutionDisabled(ResolutionType::PolymarketOracle)));
    }

    #[test]
    fn test_oracle_report_resolves() {
        let mut h = harness();
        let (id, _) = h.active_oracle_market(None);

        let stranger = h.engine.report_oracle_outcome(id, &alice(), true, T0 + 8 * DAY).unwrap_err();
        assert_eq!(stranger, WagerError::NotOracleReporter(alice()));
        let early = h.engine.report_oracle_outcome(id, &reporter(), true, T0 + DAY).unwrap_err();
        assert!(matches!(early, WagerError::TradingNotEnded { .. }));

        let payout = h.engine.report_oracle_outcome(id, &reporter(), false, T0 + 8 * DAY).unwrap();
        assert_eq!(payout.recipient, bob());
        assert_eq!(h.status(id), MarketStatus::Resolved);
        assert!(!h.engine.can_trigger_oracle_timeout(id, T0 + 100 * DAY));
    }

    #[test]
    fn test_late_oracle_report_rejected_after_timeout() {
        let mut h = harness();
        let (id, expected) = h.active_oracle_market(None);
        let after = expected + DEFAULT_ORACLE_TIMEOUT_SECS;
        h.engine.trigger_oracle_timeout(id, &carol(), after).unwrap();

        let err = h.engine.report_oracle_outcome(id, &reporter(), true, after + 1).unwrap_err();
        assert!(matches!(err, WagerError::InvalidStatus { .. }));
    }

    // ------------------------------------------------------------------------
    // Oracle timeout
    // ------------------------------------------------------------------------

    #[test]
    fn test_expected_time_rules() {
        let mut h = harness();
        let id = h.create(one_vs_one(oracle_mode(None), 7 * DAY)).unwrap();

        assert_eq!(
            h.engine.set_expected_resolution_time(id, &bob(), T0 + DAY, T0).unwrap_err(),
            WagerError::NotCreator(bob())
        );
        assert!(matches!(
            h.engine.set_expected_resolution_time(id, &alice(), T0, T0).unwrap_err(),
            WagerError::DeadlineNotInFuture { .. }
        ));
        h.engine.set_expected_resolution_time(id, &alice(), T0 + DAY, T0).unwrap();
        assert_eq!(
            h.engine.set_expected_resolution_time(id, &alice(), T0 + 2 * DAY, T0).unwrap_err(),
            WagerError::ExpectedTimeAlreadySet(id)
        );

        let plain = h.create(one_vs_one(ResolutionMode::Either, DAY)).unwrap();
        assert!(matches!(
            h.engine.set_expected_resolution_time(plain, &alice(), T0 + DAY, T0).unwrap_err(),
            WagerError::InvalidResolutionMode(_)
        ));
    }

    #[test]
    fn test_double_trigger_rejected() {
        let mut h = harness();
        let (id, expected) = h.active_oracle_market(None);
        let after = expected + DEFAULT_ORACLE_TIMEOUT_SECS;

        h.engine.trigger_oracle_timeout(id, &carol(), after).unwrap();
        let err = h.engine.trigger_oracle_timeout(id, &carol(), after + 1).unwrap_err();
        assert!(matches!(err, WagerError::InvalidStatus { status: MarketStatus::OracleTimedOut, .. }));
    }

    #[test]
    fn test_trigger_without_expected_time() {
        let mut h = harness();
        let id = h.create(one_vs_one(oracle_mode(None), 7 * DAY)).unwrap();
        h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + 1).unwrap();
        assert_eq!(
            h.engine.trigger_oracle_timeout(id, &carol(), T0 + 365 * DAY).unwrap_err(),
            WagerError::ExpectedTimeNotSet(id)
        );
    }

    #[test]
    fn test_refund_consent_rules() {
        let mut h = harness();
        let (id, expected) = h.active_oracle_market(Some(arbiter()));
        let after = expected + DEFAULT_ORACLE_TIMEOUT_SECS;

        let before = h.engine.accept_mutual_refund(id, &alice(), after).unwrap_err();
        assert!(matches!(before, WagerError::InvalidStatus { .. }));

        h.engine.trigger_oracle_timeout(id, &carol(), after).unwrap();
        assert_eq!(
            h.engine.accept_mutual_refund(id, &arbiter(), after).unwrap_err(),
            WagerError::NotOriginalParty(arbiter())
        );
        h.engine.accept_mutual_refund(id, &bob(), after).unwrap();
        assert_eq!(
            h.engine.accept_mutual_refund(id, &bob(), after).unwrap_err(),
            WagerError::RefundAlreadyAccepted(bob())
        );

        let status = h.engine.get_oracle_timeout_status(id, after).unwrap();
        assert!(status.timed_out);
        assert!(status.opponent_accepted_refund);
        assert!(!status.creator_accepted_refund);
        assert_eq!(h.status(id), MarketStatus::OracleTimedOut);
    }

    #[test]
    fn test_force_without_arbitrator_uses_owner() {
        let mut h = harness();
        let (id, expected) = h.active_oracle_market(None);
        let after = expected + DEFAULT_ORACLE_TIMEOUT_SECS;

        let not_yet = h.engine.force_oracle_resolution(id, &owner(), false, after).unwrap_err();
        assert!(matches!(not_yet, WagerError::InvalidStatus { .. }));

        h.engine.trigger_oracle_timeout(id, &carol(), after).unwrap();
        assert!(h.engine.force_oracle_resolution(id, &alice(), true, after).is_err());
        let payout = h.engine.force_oracle_resolution(id, &owner(), false, after).unwrap();
        assert_eq!(payout.recipient, bob());
        assert!(h.engine.force_oracle_resolution(id, &owner(), false, after).is_err());
    }

    #[test]
    fn test_oracle_timeout_admin() {
        let mut h = harness();
        assert_eq!(h.engine.set_oracle_timeout(&alice(), 10 * DAY).unwrap_err(), WagerError::NotOwner(alice()));
        assert!(matches!(
            h.engine.set_oracle_timeout(&owner(), 200 * DAY).unwrap_err(),
            WagerError::InvalidOracleTimeout { .. }
        ));

        let (id, expected) = h.active_oracle_market(None);
        assert_eq!(h.engine.set_oracle_timeout(&owner(), 7 * DAY).unwrap(), DEFAULT_ORACLE_TIMEOUT_SECS);
        assert!(h.engine.can_trigger_oracle_timeout(id, expected + 7 * DAY));
        assert_eq!(h.engine.stats().oracle_timeout_secs, 7 * DAY);
    }

    // ------------------------------------------------------------------------
    // Pegging
    // ------------------------------------------------------------------------

    #[test]
    fn test_peg_and_settle() {
        let mut h = harness();
        h.book.register(9, Some("Team A wins the cup".into()));
        let id = h.create(one_vs_one(ResolutionMode::Either, 30 * DAY)).unwrap();
        h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + 1).unwrap();

        assert_eq!(
            h.engine.peg_to_public_market(&h.book, id, &bob(), 9).unwrap_err(),
            WagerError::NotCreator(bob())
        );
        assert_eq!(
            h.engine.peg_to_public_market(&h.book, id, &alice(), 10).unwrap_err(),
            WagerError::PublicMarketNotFound(10)
        );
        h.engine.peg_to_public_market(&h.book, id, &alice(), 9).unwrap();
        assert_eq!(
            h.engine.peg_to_public_market(&h.book, id, &alice(), 9).unwrap_err(),
            WagerError::AlreadyPegged { market_id: id, public_market_id: 9 }
        );
        assert_eq!(h.engine.get_pegged_friend_markets(9), vec![id]);

        let manual = h
            .engine
            .resolve_friend_market(id, &alice(), &ResolutionClaim::Binary(true), T0 + 31 * DAY)
            .unwrap_err();
        assert!(matches!(manual, WagerError::ManualResolutionDisabled(ResolutionType::AutoPegged)));

        let unresolved = h.engine.settle_pegged_market(&h.book, id, &carol(), T0 + 2).unwrap_err();
        assert_eq!(unresolved, WagerError::PublicMarketUnresolved(9));

        h.book.record_outcome(9, true, T0 + 3).unwrap();
        let payout = h.engine.settle_pegged_market(&h.book, id, &carol(), T0 + 4).unwrap();
        assert_eq!(payout.recipient, alice());
        assert_eq!(h.engine.get_resolution(id).unwrap().unwrap().path, ResolutionPath::Pegged);
        assert!(h.engine.settle_pegged_market(&h.book, id, &carol(), T0 + 5).is_err());
    }

    #[test]
    fn test_recorded_outcome_settles_every_pegged_market() {
        let mut h = harness();
        h.book.register(12, None);
        let first = h.create(one_vs_one(ResolutionMode::AutoPegged { public_market_id: 12 }, 30 * DAY)).unwrap();
        let second = h.create(one_vs_one(ResolutionMode::Either, 30 * DAY)).unwrap();
        let waiting = h.create(one_vs_one(ResolutionMode::AutoPegged { public_market_id: 12 }, 30 * DAY)).unwrap();
        h.engine.accept_market(first, &bob(), &native(dec!(0.5)), T0 + 1).unwrap();
        h.engine.accept_market(second, &bob(), &native(dec!(0.5)), T0 + 1).unwrap();
        h.engine.peg_to_public_market(&h.book, second, &alice(), 12).unwrap();

        assert!(h.engine.settle_pegged_markets(&h.book, 12, &owner(), T0 + 2).is_empty());
        assert_eq!(h.status(first), MarketStatus::Active);

        h.book.record_outcome(12, false, T0 + 3).unwrap();
        let payouts = h.engine.settle_pegged_markets(&h.book, 12, &owner(), T0 + 3);
        assert_eq!(payouts.len(), 2);
        assert!(payouts.iter().all(|p| p.recipient == bob()));
        assert_eq!(h.status(first), MarketStatus::Resolved);
        assert_eq!(h.status(second), MarketStatus::Resolved);
        assert_eq!(h.status(waiting), MarketStatus::PendingAcceptance);
        let resolution = h.engine.get_resolution(first).unwrap().unwrap();
        assert_eq!(resolution.path, ResolutionPath::Pegged);
        assert_eq!(resolution.resolved_by, owner());

        h.engine.accept_market(waiting, &bob(), &native(dec!(0.5)), T0 + 4).unwrap();
        let late = h.engine.settle_pegged_markets(&h.book, 12, &owner(), T0 + 5);
        assert_eq!(late.len(), 1);
        assert_eq!(h.status(waiting), MarketStatus::Resolved);
        assert!(h.engine.settle_pegged_markets(&h.book, 12, &owner(), T0 + 6).is_empty());
    }

    #[test]
    fn test_peg_rejected_once_resolved() {
        let mut h = harness();
        h.book.register(9, None);
        let id = h.create(one_vs_one(ResolutionMode::Either, DAY)).unwrap();
        h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0).unwrap();
        h.engine.resolve_friend_market(id, &bob(), &ResolutionClaim::Binary(false), T0 + DAY).unwrap();

        let err = h.engine.peg_to_public_market(&h.book, id, &alice(), 9).unwrap_err();
        assert!(matches!(err, WagerError::InvalidStatus { status: MarketStatus::Resolved, .. }));
    }

    #[test]
    fn test_auto_pegged_at_creation() {
        let mut h = harness();
        h.book.register(5, None);
        let id = h.create(one_vs_one(ResolutionMode::AutoPegged { public_market_id: 5 }, DAY)).unwrap();
        assert!(h.engine.get_friend_market(id).unwrap().is_auto_pegged());
        assert_eq!(h.engine.get_pegged_friend_markets(5), vec![id]);

        h.book.record_outcome(5, false, T0).unwrap();
        let pending = h.engine.settle_pegged_market(&h.book, id, &carol(), T0 + 1).unwrap_err();
        assert!(matches!(pending, WagerError::InvalidStatus { .. }));

        h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + 2).unwrap();
        let payout = h.engine.settle_pegged_market(&h.book, id, &carol(), T0 + 3).unwrap();
        assert_eq!(payout.recipient, bob());
    }

    // ------------------------------------------------------------------------
    // Escrow invariants & fees
    // ------------------------------------------------------------------------

    #[test]
    fn test_escrow_equals_stake_times_deposits() {
        let mut h = harness();
        let id = h
            .engine
            .create_small_group(
                &h.gate,
                &alice(),
                SmallGroupRequest {
                    members: vec![bob(), carol(), addr("0xd")],
                    member_limit: 5,
                    description: "Book club streak".into(),
                    trading_period: 3 * DAY,
                    mode: ResolutionMode::Initiator,
                    stake_token: None,
                    stake_per_participant: dec!(0.75),
                    fee: dec!(0.25),
                },
                T0,
            )
            .unwrap();

        for (i, who) in [bob(), carol(), addr("0xd")].iter().enumerate() {
            h.engine.accept_market(id, who, &native(dec!(0.75)), T0 + i as u64).unwrap();
            let market = h.engine.get_friend_market(id).unwrap();
            let expected = dec!(0.75) * Decimal::from(market.roster.deposited_count() as u64);
            assert_eq!(h.engine.escrow_balance(id).unwrap(), expected);
        }
        assert_eq!(h.engine.accumulated_fees(&StakeAsset::Native), dec!(0.25));
    }

    #[test]
    fn test_token_stakes_and_fee_withdrawal() {
        let mut h = harness();
        let token = addr("0x70c3");
        let asset = StakeAsset::Token(token.clone());
        h.engine.fund_account(&alice(), &asset, dec!(5), T0).unwrap();
        h.engine.fund_account(&bob(), &asset, dec!(5), T0).unwrap();

        let mut req = one_vs_one(ResolutionMode::Either, DAY);
        req.stake_token = Some(token);
        let id = h.create(req).unwrap();

        let wrong = h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + 1).unwrap_err();
        assert!(matches!(wrong, WagerError::WrongAsset { .. }));
        h.engine.accept_market(id, &bob(), &Payment::new(asset.clone(), dec!(0.5)), T0 + 1).unwrap();

        assert_eq!(h.engine.accumulated_fees(&asset), dec!(0.1));
        assert_eq!(h.engine.accumulated_fees(&StakeAsset::Native), Decimal::ZERO);
        assert_eq!(
            h.engine.withdraw_fees(&alice(), &asset, T0 + 2).unwrap_err(),
            WagerError::NotOwner(alice())
        );
        let payout = h.engine.withdraw_fees(&owner(), &asset, T0 + 2).unwrap();
        assert_eq!(payout.amount, dec!(0.1));
        assert_eq!(h.engine.balance_of(&owner(), &asset), dec!(0.1));
        assert_eq!(h.engine.escrow_balance(id).unwrap(), dec!(1.0));
    }

    #[test]
    fn test_events_journal() {
        let mut h = harness();
        let id = h.create(one_vs_one(ResolutionMode::Either, DAY)).unwrap();
        h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + 1).unwrap();

        let events = h.engine.drain_events();
        assert!(matches!(events[0], WagerEvent::MarketCreated { .. }));
        assert!(matches!(events.last(), Some(WagerEvent::MarketActivated { .. })));
        assert!(events.iter().all(|e| e.market_id() == Some(id)));
        assert!(h.engine.drain_events().is_empty());

        let _ = h.engine.accept_market(id, &bob(), &native(dec!(0.5)), T0 + 2);
        assert!(h.engine.drain_events().is_empty());
    }

    #[test]
    fn test_state_survives_json_round_trip() {
        let mut h = harness();
        let (id, expected) = h.active_oracle_market(None);
        let json = serde_json::to_string(&h.engine).unwrap();
        let restored: FriendMarketEngine = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.get_friend_market(id).unwrap().status, MarketStatus::Active);
        assert_eq!(restored.escrow_balance(id).unwrap(), dec!(1.0));
        assert_eq!(restored.balance_of(&alice(), &StakeAsset::Native), dec!(9.4));
        assert!(restored.can_trigger_oracle_timeout(id, expected + DEFAULT_ORACLE_TIMEOUT_SECS));
        assert_eq!(restored.get_user_markets(&bob()), vec![id]);
    }
}

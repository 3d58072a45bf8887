/// Stake Ledger - escrowed wager funds, wallets and protocol fees
///
/// Holds, per market, the stakes deposited by its members in the market's
/// asset (native currency or a payment token). Escrow is released exactly
/// once: either in full to a winner or back to each depositor. Creation fees
/// accumulate per asset in a separate pot that only the owner can drain.
///
/// Every mutating call validates first and mutates last, so a rejected call
/// leaves balances, escrow and fees untouched.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::errors::WagerError;
use super::types::{Address, MarketId, StakeAsset};

// ============================================================================
// CORE TYPES
// ============================================================================

/// Value attached to a call (the `msg.value` / token transfer of the call)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default)]
    pub asset: StakeAsset,
    pub amount: Decimal,
}

impl Payment {
    pub fn new(asset: StakeAsset, amount: Decimal) -> Self {
        Self { asset, amount }
    }

    pub fn native(amount: Decimal) -> Self {
        Self::new(StakeAsset::Native, amount)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub member: Address,
    pub amount: Decimal,
    pub timestamp: u64,
}

/// Per-market escrow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escrow {
    pub market_id: MarketId,
    pub asset: StakeAsset,
    pub stake_per_participant: Decimal,
    pub deposits: Vec<Deposit>,
    /// Set when funds leave escrow; never cleared
    pub released_at: Option<u64>,
}

impl Escrow {
    pub fn total(&self) -> Decimal {
        if self.released_at.is_some() {
            return Decimal::ZERO;
        }
        self.deposits.iter().map(|d| d.amount).sum()
    }

    pub fn is_released(&self) -> bool {
        self.released_at.is_some()
    }

    pub fn has_deposit_from(&self, member: &Address) -> bool {
        self.deposits.iter().any(|d| &d.member == member)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    Winnings,
    Refund,
    Fees,
}

/// Funds credited out of escrow or the fee pot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payout {
    pub market_id: Option<MarketId>,
    pub recipient: Address,
    pub asset: StakeAsset,
    pub amount: Decimal,
    pub kind: PayoutKind,
    pub timestamp: u64,
    /// SHA-256 over the payout fields, hex encoded
    pub receipt: String,
}

impl Payout {
    fn new(
        market_id: Option<MarketId>,
        recipient: Address,
        asset: StakeAsset,
        amount: Decimal,
        kind: PayoutKind,
        timestamp: u64,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(market_id.unwrap_or(0).to_le_bytes());
        hasher.update(recipient.as_str().as_bytes());
        hasher.update(asset.to_string().as_bytes());
        hasher.update(amount.to_string().as_bytes());
        hasher.update(format!("{:?}", kind).as_bytes());
        hasher.update(timestamp.to_le_bytes());
        let receipt = hex::encode(hasher.finalize());

        Self { market_id, recipient, asset, amount, kind, timestamp, receipt }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Fund,
    StakeDeposit,
    CreationFee,
    Winnings,
    Refund,
    FeeWithdrawal,
}

/// Append-only record of every balance movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub entry_type: EntryType,
    pub account: Address,
    pub asset: StakeAsset,
    pub amount: Decimal,
    pub market_id: Option<MarketId>,
    pub timestamp: u64,
}

// ============================================================================
// STAKE LEDGER
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StakeLedger {
    /// Spendable wallet balances
    balances: BTreeMap<Address, BTreeMap<StakeAsset, Decimal>>,
    escrows: BTreeMap<MarketId, Escrow>,
    /// Accumulated creation fees per asset
    fees: BTreeMap<StakeAsset, Decimal>,
    entries: Vec<LedgerEntry>,
}

impl StakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Wallets
    // ------------------------------------------------------------------------

    pub fn balance_of(&self, account: &Address, asset: &StakeAsset) -> Decimal {
        self.balances
            .get(account)
            .and_then(|assets| assets.get(asset))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn balances_of(&self, account: &Address) -> BTreeMap<StakeAsset, Decimal> {
        self.balances.get(account).cloned().unwrap_or_default()
    }

    /// Credit an account from outside the wager system (faucet / bridge-in)
    pub fn fund(
        &mut self,
        account: &Address,
        asset: &StakeAsset,
        amount: Decimal,
        now: u64,
    ) -> Result<Decimal, WagerError> {
        if amount <= Decimal::ZERO {
            return Err(WagerError::InvalidStake("funding amount must be positive".into()));
        }
        if account.is_zero() {
            return Err(WagerError::InvalidAddress("cannot fund the zero address".into()));
        }
        self.credit(account, asset, amount);
        self.record(EntryType::Fund, account, asset, amount, None, now);
        Ok(self.balance_of(account, asset))
    }

    pub fn ensure_available(
        &self,
        account: &Address,
        asset: &StakeAsset,
        required: Decimal,
    ) -> Result<(), WagerError> {
        let available = self.balance_of(account, asset);
        if available < required {
            return Err(WagerError::InsufficientBalance { available, required });
        }
        Ok(())
    }

    fn credit(&mut self, account: &Address, asset: &StakeAsset, amount: Decimal) {
        *self
            .balances
            .entry(account.clone())
            .or_default()
            .entry(asset.clone())
            .or_insert(Decimal::ZERO) += amount;
    }

    fn debit(&mut self, account: &Address, asset: &StakeAsset, amount: Decimal) -> Result<(), WagerError> {
        self.ensure_available(account, asset, amount)?;
        if let Some(balance) = self.balances.get_mut(account).and_then(|a| a.get_mut(asset)) {
            *balance -= amount;
        }
        Ok(())
    }

    fn record(
        &mut self,
        entry_type: EntryType,
        account: &Address,
        asset: &StakeAsset,
        amount: Decimal,
        market_id: Option<MarketId>,
        timestamp: u64,
    ) {
        self.entries.push(LedgerEntry {
            id: uuid::Uuid::new_v4().to_string(),
            entry_type,
            account: account.clone(),
            asset: asset.clone(),
            amount,
            market_id,
            timestamp,
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    // ------------------------------------------------------------------------
    // Escrow
    // ------------------------------------------------------------------------

    /// Checks that `member` can escrow exactly the stake with `payment`
    pub fn check_stake_payment(
        &self,
        member: &Address,
        asset: &StakeAsset,
        stake: Decimal,
        payment: &Payment,
    ) -> Result<(), WagerError> {
        if &payment.asset != asset {
            return Err(WagerError::WrongAsset { expected: asset.clone(), provided: payment.asset.clone() });
        }
        if payment.amount != stake {
            return Err(WagerError::WrongStakeAmount { expected: stake, provided: payment.amount });
        }
        self.ensure_available(member, asset, stake)
    }

    /// Opens the escrow for a new market and takes the creator's fee and stake.
    /// The fee is paid in the market's asset.
    pub fn open_escrow(
        &mut self,
        market_id: MarketId,
        creator: &Address,
        asset: &StakeAsset,
        stake: Decimal,
        fee: Decimal,
        now: u64,
    ) -> Result<(), WagerError> {
        if self.escrows.contains_key(&market_id) {
            return Err(WagerError::InvalidStake(format!("escrow for market {} already exists", market_id)));
        }
        self.ensure_available(creator, asset, stake + fee)?;

        self.debit(creator, asset, fee)?;
        *self.fees.entry(asset.clone()).or_insert(Decimal::ZERO) += fee;
        self.record(EntryType::CreationFee, creator, asset, fee, Some(market_id), now);

        self.escrows.insert(
            market_id,
            Escrow {
                market_id,
                asset: asset.clone(),
                stake_per_participant: stake,
                deposits: Vec::new(),
                released_at: None,
            },
        );
        self.deposit_unchecked(market_id, creator, stake, now)
    }

    pub fn check_deposit(&self, market_id: MarketId, member: &Address, payment: &Payment) -> Result<(), WagerError> {
        let escrow = self.escrows.get(&market_id).ok_or(WagerError::EscrowNotFound(market_id))?;
        if escrow.is_released() {
            return Err(WagerError::EscrowAlreadyReleased(market_id));
        }
        if escrow.has_deposit_from(member) {
            return Err(WagerError::AlreadyDeposited(member.clone()));
        }
        self.check_stake_payment(member, &escrow.asset, escrow.stake_per_participant, payment)
    }

    /// Escrows exactly one stake from `member`; over- or under-payment is rejected
    pub fn deposit(
        &mut self,
        market_id: MarketId,
        member: &Address,
        payment: &Payment,
        now: u64,
    ) -> Result<Decimal, WagerError> {
        self.check_deposit(market_id, member, payment)?;
        self.deposit_unchecked(market_id, member, payment.amount, now)?;
        Ok(self.escrow_total(market_id))
    }

    fn deposit_unchecked(
        &mut self,
        market_id: MarketId,
        member: &Address,
        amount: Decimal,
        now: u64,
    ) -> Result<(), WagerError> {
        let asset = self
            .escrows
            .get(&market_id)
            .map(|e| e.asset.clone())
            .ok_or(WagerError::EscrowNotFound(market_id))?;
        self.debit(member, &asset, amount)?;
        if let Some(escrow) = self.escrows.get_mut(&market_id) {
            escrow.deposits.push(Deposit { member: member.clone(), amount, timestamp: now });
        }
        self.record(EntryType::StakeDeposit, member, &asset, amount, Some(market_id), now);
        Ok(())
    }

    pub fn escrow(&self, market_id: MarketId) -> Option<&Escrow> {
        self.escrows.get(&market_id)
    }

    pub fn escrow_total(&self, market_id: MarketId) -> Decimal {
        self.escrows.get(&market_id).map(|e| e.total()).unwrap_or(Decimal::ZERO)
    }

    pub fn check_release(&self, market_id: MarketId) -> Result<(), WagerError> {
        let escrow = self.escrows.get(&market_id).ok_or(WagerError::EscrowNotFound(market_id))?;
        if escrow.is_released() {
            return Err(WagerError::EscrowAlreadyReleased(market_id));
        }
        Ok(())
    }

    /// Pays the whole escrow to a single winner
    pub fn release_to_winner(
        &mut self,
        market_id: MarketId,
        winner: &Address,
        now: u64,
    ) -> Result<Payout, WagerError> {
        self.check_release(market_id)?;
        let (asset, total) = match self.escrows.get_mut(&market_id) {
            Some(escrow) => {
                let total = escrow.total();
                escrow.released_at = Some(now);
                (escrow.asset.clone(), total)
            }
            None => return Err(WagerError::EscrowNotFound(market_id)),
        };
        self.credit(winner, &asset, total);
        self.record(EntryType::Winnings, winner, &asset, total, Some(market_id), now);
        Ok(Payout::new(Some(market_id), winner.clone(), asset, total, PayoutKind::Winnings, now))
    }

    /// Returns every deposit to the member who made it
    pub fn refund_all(&mut self, market_id: MarketId, now: u64) -> Result<Vec<Payout>, WagerError> {
        self.check_release(market_id)?;
        let (asset, deposits) = match self.escrows.get_mut(&market_id) {
            Some(escrow) => {
                escrow.released_at = Some(now);
                (escrow.asset.clone(), escrow.deposits.clone())
            }
            None => return Err(WagerError::EscrowNotFound(market_id)),
        };

        let mut payouts = Vec::with_capacity(deposits.len());
        for deposit in deposits {
            self.credit(&deposit.member, &asset, deposit.amount);
            self.record(EntryType::Refund, &deposit.member, &asset, deposit.amount, Some(market_id), now);
            payouts.push(Payout::new(
                Some(market_id),
                deposit.member,
                asset.clone(),
                deposit.amount,
                PayoutKind::Refund,
                now,
            ));
        }
        Ok(payouts)
    }

    // ------------------------------------------------------------------------
    // Fees
    // ------------------------------------------------------------------------

    pub fn accumulated_fees(&self, asset: &StakeAsset) -> Decimal {
        self.fees.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn all_fees(&self) -> &BTreeMap<StakeAsset, Decimal> {
        &self.fees
    }

    /// Drains the fee pot for `asset` into `recipient`. Ownership is checked by the caller.
    pub fn withdraw_fees(
        &mut self,
        asset: &StakeAsset,
        recipient: &Address,
        now: u64,
    ) -> Result<Payout, WagerError> {
        let amount = self.accumulated_fees(asset);
        if amount <= Decimal::ZERO {
            return Err(WagerError::NoFeesToWithdraw(asset.clone()));
        }
        self.fees.insert(asset.clone(), Decimal::ZERO);
        self.credit(recipient, asset, amount);
        self.record(EntryType::FeeWithdrawal, recipient, asset, amount, None, now);
        Ok(Payout::new(None, recipient.clone(), asset.clone(), amount, PayoutKind::Fees, now))
    }

    /// Total value held in unreleased escrows for `asset`
    pub fn total_escrowed(&self, asset: &StakeAsset) -> Decimal {
        self.escrows.values().filter(|e| &e.asset == asset).map(|e| e.total()).sum()
    }
}

// ============================================================================
// Ledger Accounts
// Per-participant currency and asset balances
// ============================================================================
//
// The four credit/debit primitives are the only code that changes a
// balance. Multi-leg operations stage their postings in a `LedgerBatch`,
// which is checked against projected balances in full before the first
// primitive runs.

use crate::error::{ExchangeError, ExchangeResult};
use std::collections::{BTreeMap, HashMap};

use super::{AssetIndex, TraderId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which balance of an account a posting touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BalanceKey {
    Currency,
    Asset(AssetIndex),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Account {
    currency: u64,
    assets: BTreeMap<AssetIndex, u64>,
}

impl Account {
    pub fn currency_balance(&self) -> u64 {
        self.currency
    }

    pub fn asset_balance(&self, index: AssetIndex) -> u64 {
        self.assets.get(&index).copied().unwrap_or(0)
    }

    pub fn balance(&self, key: BalanceKey) -> u64 {
        match key {
            BalanceKey::Currency => self.currency,
            BalanceKey::Asset(index) => self.asset_balance(index),
        }
    }

    fn balance_mut(&mut self, key: BalanceKey) -> &mut u64 {
        match key {
            BalanceKey::Currency => &mut self.currency,
            BalanceKey::Asset(index) => self.assets.entry(index).or_insert(0),
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    accounts: HashMap<TraderId, Account>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, trader: &TraderId) -> Option<&Account> {
        self.accounts.get(trader)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&TraderId, &Account)> {
        self.accounts.iter()
    }

    pub fn balance(&self, trader: &TraderId, key: BalanceKey) -> u64 {
        self.accounts.get(trader).map_or(0, |a| a.balance(key))
    }

    pub fn currency_balance(&self, trader: &TraderId) -> u64 {
        self.balance(trader, BalanceKey::Currency)
    }

    pub fn asset_balance(&self, trader: &TraderId, index: AssetIndex) -> u64 {
        self.balance(trader, BalanceKey::Asset(index))
    }

    /// Sum of every account's currency balance
    pub fn total_currency(&self) -> u128 {
        self.accounts
            .values()
            .map(|a| u128::from(a.currency))
            .sum()
    }

    /// Sum of every account's balance of one asset
    pub fn total_asset(&self, index: AssetIndex) -> u128 {
        self.accounts
            .values()
            .map(|a| u128::from(a.asset_balance(index)))
            .sum()
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    pub fn credit_currency(&mut self, trader: &TraderId, amount: u64) -> ExchangeResult<()> {
        self.credit(trader, BalanceKey::Currency, amount)
    }

    pub fn debit_currency(&mut self, trader: &TraderId, amount: u64) -> ExchangeResult<()> {
        self.debit(trader, BalanceKey::Currency, amount)
    }

    pub fn credit_asset(
        &mut self,
        trader: &TraderId,
        index: AssetIndex,
        amount: u64,
    ) -> ExchangeResult<()> {
        self.credit(trader, BalanceKey::Asset(index), amount)
    }

    pub fn debit_asset(
        &mut self,
        trader: &TraderId,
        index: AssetIndex,
        amount: u64,
    ) -> ExchangeResult<()> {
        self.debit(trader, BalanceKey::Asset(index), amount)
    }

    // ========================================================================
    // Staged postings
    // ========================================================================

    /// Check every posting against projected balances, then apply them in
    /// order. Nothing is applied if any posting would fail.
    pub fn commit(&mut self, batch: LedgerBatch) -> ExchangeResult<()> {
        self.check(&batch)?;
        for posting in &batch.postings {
            match posting.direction {
                Direction::Credit => self.credit(&posting.trader, posting.key, posting.amount)?,
                Direction::Debit => self.debit(&posting.trader, posting.key, posting.amount)?,
            }
        }
        Ok(())
    }

    /// Dry run of `commit`
    pub fn check(&self, batch: &LedgerBatch) -> ExchangeResult<()> {
        let mut projected: HashMap<(&TraderId, BalanceKey), u64> = HashMap::new();
        for posting in &batch.postings {
            let balance = projected
                .entry((&posting.trader, posting.key))
                .or_insert_with(|| self.balance(&posting.trader, posting.key));
            *balance = match posting.direction {
                Direction::Credit => balance
                    .checked_add(posting.amount)
                    .ok_or(ExchangeError::Overflow)?,
                Direction::Debit => balance
                    .checked_sub(posting.amount)
                    .ok_or_else(|| shortfall(posting.key, posting.amount, *balance))?,
            };
        }
        Ok(())
    }

    fn credit(&mut self, trader: &TraderId, key: BalanceKey, amount: u64) -> ExchangeResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let account = self.accounts.entry(trader.clone()).or_default();
        let balance = account.balance_mut(key);
        *balance = balance.checked_add(amount).ok_or(ExchangeError::Overflow)?;
        Ok(())
    }

    fn debit(&mut self, trader: &TraderId, key: BalanceKey, amount: u64) -> ExchangeResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.balance(trader, key);
        if amount > available {
            return Err(shortfall(key, amount, available));
        }
        if let Some(account) = self.accounts.get_mut(trader) {
            *account.balance_mut(key) -= amount;
        }
        Ok(())
    }
}

fn shortfall(key: BalanceKey, required: u64, available: u64) -> ExchangeError {
    match key {
        BalanceKey::Currency => ExchangeError::InsufficientCurrency {
            required,
            available,
        },
        BalanceKey::Asset(_) => ExchangeError::InsufficientAsset {
            required,
            available,
        },
    }
}

// ============================================================================
// Ledger Batch
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Credit,
    Debit,
}

#[derive(Debug, Clone)]
struct Posting {
    trader: TraderId,
    key: BalanceKey,
    direction: Direction,
    amount: u64,
}

/// Staging buffer of postings applied together by `Ledger::commit`
#[derive(Debug, Clone, Default)]
pub struct LedgerBatch {
    postings: Vec<Posting>,
}

impl LedgerBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&mut self, trader: &TraderId, key: BalanceKey, amount: u64) -> &mut Self {
        self.push(trader, key, Direction::Credit, amount)
    }

    pub fn debit(&mut self, trader: &TraderId, key: BalanceKey, amount: u64) -> &mut Self {
        self.push(trader, key, Direction::Debit, amount)
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    fn push(
        &mut self,
        trader: &TraderId,
        key: BalanceKey,
        direction: Direction,
        amount: u64,
    ) -> &mut Self {
        if amount > 0 {
            self.postings.push(Posting {
                trader: trader.clone(),
                key,
                direction,
                amount,
            });
        }
        self
    }
}

// ============================================================================
// Asset Contract Interface
// Capability the exchange uses to move external assets in and out of custody
// ============================================================================

use crate::domain::TraderId;
use crate::error::ContractError;
use parking_lot::Mutex;
use std::collections::HashMap;

/// External asset exposed to the exchange.
///
/// The exchange only ever pulls funds a holder has authorized it to take,
/// and pushes funds out of its own custody.
pub trait AssetContract: Send + Sync {
    fn balance_of(&self, holder: &TraderId) -> u64;

    /// Amount `spender` may still pull from `owner`
    fn allowance(&self, owner: &TraderId, spender: &TraderId) -> u64;

    /// Let `spender` pull up to `amount` from `owner` (replaces any
    /// previous allowance)
    fn authorize(&self, owner: &TraderId, spender: &TraderId, amount: u64);

    /// Pull `amount` from `from` into `custodian`, consuming allowance
    fn transfer_in(
        &self,
        from: &TraderId,
        custodian: &TraderId,
        amount: u64,
    ) -> Result<(), ContractError>;

    /// Push `amount` out of `custodian` to `to`
    fn transfer_out(&self, custodian: &TraderId, to: &TraderId, amount: u64)
        -> Result<(), ContractError>;
}

// ============================================================================
// Fixed Supply Token
// ============================================================================

/// In-memory token whose whole supply starts with its creator
pub struct FixedSupplyToken {
    total_supply: u64,
    state: Mutex<TokenState>,
}

#[derive(Default)]
struct TokenState {
    balances: HashMap<TraderId, u64>,
    allowances: HashMap<(TraderId, TraderId), u64>,
}

impl FixedSupplyToken {
    pub const DEFAULT_SUPPLY: u64 = 1_000_000;

    pub fn new(owner: TraderId) -> Self {
        Self::with_supply(owner, Self::DEFAULT_SUPPLY)
    }

    pub fn with_supply(owner: TraderId, total_supply: u64) -> Self {
        let mut state = TokenState::default();
        state.balances.insert(owner, total_supply);
        Self {
            total_supply,
            state: Mutex::new(state),
        }
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Holder-initiated transfer
    pub fn transfer(&self, from: &TraderId, to: &TraderId, amount: u64) -> Result<(), ContractError> {
        self.state.lock().move_balance(from, to, amount)
    }
}

impl TokenState {
    fn balance(&self, holder: &TraderId) -> u64 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    fn move_balance(&mut self, from: &TraderId, to: &TraderId, amount: u64) -> Result<(), ContractError> {
        let available = self.balance(from);
        if available < amount {
            return Err(ContractError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance(to)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;

        self.balances.insert(from.clone(), available - amount);
        self.balances.insert(to.clone(), credited);
        Ok(())
    }
}

impl AssetContract for FixedSupplyToken {
    fn balance_of(&self, holder: &TraderId) -> u64 {
        self.state.lock().balance(holder)
    }

    fn allowance(&self, owner: &TraderId, spender: &TraderId) -> u64 {
        self.state
            .lock()
            .allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn authorize(&self, owner: &TraderId, spender: &TraderId, amount: u64) {
        self.state
            .lock()
            .allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    fn transfer_in(
        &self,
        from: &TraderId,
        custodian: &TraderId,
        amount: u64,
    ) -> Result<(), ContractError> {
        let mut state = self.state.lock();
        let key = (from.clone(), custodian.clone());
        let approved = state.allowances.get(&key).copied().unwrap_or(0);
        if approved < amount {
            return Err(ContractError::InsufficientAllowance {
                required: amount,
                approved,
            });
        }
        state.move_balance(from, custodian, amount)?;
        state.allowances.insert(key, approved - amount);
        Ok(())
    }

    fn transfer_out(
        &self,
        custodian: &TraderId,
        to: &TraderId,
        amount: u64,
    ) -> Result<(), ContractError> {
        self.state.lock().move_balance(custodian, to, amount)
    }
}

// ============================================================================
// Exchange Errors
// Precondition failures raised before any ledger or book mutation
// ============================================================================

use crate::domain::OrderId;
use thiserror::Error;

/// Failures reported by an external asset contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("allowance too low: required {required}, approved {approved}")]
    InsufficientAllowance { required: u64, approved: u64 },

    #[error("holder balance too low: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("transfer would overflow the recipient balance")]
    Overflow,
}

/// Errors returned by exchange operations.
///
/// Every variant is detected before state is touched, so a failed call
/// leaves the exchange exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("asset {symbol} is already registered")]
    AlreadyRegistered { symbol: String },

    #[error("unknown asset: {symbol}")]
    UnknownAsset { symbol: String },

    #[error("insufficient currency: required {required}, available {available}")]
    InsufficientCurrency { required: u64, available: u64 },

    #[error("insufficient asset balance: required {required}, available {available}")]
    InsufficientAsset { required: u64, available: u64 },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(&'static str),

    #[error("invalid asset symbol {symbol:?}: {reason}")]
    InvalidSymbol { symbol: String, reason: &'static str },

    #[error("arithmetic overflow")]
    Overflow,

    #[error("{trader} is not allowed to register assets")]
    Unauthorized { trader: String },

    #[error("{trader} is the custodian identity and cannot hold or trade balances")]
    CustodianAccount { trader: String },

    #[error("matching algorithm produced an unusable plan: {0}")]
    InvalidMatchPlan(String),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {order_id} does not belong to {trader}")]
    NotOrderOwner { order_id: OrderId, trader: String },

    #[error("asset contract rejected transfer: {0}")]
    Contract(#[from] ContractError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("exchange sequencer has stopped")]
    EngineStopped,
}

/// Result alias for exchange operations
pub type ExchangeResult<T> = Result<T, ExchangeError>;

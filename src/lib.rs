// ============================================================================
// Ledger Exchange Library
// Custodial limit-order exchange with price/time matching
// ============================================================================

//! # Ledger Exchange
//!
//! An in-memory exchange that holds currency and registered assets in
//! custody and matches limit orders against per-asset order books.
//!
//! ## Features
//!
//! - **Custody ledger** with currency and per-asset balances
//! - **Price/time priority** matching; trades settle at the resting price
//! - **All-or-nothing operations**: postings are staged and validated before
//!   anything is applied
//! - **Pluggable seams** for matching, event sinks and external asset contracts
//! - **Serialized sharing** across threads via a lock or a command sequencer
//!
//! ## Example
//!
//! ```rust
//! use ledger_exchange::prelude::*;
//! use std::sync::Arc;
//!
//! let mut engine = MatchingEngine::new(ExchangeConfig::default(), Arc::new(NoOpEventHandler))?;
//!
//! // The asset's whole supply starts with "issuer"
//! let issuer = TraderId::from("issuer");
//! let alice = TraderId::from("alice");
//! let token = Arc::new(FixedSupplyToken::new(issuer.clone()));
//! engine.register(&issuer, "FAB", token.clone())?;
//!
//! // Move assets into custody, fund a buyer
//! token.authorize(&issuer, &engine.config().custodian, 500);
//! engine.deposit_asset(&issuer, "FAB", 500)?;
//! engine.deposit_currency(&alice, 10_000)?;
//!
//! engine.sell(&issuer, "FAB", 50, 90)?;
//! let outcome = engine.buy(&alice, "FAB", 20, 100)?;
//!
//! assert_eq!(outcome.trades.len(), 1);
//! assert_eq!(outcome.trades[0].price, 90);
//! assert_eq!(engine.sell_book_summary("FAB")?.as_tuple(), (90, 90, 30));
//! # Ok::<(), ExchangeError>(())
//! ```

pub mod domain;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod utils;

// Re-exports for convenience
pub mod prelude {
    pub use crate::domain::{
        AssetIndex, BookSummary, ExchangeConfig, Order, OrderBookSide, OrderId, Price, Quantity,
        ReservationPolicy, Side, Trade, TraderId,
    };
    pub use crate::engine::{
        create_from_config, CustodyTotals, MatchingEngine, MatchingEngineBuilder, OrderOutcome,
        PriceTimePriority, Sequencer, SequencerHandle, SharedExchange,
    };
    pub use crate::error::{ContractError, ExchangeError, ExchangeResult};
    pub use crate::interfaces::{
        AssetContract, EventHandler, ExchangeEvent, FixedSupplyToken, LoggingEventHandler,
        MatchingAlgorithm, NoOpEventHandler, RecordingEventHandler,
    };
}

// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod account;
pub mod asset;
pub mod config;
pub mod order;
pub mod order_book;
pub mod trade;

pub use account::{Account, BalanceKey, Ledger, LedgerBatch};
pub use asset::{Asset, AssetIndex, AssetRegistry};
pub use config::{ExchangeConfig, ReservationPolicy};
pub use order::{Order, OrderId, Price, Quantity, Side, TraderId};
pub use order_book::{BookSummary, OrderBookSide, PriceLevel};
pub use trade::Trade;

// ============================================================================
// Interfaces Module
// Contains all trait definitions and contracts
// ============================================================================

mod asset_contract;
mod event_handler;
mod matching_algorithm;

pub use asset_contract::{AssetContract, FixedSupplyToken};
pub use event_handler::{
    EventHandler, ExchangeEvent, LoggingEventHandler, NoOpEventHandler, RecordingEventHandler,
};
pub use matching_algorithm::{MatchPlan, MatchingAlgorithm, PlannedFill};

// ============================================================================
// Matching Engine Factory
// Creates matching engines with proper configuration
// ============================================================================

use crate::domain::ExchangeConfig;
use crate::engine::{MatchingEngine, PriceTimePriority};
use crate::error::ExchangeResult;
use crate::interfaces::{EventHandler, MatchingAlgorithm, NoOpEventHandler};
use std::sync::Arc;

// ============================================================================
// Factory Functions
// ============================================================================

/// Creates a price/time matching engine from configuration
///
/// # Example
/// ```
/// use ledger_exchange::prelude::*;
/// use std::sync::Arc;
///
/// let config = ExchangeConfig::strict_reservation();
/// let engine = create_from_config(config, Arc::new(NoOpEventHandler)).unwrap();
/// assert_eq!(engine.open_orders(), 0);
/// ```
pub fn create_from_config(
    config: ExchangeConfig,
    event_handler: Arc<dyn EventHandler>,
) -> ExchangeResult<MatchingEngine> {
    MatchingEngineBuilder::new()
        .config(config)
        .event_handler(event_handler)
        .build()
}

// ============================================================================
// Builder Pattern
// ============================================================================

/// Builder for creating matching engines with fluent API
///
/// # Example
/// ```
/// use ledger_exchange::prelude::*;
/// use std::sync::Arc;
///
/// let engine = MatchingEngineBuilder::new()
///     .config(ExchangeConfig::settled_price().with_registrar("owner"))
///     .event_handler(Arc::new(LoggingEventHandler))
///     .build()
///     .unwrap();
/// assert_eq!(engine.config().reservation, ReservationPolicy::SettledPrice);
/// ```
pub struct MatchingEngineBuilder {
    config: ExchangeConfig,
    algorithm: Option<Box<dyn MatchingAlgorithm>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl MatchingEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig::default(),
            algorithm: None,
            event_handler: None,
        }
    }

    /// Set the exchange configuration
    pub fn config(mut self, config: ExchangeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default price/time algorithm
    pub fn algorithm(mut self, algorithm: Box<dyn MatchingAlgorithm>) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Set the event handler
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the matching engine
    pub fn build(self) -> ExchangeResult<MatchingEngine> {
        let algorithm = self
            .algorithm
            .unwrap_or_else(|| Box::new(PriceTimePriority::new()));
        let event_handler = self
            .event_handler
            .unwrap_or_else(|| Arc::new(NoOpEventHandler));

        MatchingEngine::with_algorithm(self.config, algorithm, event_handler)
    }
}

impl Default for MatchingEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReservationPolicy;
    use crate::error::ExchangeError;

    #[test]
    fn test_builder_defaults() {
        let engine = MatchingEngineBuilder::new().build().unwrap();
        assert_eq!(engine.config().reservation, ReservationPolicy::FullLimit);
        assert_eq!(engine.config().custodian.as_str(), "exchange");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = create_from_config(ExchangeConfig::new(""), Arc::new(NoOpEventHandler));
        assert!(matches!(result, Err(ExchangeError::InvalidConfig(_))));
    }
}

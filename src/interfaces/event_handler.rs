// ============================================================================
// Event Handler Interface
// Notifications for external observers; never read back by the engine
// ============================================================================

use crate::domain::{AssetIndex, OrderId, Price, Quantity, Side, Trade, TraderId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Events emitted by the exchange after a state change is applied
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExchangeEvent {
    CurrencyDeposited {
        trader: TraderId,
        amount: u64,
        timestamp: DateTime<Utc>,
    },

    CurrencyWithdrawn {
        trader: TraderId,
        amount: u64,
        timestamp: DateTime<Utc>,
    },

    AssetRegistered {
        trader: TraderId,
        index: AssetIndex,
        symbol: String,
        timestamp: DateTime<Utc>,
    },

    AssetDeposited {
        trader: TraderId,
        index: AssetIndex,
        symbol: String,
        amount: Quantity,
        timestamp: DateTime<Utc>,
    },

    AssetWithdrawn {
        trader: TraderId,
        index: AssetIndex,
        symbol: String,
        amount: Quantity,
        timestamp: DateTime<Utc>,
    },

    /// One trade leg; carries buyer, seller, symbol, price and quantity
    OrderMatched {
        trade: Trade,
        timestamp: DateTime<Utc>,
    },

    /// Unfilled remainder placed in the book
    OrderBooked {
        order_id: OrderId,
        trader: TraderId,
        symbol: String,
        side: Side,
        price: Price,
        amount: Quantity,
        timestamp: DateTime<Utc>,
    },

    /// Resting order withdrawn by its owner
    OrderCancelled {
        order_id: OrderId,
        trader: TraderId,
        symbol: String,
        side: Side,
        price: Price,
        amount: Quantity,
        timestamp: DateTime<Utc>,
    },
}

/// Event handler trait for processing exchange events
/// Implementations can handle logging, metrics, notifications, etc.
pub trait EventHandler: Send + Sync {
    /// Handle an exchange event
    fn on_event(&self, event: ExchangeEvent);

    /// Batch event handler (optional optimization)
    fn on_events(&self, events: Vec<ExchangeEvent>) {
        for event in events {
            self.on_event(event);
        }
    }
}

/// No-op event handler for testing
pub struct NoOpEventHandler;

impl EventHandler for NoOpEventHandler {
    fn on_event(&self, _event: ExchangeEvent) {}
}

/// Logging event handler
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn on_event(&self, event: ExchangeEvent) {
        tracing::debug!("Exchange event: {:?}", event);
    }
}

/// Keeps every event in memory, in emission order
#[derive(Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<ExchangeEvent>>,
}

impl RecordingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn events(&self) -> Vec<ExchangeEvent> {
        self.events.lock().clone()
    }

    /// Drain the recorded events
    pub fn take(&self) -> Vec<ExchangeEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Trades recorded so far
    pub fn trades(&self) -> Vec<Trade> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ExchangeEvent::OrderMatched { trade, .. } => Some(trade.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventHandler for RecordingEventHandler {
    fn on_event(&self, event: ExchangeEvent) {
        self.events.lock().push(event);
    }

    fn on_events(&self, events: Vec<ExchangeEvent>) {
        self.events.lock().extend(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit(amount: u64) -> ExchangeEvent {
        ExchangeEvent::CurrencyDeposited {
            trader: TraderId::from("alice"),
            amount,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_noop_handler() {
        let handler = NoOpEventHandler;
        handler.on_event(deposit(1));
        // Should not panic
    }

    #[test]
    fn test_recording_handler_keeps_order() {
        let handler = RecordingEventHandler::new();
        handler.on_event(deposit(1));
        handler.on_events(vec![deposit(2), deposit(3)]);

        let amounts: Vec<u64> = handler
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ExchangeEvent::CurrencyDeposited { amount, .. } => Some(amount),
                _ => None,
            })
            .collect();
        assert_eq!(amounts, vec![1, 2, 3]);

        assert_eq!(handler.take().len(), 3);
        assert!(handler.events().is_empty());
        assert!(handler.trades().is_empty());
    }
}

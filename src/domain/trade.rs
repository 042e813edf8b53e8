// ============================================================================
// Trade Domain Model
// ============================================================================

use crate::error::{ExchangeError, ExchangeResult};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{OrderId, Price, Quantity, Side, TraderId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One execution between a resting order and an incoming order
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trade {
    /// Unique trade identifier
    pub id: Uuid,

    /// Asset symbol
    pub symbol: String,

    pub buyer: TraderId,
    pub seller: TraderId,

    /// Order ID of the passive order (resting in book)
    pub maker_order_id: OrderId,

    /// Order ID of the aggressive order (incoming)
    pub taker_order_id: OrderId,

    /// Side of the incoming order
    pub aggressor: Side,

    /// Execution price, always the resting order's price
    pub price: Price,

    /// Executed quantity
    pub quantity: Quantity,

    /// Trade timestamp
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: String,
        buyer: TraderId,
        seller: TraderId,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        aggressor: Side,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol,
            buyer,
            seller,
            maker_order_id,
            taker_order_id,
            aggressor,
            price,
            quantity,
            timestamp: Utc::now(),
        }
    }

    /// Currency exchanged for this trade (price * quantity)
    pub fn notional_value(&self) -> ExchangeResult<u64> {
        self.price
            .checked_mul(self.quantity)
            .ok_or(ExchangeError::Overflow)
    }
}

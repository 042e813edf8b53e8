// ============================================================================
// Order Domain Model
// ============================================================================

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Limit price, in currency units per asset unit
pub type Price = u64;

/// Asset quantity in the smallest indivisible unit
pub type Quantity = u64;

// ============================================================================
// Value Objects
// ============================================================================

/// Exchange-wide order identifier, strictly increasing in submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderId(u64);

impl OrderId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The identifier that follows this one
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Participant identity. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TraderId(Arc<str>);

impl TraderId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TraderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TraderId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl fmt::Display for TraderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Whether a resting order at `book_price` on the opposite side can
    /// trade against an incoming order on this side limited at `limit`.
    pub fn crosses(self, limit: Price, book_price: Price) -> bool {
        match self {
            Side::Buy => book_price <= limit,
            Side::Sell => book_price >= limit,
        }
    }
}

// ============================================================================
// Order Entity
// ============================================================================

/// A limit order. Only the remaining amount changes after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Order {
    pub id: OrderId,
    pub trader: TraderId,
    pub side: Side,
    pub price: Price,
    /// Amount still open
    pub amount: Quantity,
    /// Amount at submission
    pub original_amount: Quantity,
    pub timestamp: DateTime<Utc>,
}

impl Order {
    pub fn new(id: OrderId, trader: TraderId, side: Side, price: Price, amount: Quantity) -> Self {
        Self {
            id,
            trader,
            side,
            price,
            amount,
            original_amount: amount,
            timestamp: Utc::now(),
        }
    }

    pub fn filled_amount(&self) -> Quantity {
        self.original_amount - self.amount
    }

    pub fn is_filled(&self) -> bool {
        self.amount == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_creation() {
        let order = Order::new(OrderId::new(7), TraderId::from("alice"), Side::Buy, 100, 20);

        assert_eq!(order.amount, 20);
        assert_eq!(order.original_amount, 20);
        assert_eq!(order.filled_amount(), 0);
        assert!(!order.is_filled());
        assert_eq!(order.id.to_string(), "#7");
    }

    #[test]
    fn test_side_crossing() {
        // Buy at 100 takes asks at or below 100
        assert!(Side::Buy.crosses(100, 100));
        assert!(Side::Buy.crosses(100, 90));
        assert!(!Side::Buy.crosses(100, 110));

        // Sell at 100 takes bids at or above 100
        assert!(Side::Sell.crosses(100, 100));
        assert!(Side::Sell.crosses(100, 110));
        assert!(!Side::Sell.crosses(100, 90));

        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn test_trader_id_equality() {
        let a = TraderId::from("alice");
        let b = TraderId::from("alice".to_string());
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "alice");
    }
}

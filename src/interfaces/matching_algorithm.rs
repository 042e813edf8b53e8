// ============================================================================
// Matching Algorithm Interface
// Defines the contract for pluggable matching algorithms
// ============================================================================

use crate::domain::{Order, OrderBookSide, OrderId, Price, Quantity, Side, TraderId};
use crate::error::{ExchangeError, ExchangeResult};
use smallvec::SmallVec;
use std::collections::HashMap;

/// One execution an incoming order would make against a resting order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFill {
    pub maker_order_id: OrderId,
    pub maker: TraderId,
    /// Resting order's price; every trade settles here
    pub price: Price,
    pub quantity: Quantity,
    /// The resting order is used up by this fill
    pub exhausts_maker: bool,
}

/// Result of walking the opposite side without touching it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchPlan {
    pub fills: SmallVec<[PlannedFill; 4]>,
    /// Amount left over for the incoming order's own side
    pub remaining: Quantity,
    /// Last level the walk looked at
    pub last_examined: Option<Price>,
}

impl MatchPlan {
    pub fn filled(&self) -> Quantity {
        self.fills.iter().map(|f| f.quantity).sum()
    }

    /// Check the plan against the side it was planned for.
    ///
    /// Every fill must name a live order resting at `fill.price` that
    /// belongs to `fill.maker`, the price must cross `limit`, and no order
    /// may be filled past its remaining amount. `exhausts_maker` must be set
    /// exactly on the fill that uses an order up.
    pub fn validate(
        &self,
        side: Side,
        limit: Price,
        amount: Quantity,
        opposite: &OrderBookSide,
    ) -> ExchangeResult<()> {
        let mut used: HashMap<OrderId, Quantity> = HashMap::new();
        let mut filled: Quantity = 0;

        for fill in &self.fills {
            if fill.quantity == 0 {
                return Err(invalid(format!("empty fill against {}", fill.maker_order_id)));
            }
            if !side.crosses(limit, fill.price) {
                return Err(invalid(format!(
                    "fill at {} does not cross limit {}",
                    fill.price, limit
                )));
            }
            let maker = opposite
                .level(fill.price)
                .and_then(|level| level.orders().find(|o| o.id == fill.maker_order_id))
                .ok_or_else(|| {
                    invalid(format!(
                        "{} is not resting at {}",
                        fill.maker_order_id, fill.price
                    ))
                })?;
            if maker.trader != fill.maker {
                return Err(invalid(format!(
                    "{} belongs to {}, not {}",
                    maker.id, maker.trader, fill.maker
                )));
            }

            let taken = used.entry(maker.id).or_insert(0);
            *taken += fill.quantity;
            if *taken > maker.amount {
                return Err(invalid(format!("{} filled past its remaining amount", maker.id)));
            }
            if fill.exhausts_maker != (*taken == maker.amount) {
                return Err(invalid(format!("{} exhaustion flag is wrong", maker.id)));
            }
            filled += fill.quantity;
        }

        if filled.checked_add(self.remaining) != Some(amount) {
            return Err(invalid(format!(
                "filled {} plus remaining {} is not {}",
                filled, self.remaining, amount
            )));
        }
        Ok(())
    }

    /// Apply the planned fills to the side they were planned against.
    /// The plan must have passed `validate` against that side.
    ///
    /// Returns the resting orders that were used up.
    pub fn execute(&self, opposite: &mut OrderBookSide) -> Vec<Order> {
        let mut exhausted = Vec::new();
        for fill in &self.fills {
            if fill.exhausts_maker {
                if let Some(order) = opposite.remove_order(fill.price, fill.maker_order_id) {
                    exhausted.push(order);
                }
            } else {
                let reduced =
                    opposite.reduce_order(fill.price, fill.maker_order_id, fill.quantity);
                debug_assert!(reduced.is_some(), "validated fill could not be applied");
            }
        }
        if let Some(price) = self.last_examined {
            opposite.touch(price);
        }
        exhausted
    }
}

fn invalid(reason: String) -> ExchangeError {
    ExchangeError::InvalidMatchPlan(reason)
}

/// Strategy pattern interface for matching algorithms
pub trait MatchingAlgorithm: Send + Sync {
    /// Plan how an incoming limit order would trade against the opposite
    /// side of the book. Must not assume anything about balances.
    ///
    /// # Arguments
    /// * `side` - Side of the incoming order
    /// * `limit` - Incoming limit price
    /// * `amount` - Incoming amount
    /// * `opposite` - The opposite side of the order book
    fn plan_match(
        &self,
        side: Side,
        limit: Price,
        amount: Quantity,
        opposite: &OrderBookSide,
    ) -> MatchPlan;

    /// Get the algorithm name for logging
    fn name(&self) -> &str;

    /// Check if a resting price can trade with the incoming limit
    fn prices_cross(&self, side: Side, limit: Price, book_price: Price) -> bool {
        side.crosses(limit, book_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sell(id: u64, trader: &str, amount: Quantity) -> Order {
        Order::new(OrderId::new(id), TraderId::from(trader), Side::Sell, 100, amount)
    }

    fn fill(id: u64, maker: &str, quantity: Quantity, exhausts_maker: bool) -> PlannedFill {
        PlannedFill {
            maker_order_id: OrderId::new(id),
            maker: TraderId::from(maker),
            price: 100,
            quantity,
            exhausts_maker,
        }
    }

    fn asks() -> OrderBookSide {
        let mut asks = OrderBookSide::new(Side::Sell);
        asks.insert(sell(1, "a", 5));
        asks.insert(sell(2, "b", 5));
        asks
    }

    fn plan(fills: Vec<PlannedFill>, remaining: Quantity) -> MatchPlan {
        MatchPlan {
            fills: fills.into_iter().collect(),
            remaining,
            last_examined: Some(100),
        }
    }

    #[test]
    fn test_out_of_queue_fill_applies_to_named_order() {
        let mut asks = asks();
        let plan = plan(vec![fill(2, "b", 2, false)], 0);
        assert!(plan.validate(Side::Buy, 100, 2, &asks).is_ok());

        plan.execute(&mut asks);
        assert_eq!(
            asks.offers_at(100),
            vec![(TraderId::from("a"), 5), (TraderId::from("b"), 3)]
        );
        assert_eq!(asks.total_amount(), 8);
    }

    #[test]
    fn test_validate_rejects_bad_plans() {
        let asks = asks();
        let rejected = |fills: Vec<PlannedFill>, remaining: Quantity, amount: Quantity| {
            matches!(
                plan(fills, remaining).validate(Side::Buy, 100, amount, &asks),
                Err(ExchangeError::InvalidMatchPlan(_))
            )
        };

        // Unknown order, wrong owner
        assert!(rejected(vec![fill(9, "a", 1, false)], 0, 1));
        assert!(rejected(vec![fill(1, "b", 1, false)], 0, 1));
        // Overfill across two fills, wrong exhaustion flags
        assert!(rejected(vec![fill(1, "a", 3, false), fill(1, "a", 3, true)], 0, 6));
        assert!(rejected(vec![fill(1, "a", 5, false)], 0, 5));
        assert!(rejected(vec![fill(1, "a", 2, true)], 0, 2));
        // Quantities that do not add up, empty fill
        assert!(rejected(vec![fill(1, "a", 2, false)], 1, 4));
        assert!(rejected(vec![fill(1, "a", 0, false)], 1, 1));
        // Limit below the resting price
        assert!(matches!(
            plan(vec![fill(1, "a", 1, false)], 0).validate(Side::Buy, 99, 1, &asks),
            Err(ExchangeError::InvalidMatchPlan(_))
        ));

        assert!(plan(vec![fill(1, "a", 2, false), fill(1, "a", 3, true)], 1)
            .validate(Side::Buy, 100, 6, &asks)
            .is_ok());
    }
}

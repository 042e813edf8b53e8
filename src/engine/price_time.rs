// ============================================================================
// Price/Time Priority Matching Algorithm (FIFO)
// ============================================================================

use crate::domain::{OrderBookSide, Price, Quantity, Side};
use crate::interfaces::{MatchPlan, MatchingAlgorithm, PlannedFill};

/// Price/Time Priority (FIFO) matching algorithm
///
/// Levels are visited best price first; inside a level, orders are taken
/// strictly in submission order regardless of size. Every fill is priced
/// at the resting order.
///
/// # Example
/// ```text
/// Book:  100 @ 50 (Order A, first)
///        100 @ 90 (Order B, second)
///
/// Incoming: Buy 100 @ 105
/// Result: 50 from A, then 50 of B's 90; 40 of B left resting
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct PriceTimePriority;

impl PriceTimePriority {
    pub fn new() -> Self {
        Self
    }
}

impl MatchingAlgorithm for PriceTimePriority {
    fn plan_match(
        &self,
        side: Side,
        limit: Price,
        amount: Quantity,
        opposite: &OrderBookSide,
    ) -> MatchPlan {
        let mut plan = MatchPlan {
            remaining: amount,
            ..MatchPlan::default()
        };

        for level in opposite.levels() {
            if plan.remaining == 0 {
                break;
            }
            plan.last_examined = Some(level.price);
            if !self.prices_cross(side, limit, level.price) {
                break;
            }

            for maker in level.orders() {
                if plan.remaining == 0 {
                    break;
                }
                let quantity = plan.remaining.min(maker.amount);
                plan.fills.push(PlannedFill {
                    maker_order_id: maker.id,
                    maker: maker.trader.clone(),
                    price: maker.price,
                    quantity,
                    exhausts_maker: quantity == maker.amount,
                });
                plan.remaining -= quantity;
            }
        }

        plan
    }

    fn name(&self) -> &str {
        "PriceTime"
    }
}

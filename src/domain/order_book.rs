// ============================================================================
// Order Book Domain Model
// ============================================================================

use std::collections::{BTreeMap, VecDeque};

use super::{Order, OrderId, Price, Quantity, Side, TraderId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Price Level
// ============================================================================

/// FIFO queue of resting orders sharing one exact price
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Price,
    orders: VecDeque<Order>,
    /// Sum of the remaining amounts of `orders`
    total_amount: Quantity,
}

impl PriceLevel {
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total_amount: 0,
        }
    }

    /// Append at the tail, behind every order already at this price
    pub fn push_back(&mut self, order: Order) {
        self.total_amount += order.amount;
        self.orders.push_back(order);
    }

    /// Partially fill the order `order_id` in place. The order keeps its
    /// queue position, so `amount` must be strictly below its remaining
    /// amount.
    ///
    /// Returns the order's new remaining amount.
    pub fn reduce(&mut self, order_id: OrderId, amount: Quantity) -> Option<Quantity> {
        let order = self.orders.iter_mut().find(|o| o.id == order_id)?;
        if amount == 0 || amount >= order.amount {
            return None;
        }
        order.amount -= amount;
        self.total_amount -= amount;
        Some(order.amount)
    }

    /// Take an order out of the queue regardless of its position
    pub fn remove(&mut self, order_id: OrderId) -> Option<Order> {
        let position = self.orders.iter().position(|o| o.id == order_id)?;
        let order = self.orders.remove(position)?;
        self.total_amount -= order.amount;
        Some(order)
    }

    pub fn total_amount(&self) -> Quantity {
        self.total_amount
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Orders in matching order, oldest first
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    /// 1-indexed FIFO position lookup
    pub fn get(&self, index: usize) -> Option<&Order> {
        index.checked_sub(1).and_then(|i| self.orders.get(i))
    }
}

// ============================================================================
// Book Summary
// ============================================================================

/// Aggregate view of one side of a book. Zero means "no level".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BookSummary {
    pub best_price: Price,
    pub frontier_price: Price,
    /// Outstanding amount over every level of the side
    pub total_amount: Quantity,
}

impl BookSummary {
    pub fn as_tuple(&self) -> (Price, Price, Quantity) {
        (self.best_price, self.frontier_price, self.total_amount)
    }
}

// ============================================================================
// Order Book Side
// ============================================================================

/// One direction of one asset's book.
///
/// Levels are keyed by price in a `BTreeMap`; iteration runs from the most
/// favourable price (highest bid, lowest ask) outward.
#[derive(Debug, Clone)]
pub struct OrderBookSide {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
    /// Last level reached by an insertion or a matching walk
    frontier: Option<Price>,
    total_amount: Quantity,
}

impl OrderBookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
            frontier: None,
            total_amount: 0,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Queue a resting order behind everything already at its price
    pub fn insert(&mut self, order: Order) {
        debug_assert_eq!(order.side, self.side, "order booked on the wrong side");
        let price = order.price;
        self.total_amount += order.amount;
        self.levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
            .push_back(order);
        self.frontier = Some(price);
    }

    /// Get the best (top-of-book) price
    pub fn best_price(&self) -> Option<Price> {
        self.best_level().map(|level| level.price)
    }

    /// Get the best price level
    pub fn best_level(&self) -> Option<&PriceLevel> {
        match self.side {
            Side::Buy => self.levels.values().next_back(),
            Side::Sell => self.levels.values().next(),
        }
    }

    pub fn frontier_price(&self) -> Option<Price> {
        self.frontier
    }

    pub fn level(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    /// Levels in priority order
    pub fn levels(&self) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match self.side {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        }
    }

    /// Record that a traversal reached the level at `price`. A level that
    /// has since been emptied hands the frontier to the best level.
    pub fn touch(&mut self, price: Price) {
        self.frontier = if self.levels.contains_key(&price) {
            Some(price)
        } else {
            self.best_price()
        };
    }

    /// Partially fill a resting order in place
    pub fn reduce_order(
        &mut self,
        price: Price,
        order_id: OrderId,
        amount: Quantity,
    ) -> Option<Quantity> {
        let remaining = self.levels.get_mut(&price)?.reduce(order_id, amount)?;
        self.total_amount -= amount;
        Some(remaining)
    }

    /// Remove a specific resting order, dropping the level once empty
    pub fn remove_order(&mut self, price: Price, order_id: OrderId) -> Option<Order> {
        let order = self.levels.get_mut(&price)?.remove(order_id)?;
        self.total_amount -= order.amount;
        self.prune(price);
        Some(order)
    }

    pub fn summary(&self) -> BookSummary {
        BookSummary {
            best_price: self.best_price().unwrap_or(0),
            frontier_price: self.frontier.unwrap_or(0),
            total_amount: self.total_amount,
        }
    }

    /// `(trader, amount)` of every order at `price`, oldest first
    pub fn offers_at(&self, price: Price) -> Vec<(TraderId, Quantity)> {
        self.levels
            .get(&price)
            .map(|level| {
                level
                    .orders()
                    .map(|o| (o.trader.clone(), o.amount))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 1-indexed `(first, last)` positions of the orders at `price`;
    /// `(1, 0)` when nothing rests there
    pub fn offers_range(&self, price: Price) -> (usize, usize) {
        (1, self.levels.get(&price).map_or(0, PriceLevel::len))
    }

    pub fn offer_at(&self, price: Price, index: usize) -> Option<(TraderId, Quantity)> {
        self.levels
            .get(&price)?
            .get(index)
            .map(|o| (o.trader.clone(), o.amount))
    }

    /// Get depth at N levels
    pub fn get_depth(&self, num_levels: usize) -> Vec<(Price, Quantity)> {
        self.levels()
            .take(num_levels)
            .map(|level| (level.price, level.total_amount()))
            .collect()
    }

    /// Outstanding amount over every level
    pub fn total_amount(&self) -> Quantity {
        self.total_amount
    }

    /// Currency held against this side's orders (`amount × price` each)
    pub fn reserved_notional(&self) -> u128 {
        self.levels
            .values()
            .map(|level| u128::from(level.total_amount()) * u128::from(level.price))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn prune(&mut self, price: Price) {
        if self.levels.get(&price).is_some_and(PriceLevel::is_empty) {
            self.levels.remove(&price);
            if self.frontier == Some(price) {
                self.frontier = self.best_price();
            }
        }
    }
}

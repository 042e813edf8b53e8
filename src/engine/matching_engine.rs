// ============================================================================
// Matching Engine
// Custody ledger, asset registry and one pair of book sides per asset
// ============================================================================
//
// Every public mutating call follows the same shape: resolve and validate,
// plan the book walk read-only, stage all ledger postings in one batch,
// commit the batch (the last point that can fail), then apply the book
// changes and emit events. A rejected call therefore leaves no trace.

use crate::domain::{
    AssetIndex, AssetRegistry, BalanceKey, BookSummary, ExchangeConfig, Ledger, LedgerBatch,
    Order, OrderBookSide, OrderId, Price, Quantity, ReservationPolicy, Side, Trade, TraderId,
};
use crate::error::{ExchangeError, ExchangeResult};
use crate::interfaces::{
    AssetContract, EventHandler, ExchangeEvent, MatchPlan, MatchingAlgorithm,
};
use chrono::Utc;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::PriceTimePriority;

// ============================================================================
// Order Outcome
// ============================================================================

/// What a buy or sell submission did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderOutcome {
    /// Identifier assigned to the submission
    pub order_id: OrderId,
    pub side: Side,
    pub trades: SmallVec<[Trade; 4]>,
    pub filled_amount: Quantity,
    /// Amount placed in the book under `order_id`
    pub resting_amount: Quantity,
}

impl OrderOutcome {
    /// The resting order's id, or `None` when the order filled immediately
    pub fn resting_order(&self) -> Option<OrderId> {
        (self.resting_amount > 0).then_some(self.order_id)
    }

    pub fn is_filled(&self) -> bool {
        self.resting_amount == 0
    }
}

// ============================================================================
// Custody Totals
// ============================================================================

/// Flows across the exchange boundary, for conservation checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustodyTotals {
    pub currency_deposited: u128,
    pub currency_withdrawn: u128,
    /// Price improvement kept under `ReservationPolicy::FullLimit`
    pub currency_retained: u128,
    assets_deposited: HashMap<AssetIndex, u128>,
    assets_withdrawn: HashMap<AssetIndex, u128>,
}

impl CustodyTotals {
    pub fn currency_held(&self) -> u128 {
        self.currency_deposited - self.currency_withdrawn
    }

    pub fn asset_held(&self, index: AssetIndex) -> u128 {
        self.assets_deposited.get(&index).copied().unwrap_or(0)
            - self.assets_withdrawn.get(&index).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
struct AssetBook {
    bids: OrderBookSide,
    asks: OrderBookSide,
}

impl AssetBook {
    fn new() -> Self {
        Self {
            bids: OrderBookSide::new(Side::Buy),
            asks: OrderBookSide::new(Side::Sell),
        }
    }

    fn side(&self, side: Side) -> &OrderBookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut OrderBookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }
}

/// Where a resting order lives
#[derive(Debug, Clone, Copy)]
struct OrderLocation {
    asset: AssetIndex,
    side: Side,
    price: Price,
}

// ============================================================================
// Matching Engine
// ============================================================================

/// Sequential exchange state machine.
///
/// Owns the registry, the ledger and every book. Calls take `&mut self`, so
/// exclusive access is enforced by the borrow checker; see
/// [`SharedExchange`](super::SharedExchange) and
/// [`Sequencer`](super::Sequencer) for multi-threaded use.
pub struct MatchingEngine {
    config: ExchangeConfig,
    registry: AssetRegistry,
    ledger: Ledger,
    books: HashMap<AssetIndex, AssetBook>,

    /// Pluggable matching algorithm
    algorithm: Box<dyn MatchingAlgorithm>,

    /// Resting order index for cancellation and lookup
    order_index: HashMap<OrderId, OrderLocation>,

    /// Event handler for processing events
    event_handler: Arc<dyn EventHandler>,

    next_order_id: OrderId,
    custody: CustodyTotals,
}

impl MatchingEngine {
    /// Create a new engine with price/time matching
    pub fn new(config: ExchangeConfig, event_handler: Arc<dyn EventHandler>) -> ExchangeResult<Self> {
        Self::with_algorithm(config, Box::new(PriceTimePriority::new()), event_handler)
    }

    pub fn with_algorithm(
        config: ExchangeConfig,
        algorithm: Box<dyn MatchingAlgorithm>,
        event_handler: Arc<dyn EventHandler>,
    ) -> ExchangeResult<Self> {
        config.validate().map_err(ExchangeError::InvalidConfig)?;
        debug!(
            "Creating matching engine (algorithm: {}, reservation: {:?})",
            algorithm.name(),
            config.reservation
        );

        Ok(Self {
            registry: AssetRegistry::new(config.max_symbol_len),
            config,
            ledger: Ledger::new(),
            books: HashMap::new(),
            algorithm,
            order_index: HashMap::new(),
            event_handler,
            next_order_id: OrderId::new(1),
            custody: CustodyTotals::default(),
        })
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    // ========================================================================
    // Asset registration
    // ========================================================================

    pub fn register(
        &mut self,
        trader: &TraderId,
        symbol: &str,
        contract: Arc<dyn AssetContract>,
    ) -> ExchangeResult<AssetIndex> {
        if let Some(registrar) = &self.config.registrar {
            if registrar != trader {
                return Err(rejected(
                    "register",
                    ExchangeError::Unauthorized {
                        trader: trader.to_string(),
                    },
                ));
            }
        }

        let index = self
            .registry
            .register(symbol, contract)
            .map_err(|e| rejected("register", e))?;
        self.books.insert(index, AssetBook::new());

        info!("Registered asset {} at index {}", symbol, index);
        self.emit(vec![ExchangeEvent::AssetRegistered {
            trader: trader.clone(),
            index,
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
        }]);
        Ok(index)
    }

    pub fn is_registered(&self, symbol: &str) -> bool {
        self.registry.is_registered(symbol)
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    // ========================================================================
    // Currency custody
    // ========================================================================

    pub fn deposit_currency(&mut self, trader: &TraderId, amount: u64) -> ExchangeResult<()> {
        positive(amount, "deposit amount must be positive")
            .and_then(|_| self.ledger.credit_currency(trader, amount))
            .map_err(|e| rejected("deposit_currency", e))?;
        self.custody.currency_deposited += u128::from(amount);

        debug!("{} deposited {} currency", trader, amount);
        self.emit(vec![ExchangeEvent::CurrencyDeposited {
            trader: trader.clone(),
            amount,
            timestamp: Utc::now(),
        }]);
        Ok(())
    }

    pub fn withdraw_currency(&mut self, trader: &TraderId, amount: u64) -> ExchangeResult<()> {
        positive(amount, "withdrawal amount must be positive")
            .and_then(|_| self.ledger.debit_currency(trader, amount))
            .map_err(|e| rejected("withdraw_currency", e))?;
        self.custody.currency_withdrawn += u128::from(amount);

        debug!("{} withdrew {} currency", trader, amount);
        self.emit(vec![ExchangeEvent::CurrencyWithdrawn {
            trader: trader.clone(),
            amount,
            timestamp: Utc::now(),
        }]);
        Ok(())
    }

    pub fn currency_balance_of(&self, trader: &TraderId) -> u64 {
        self.ledger.currency_balance(trader)
    }

    // ========================================================================
    // Asset custody
    // ========================================================================

    /// Pull `amount` of `symbol` from the trader's external holdings. The
    /// trader must have authorized the custodian on the asset contract.
    pub fn deposit_asset(
        &mut self,
        trader: &TraderId,
        symbol: &str,
        amount: Quantity,
    ) -> ExchangeResult<()> {
        let index = self
            .try_deposit_asset(trader, symbol, amount)
            .map_err(|e| rejected("deposit_asset", e))?;

        debug!("{} deposited {} {}", trader, amount, symbol);
        self.emit(vec![ExchangeEvent::AssetDeposited {
            trader: trader.clone(),
            index,
            symbol: symbol.to_string(),
            amount,
            timestamp: Utc::now(),
        }]);
        Ok(())
    }

    fn try_deposit_asset(
        &mut self,
        trader: &TraderId,
        symbol: &str,
        amount: Quantity,
    ) -> ExchangeResult<AssetIndex> {
        self.ensure_not_custodian(trader)?;
        positive(amount, "deposit amount must be positive")?;
        let asset = self.registry.resolve(symbol)?;
        let index = asset.index;

        self.ledger
            .asset_balance(trader, index)
            .checked_add(amount)
            .ok_or(ExchangeError::Overflow)?;
        asset
            .contract
            .transfer_in(trader, &self.config.custodian, amount)?;

        self.ledger.credit_asset(trader, index, amount)?;
        *self.custody.assets_deposited.entry(index).or_default() += u128::from(amount);
        Ok(index)
    }

    /// Push `amount` of `symbol` out of custody to the trader
    pub fn withdraw_asset(
        &mut self,
        trader: &TraderId,
        symbol: &str,
        amount: Quantity,
    ) -> ExchangeResult<()> {
        let index = self
            .try_withdraw_asset(trader, symbol, amount)
            .map_err(|e| rejected("withdraw_asset", e))?;

        debug!("{} withdrew {} {}", trader, amount, symbol);
        self.emit(vec![ExchangeEvent::AssetWithdrawn {
            trader: trader.clone(),
            index,
            symbol: symbol.to_string(),
            amount,
            timestamp: Utc::now(),
        }]);
        Ok(())
    }

    fn try_withdraw_asset(
        &mut self,
        trader: &TraderId,
        symbol: &str,
        amount: Quantity,
    ) -> ExchangeResult<AssetIndex> {
        self.ensure_not_custodian(trader)?;
        positive(amount, "withdrawal amount must be positive")?;
        let asset = self.registry.resolve(symbol)?;
        let index = asset.index;

        let available = self.ledger.asset_balance(trader, index);
        if available < amount {
            return Err(ExchangeError::InsufficientAsset {
                required: amount,
                available,
            });
        }
        asset
            .contract
            .transfer_out(&self.config.custodian, trader, amount)?;

        self.ledger.debit_asset(trader, index, amount)?;
        *self.custody.assets_withdrawn.entry(index).or_default() += u128::from(amount);
        Ok(index)
    }

    pub fn asset_balance_of(&self, symbol: &str, trader: &TraderId) -> ExchangeResult<Quantity> {
        let index = self.registry.resolve(symbol)?.index;
        Ok(self.ledger.asset_balance(trader, index))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn custody(&self) -> &CustodyTotals {
        &self.custody
    }

    // ========================================================================
    // Order submission
    // ========================================================================

    /// Buy up to `amount` of `symbol` paying at most `price` per unit
    pub fn buy(
        &mut self,
        trader: &TraderId,
        symbol: &str,
        amount: Quantity,
        price: Price,
    ) -> ExchangeResult<OrderOutcome> {
        self.submit(trader, symbol, Side::Buy, amount, price)
    }

    /// Sell up to `amount` of `symbol` receiving at least `price` per unit
    pub fn sell(
        &mut self,
        trader: &TraderId,
        symbol: &str,
        amount: Quantity,
        price: Price,
    ) -> ExchangeResult<OrderOutcome> {
        self.submit(trader, symbol, Side::Sell, amount, price)
    }

    pub fn submit(
        &mut self,
        trader: &TraderId,
        symbol: &str,
        side: Side,
        amount: Quantity,
        limit: Price,
    ) -> ExchangeResult<OrderOutcome> {
        let result = self.try_submit(trader, symbol, side, amount, limit);
        if let Err(err) = &result {
            warn!(
                "Rejected {:?} {} {} @ {} from {}: {}",
                side, amount, symbol, limit, trader, err
            );
        }
        result
    }

    fn try_submit(
        &mut self,
        trader: &TraderId,
        symbol: &str,
        side: Side,
        amount: Quantity,
        limit: Price,
    ) -> ExchangeResult<OrderOutcome> {
        self.ensure_not_custodian(trader)?;
        positive(amount, "order amount must be positive")?;
        positive(limit, "order price must be positive")?;
        let asset = self.registry.resolve(symbol)?;
        let index = asset.index;
        let symbol = asset.symbol.clone();
        let reserve = amount.checked_mul(limit).ok_or(ExchangeError::Overflow)?;

        let book = self
            .books
            .get_mut(&index)
            .ok_or_else(|| ExchangeError::UnknownAsset {
                symbol: symbol.clone(),
            })?;
        let plan = self
            .algorithm
            .plan_match(side, limit, amount, book.side(side.opposite()));
        plan.validate(side, limit, amount, book.side(side.opposite()))?;

        let order = OrderRequest {
            trader,
            asset: index,
            side,
            amount,
            limit,
            reserve,
        };
        let (batch, retained) = stage_postings(&self.ledger, self.config.reservation, &order, &plan)?;
        self.ledger.commit(batch)?;

        // Nothing below can fail
        let order_id = self.next_order_id;
        self.next_order_id = order_id.next();
        self.custody.currency_retained += retained;

        let mut events = Vec::with_capacity(plan.fills.len() + 1);
        for exhausted in plan.execute(book.side_mut(side.opposite())) {
            self.order_index.remove(&exhausted.id);
        }

        let trades: SmallVec<[Trade; 4]> = plan
            .fills
            .iter()
            .map(|fill| {
                let (buyer, seller) = match side {
                    Side::Buy => (trader.clone(), fill.maker.clone()),
                    Side::Sell => (fill.maker.clone(), trader.clone()),
                };
                Trade::new(
                    symbol.clone(),
                    buyer,
                    seller,
                    fill.maker_order_id,
                    order_id,
                    side,
                    fill.price,
                    fill.quantity,
                )
            })
            .collect();
        for trade in &trades {
            debug!(
                "Trade {} {} @ {} ({} <- {})",
                trade.symbol, trade.quantity, trade.price, trade.buyer, trade.seller
            );
            events.push(ExchangeEvent::OrderMatched {
                trade: trade.clone(),
                timestamp: trade.timestamp,
            });
        }

        if plan.remaining > 0 {
            book.side_mut(side)
                .insert(Order::new(order_id, trader.clone(), side, limit, plan.remaining));
            self.order_index.insert(
                order_id,
                OrderLocation {
                    asset: index,
                    side,
                    price: limit,
                },
            );

            info!(
                "Booked {:?} {} {} {} @ {} for {}",
                side, order_id, plan.remaining, symbol, limit, trader
            );
            events.push(ExchangeEvent::OrderBooked {
                order_id,
                trader: trader.clone(),
                symbol: symbol.clone(),
                side,
                price: limit,
                amount: plan.remaining,
                timestamp: Utc::now(),
            });
        }

        self.emit(events);

        Ok(OrderOutcome {
            order_id,
            side,
            filled_amount: amount - plan.remaining,
            resting_amount: plan.remaining,
            trades,
        })
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Withdraw a resting order and refund what it still holds
    pub fn cancel(&mut self, trader: &TraderId, order_id: OrderId) -> ExchangeResult<Order> {
        let result = self.try_cancel(trader, order_id);
        if let Err(err) = &result {
            warn!("Rejected cancel of {} from {}: {}", order_id, trader, err);
        }
        result
    }

    fn try_cancel(&mut self, trader: &TraderId, order_id: OrderId) -> ExchangeResult<Order> {
        let location = *self
            .order_index
            .get(&order_id)
            .ok_or(ExchangeError::OrderNotFound(order_id))?;
        let (owner, remaining) = self
            .order(order_id)
            .map(|o| (o.trader.clone(), o.amount))
            .ok_or(ExchangeError::OrderNotFound(order_id))?;
        if &owner != trader {
            return Err(ExchangeError::NotOrderOwner {
                order_id,
                trader: trader.to_string(),
            });
        }
        let symbol = self
            .registry
            .get(location.asset)
            .map(|a| a.symbol.clone())
            .ok_or(ExchangeError::OrderNotFound(order_id))?;

        let mut batch = LedgerBatch::new();
        match location.side {
            Side::Buy => batch.credit(
                trader,
                BalanceKey::Currency,
                notional(remaining, location.price)?,
            ),
            Side::Sell => batch.credit(trader, BalanceKey::Asset(location.asset), remaining),
        };
        self.ledger.commit(batch)?;

        let order = self
            .books
            .get_mut(&location.asset)
            .and_then(|book| {
                book.side_mut(location.side)
                    .remove_order(location.price, order_id)
            })
            .ok_or(ExchangeError::OrderNotFound(order_id))?;
        self.order_index.remove(&order_id);

        info!("Cancelled {} ({} {} @ {})", order_id, order.amount, symbol, order.price);
        self.emit(vec![ExchangeEvent::OrderCancelled {
            order_id,
            trader: trader.clone(),
            symbol,
            side: order.side,
            price: order.price,
            amount: order.amount,
            timestamp: Utc::now(),
        }]);
        Ok(order)
    }

    // ========================================================================
    // Book inspection
    // ========================================================================

    pub fn book_side(&self, symbol: &str, side: Side) -> ExchangeResult<&OrderBookSide> {
        let index = self.registry.resolve(symbol)?.index;
        self.books
            .get(&index)
            .map(|book| book.side(side))
            .ok_or_else(|| ExchangeError::UnknownAsset {
                symbol: symbol.to_string(),
            })
    }

    pub fn buy_book_summary(&self, symbol: &str) -> ExchangeResult<BookSummary> {
        Ok(self.book_side(symbol, Side::Buy)?.summary())
    }

    pub fn sell_book_summary(&self, symbol: &str) -> ExchangeResult<BookSummary> {
        Ok(self.book_side(symbol, Side::Sell)?.summary())
    }

    pub fn buy_offers_range(&self, symbol: &str, price: Price) -> ExchangeResult<(usize, usize)> {
        Ok(self.book_side(symbol, Side::Buy)?.offers_range(price))
    }

    pub fn sell_offers_range(&self, symbol: &str, price: Price) -> ExchangeResult<(usize, usize)> {
        Ok(self.book_side(symbol, Side::Sell)?.offers_range(price))
    }

    pub fn buy_offer_at(
        &self,
        symbol: &str,
        price: Price,
        index: usize,
    ) -> ExchangeResult<Option<(TraderId, Quantity)>> {
        Ok(self.book_side(symbol, Side::Buy)?.offer_at(price, index))
    }

    pub fn sell_offer_at(
        &self,
        symbol: &str,
        price: Price,
        index: usize,
    ) -> ExchangeResult<Option<(TraderId, Quantity)>> {
        Ok(self.book_side(symbol, Side::Sell)?.offer_at(price, index))
    }

    /// Every `(trader, amount)` at one price, oldest first
    pub fn offers_at(
        &self,
        symbol: &str,
        side: Side,
        price: Price,
    ) -> ExchangeResult<Vec<(TraderId, Quantity)>> {
        Ok(self.book_side(symbol, side)?.offers_at(price))
    }

    /// Top `levels` price levels as `(price, total amount)`
    pub fn depth(
        &self,
        symbol: &str,
        side: Side,
        levels: usize,
    ) -> ExchangeResult<Vec<(Price, Quantity)>> {
        Ok(self.book_side(symbol, side)?.get_depth(levels))
    }

    /// Look up a resting order
    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        let location = self.order_index.get(&order_id)?;
        self.books
            .get(&location.asset)?
            .side(location.side)
            .level(location.price)?
            .orders()
            .find(|o| o.id == order_id)
    }

    pub fn open_orders(&self) -> usize {
        self.order_index.len()
    }

    // ========================================================================
    // Private methods
    // ========================================================================

    /// The custodian's token holdings back every ledger balance, so it
    /// cannot also appear in the ledger as a participant
    fn ensure_not_custodian(&self, trader: &TraderId) -> ExchangeResult<()> {
        if trader == &self.config.custodian {
            return Err(ExchangeError::CustodianAccount {
                trader: trader.to_string(),
            });
        }
        Ok(())
    }

    fn emit(&self, events: Vec<ExchangeEvent>) {
        if !events.is_empty() {
            self.event_handler.on_events(events);
        }
    }
}

/// A validated submission, before it touches the ledger
struct OrderRequest<'a> {
    trader: &'a TraderId,
    asset: AssetIndex,
    side: Side,
    amount: Quantity,
    limit: Price,
    /// `amount × limit`
    reserve: u64,
}

/// Every balance change of a submission, plus the currency the exchange
/// keeps from price improvement
fn stage_postings(
    ledger: &Ledger,
    reservation: ReservationPolicy,
    order: &OrderRequest<'_>,
    plan: &MatchPlan,
) -> ExchangeResult<(LedgerBatch, u128)> {
    let trader = order.trader;
    let asset = BalanceKey::Asset(order.asset);
    let mut batch = LedgerBatch::new();
    let mut retained = 0u128;

    match order.side {
        Side::Buy => {
            let available = ledger.currency_balance(trader);
            if available < order.reserve {
                return Err(ExchangeError::InsufficientCurrency {
                    required: order.reserve,
                    available,
                });
            }

            let mut settled = 0u64;
            for fill in &plan.fills {
                settled = settled
                    .checked_add(notional(fill.quantity, fill.price)?)
                    .ok_or(ExchangeError::Overflow)?;
            }
            let charged = match reservation {
                ReservationPolicy::FullLimit => {
                    let filled = order.amount - plan.remaining;
                    retained = u128::from(notional(filled, order.limit)?) - u128::from(settled);
                    order.reserve
                }
                ReservationPolicy::SettledPrice => settled
                    .checked_add(notional(plan.remaining, order.limit)?)
                    .ok_or(ExchangeError::Overflow)?,
            };

            batch.debit(trader, BalanceKey::Currency, charged);
            for fill in &plan.fills {
                batch
                    .credit(&fill.maker, BalanceKey::Currency, notional(fill.quantity, fill.price)?)
                    .credit(trader, asset, fill.quantity);
            }
        }
        Side::Sell => {
            let available = ledger.balance(trader, asset);
            if available < order.amount {
                return Err(ExchangeError::InsufficientAsset {
                    required: order.amount,
                    available,
                });
            }

            batch.debit(trader, asset, order.amount);
            for fill in &plan.fills {
                batch
                    .credit(&fill.maker, asset, fill.quantity)
                    .credit(trader, BalanceKey::Currency, notional(fill.quantity, fill.price)?);
            }
        }
    }

    Ok((batch, retained))
}

fn positive(value: u64, reason: &'static str) -> ExchangeResult<()> {
    if value == 0 {
        Err(ExchangeError::InvalidQuantity(reason))
    } else {
        Ok(())
    }
}

fn notional(quantity: Quantity, price: Price) -> ExchangeResult<u64> {
    quantity.checked_mul(price).ok_or(ExchangeError::Overflow)
}

fn rejected(operation: &str, err: ExchangeError) -> ExchangeError {
    warn!("Rejected {}: {}", operation, err);
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContractError;
    use crate::engine::MatchingEngineBuilder;
    use crate::interfaces::{
        FixedSupplyToken, NoOpEventHandler, PlannedFill, RecordingEventHandler,
    };

    fn trader(name: &str) -> TraderId {
        TraderId::from(name)
    }

    /// Engine with FAB registered by "owner", who holds 1000 FAB in custody
    fn setup(config: ExchangeConfig) -> (MatchingEngine, Arc<FixedSupplyToken>) {
        let mut engine = MatchingEngine::new(config, Arc::new(NoOpEventHandler)).unwrap();
        let owner = trader("owner");
        let token = Arc::new(FixedSupplyToken::new(owner.clone()));
        engine.register(&owner, "FAB", token.clone()).unwrap();
        token.authorize(&owner, &engine.config().custodian, 1_000);
        engine.deposit_asset(&owner, "FAB", 1_000).unwrap();
        (engine, token)
    }

    #[test]
    fn test_register_assigns_sequential_indices() {
        let (mut engine, _) = setup(ExchangeConfig::default());
        let owner = trader("owner");
        let second = engine
            .register(&owner, "ABC", Arc::new(FixedSupplyToken::new(owner.clone())))
            .unwrap();

        assert_eq!(engine.registry().resolve("FAB").unwrap().index.value(), 1);
        assert_eq!(second.value(), 2);
        assert!(engine.is_registered("ABC"));

        let err = engine
            .register(&owner, "FAB", Arc::new(FixedSupplyToken::new(owner.clone())))
            .unwrap_err();
        assert!(matches!(err, ExchangeError::AlreadyRegistered { .. }));
    }

    #[test]
    fn test_registrar_enforced() {
        let mut engine = MatchingEngine::new(
            ExchangeConfig::default().with_registrar("owner"),
            Arc::new(NoOpEventHandler),
        )
        .unwrap();
        let mallory = trader("mallory");

        let err = engine
            .register(&mallory, "FAB", Arc::new(FixedSupplyToken::new(mallory.clone())))
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Unauthorized { .. }));
        assert!(!engine.is_registered("FAB"));
    }

    #[test]
    fn test_currency_deposit_and_withdraw() {
        let (mut engine, _) = setup(ExchangeConfig::default());
        let alice = trader("alice");

        engine.deposit_currency(&alice, 500).unwrap();
        engine.withdraw_currency(&alice, 200).unwrap();
        assert_eq!(engine.currency_balance_of(&alice), 300);

        let err = engine.withdraw_currency(&alice, 301).unwrap_err();
        assert_eq!(
            err,
            ExchangeError::InsufficientCurrency {
                required: 301,
                available: 300
            }
        );
        assert_eq!(engine.currency_balance_of(&alice), 300);

        assert!(matches!(
            engine.deposit_currency(&alice, 0),
            Err(ExchangeError::InvalidQuantity(_))
        ));
        assert_eq!(engine.custody().currency_held(), 300);
    }

    #[test]
    fn test_asset_deposit_requires_allowance() {
        let (mut engine, token) = setup(ExchangeConfig::default());
        let owner = trader("owner");

        let err = engine.deposit_asset(&owner, "FAB", 10).unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Contract(ContractError::InsufficientAllowance { .. })
        ));
        assert_eq!(engine.asset_balance_of("FAB", &owner).unwrap(), 1_000);
        assert_eq!(token.balance_of(&owner), FixedSupplyToken::DEFAULT_SUPPLY - 1_000);
    }

    #[test]
    fn test_asset_withdraw_returns_to_holder() {
        let (mut engine, token) = setup(ExchangeConfig::default());
        let owner = trader("owner");

        engine.withdraw_asset(&owner, "FAB", 400).unwrap();
        assert_eq!(engine.asset_balance_of("FAB", &owner).unwrap(), 600);
        assert_eq!(token.balance_of(&owner), FixedSupplyToken::DEFAULT_SUPPLY - 600);
        assert_eq!(token.balance_of(&engine.config().custodian), 600);

        let err = engine.withdraw_asset(&owner, "FAB", 601).unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientAsset { .. }));
    }

    #[test]
    fn test_rejected_sell_leaves_no_trace() {
        let (mut engine, _) = setup(ExchangeConfig::default());
        let alice = trader("alice");
        engine.deposit_currency(&alice, 1_000).unwrap();
        engine.buy(&alice, "FAB", 5, 100).unwrap();

        let err = engine.sell(&trader("bob"), "FAB", 5, 100).unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientAsset { .. }));
        assert_eq!(engine.buy_book_summary("FAB").unwrap().as_tuple(), (100, 100, 5));
        assert_eq!(engine.currency_balance_of(&trader("bob")), 0);

        // The rejected call consumed no order id
        let next = engine.sell(&trader("owner"), "FAB", 1, 200).unwrap();
        assert_eq!(next.order_id, OrderId::new(2));
    }

    #[test]
    fn test_rejected_buy_does_not_match() {
        let (mut engine, _) = setup(ExchangeConfig::default());
        let owner = trader("owner");
        let bob = trader("bob");
        engine.sell(&owner, "FAB", 10, 50).unwrap();
        engine.deposit_currency(&bob, 499).unwrap();

        let err = engine.buy(&bob, "FAB", 10, 50).unwrap_err();
        assert_eq!(
            err,
            ExchangeError::InsufficientCurrency {
                required: 500,
                available: 499
            }
        );
        assert_eq!(engine.sell_book_summary("FAB").unwrap().as_tuple(), (50, 50, 10));
        assert_eq!(engine.currency_balance_of(&owner), 0);
        assert_eq!(engine.asset_balance_of("FAB", &bob).unwrap(), 0);
    }

    #[test]
    fn test_invalid_orders() {
        let (mut engine, _) = setup(ExchangeConfig::default());
        let owner = trader("owner");

        assert!(matches!(
            engine.sell(&owner, "FAB", 0, 10),
            Err(ExchangeError::InvalidQuantity(_))
        ));
        assert!(matches!(
            engine.sell(&owner, "FAB", 10, 0),
            Err(ExchangeError::InvalidQuantity(_))
        ));
        assert!(matches!(
            engine.sell(&owner, "XYZ", 10, 10),
            Err(ExchangeError::UnknownAsset { .. })
        ));
        assert_eq!(
            engine.buy(&owner, "FAB", u64::MAX, 2).unwrap_err(),
            ExchangeError::Overflow
        );
        assert_eq!(engine.open_orders(), 0);
    }

    #[test]
    fn test_price_improvement_retained_under_full_limit() {
        let (mut engine, _) = setup(ExchangeConfig::default());
        let owner = trader("owner");
        let bob = trader("bob");
        engine.sell(&owner, "FAB", 10, 90).unwrap();
        engine.deposit_currency(&bob, 1_000).unwrap();

        let outcome = engine.buy(&bob, "FAB", 10, 100).unwrap();
        assert!(outcome.is_filled());
        assert_eq!(outcome.resting_order(), None);
        assert_eq!(outcome.trades[0].price, 90);

        assert_eq!(engine.currency_balance_of(&owner), 900);
        assert_eq!(engine.currency_balance_of(&bob), 0);
        assert_eq!(engine.asset_balance_of("FAB", &bob).unwrap(), 10);
        assert_eq!(engine.custody().currency_retained, 100);
    }

    #[test]
    fn test_settled_price_charges_fill_price() {
        let (mut engine, _) = setup(ExchangeConfig::settled_price());
        let owner = trader("owner");
        let bob = trader("bob");
        engine.sell(&owner, "FAB", 10, 90).unwrap();
        engine.deposit_currency(&bob, 1_500).unwrap();

        let outcome = engine.buy(&bob, "FAB", 15, 100).unwrap();
        assert_eq!(outcome.filled_amount, 10);
        assert_eq!(outcome.resting_amount, 5);

        // 10 × 90 settled plus 5 × 100 reserved
        assert_eq!(engine.currency_balance_of(&bob), 1_500 - 900 - 500);
        assert_eq!(engine.custody().currency_retained, 0);
    }

    #[test]
    fn test_cancel_refunds_reservation() {
        let (mut engine, _) = setup(ExchangeConfig::default());
        let owner = trader("owner");
        let alice = trader("alice");
        engine.deposit_currency(&alice, 1_000).unwrap();

        let bid = engine.buy(&alice, "FAB", 4, 100).unwrap().order_id;
        let ask = engine.sell(&owner, "FAB", 7, 300).unwrap().order_id;
        assert_eq!(engine.currency_balance_of(&alice), 600);
        assert_eq!(engine.order(bid).map(|o| o.amount), Some(4));

        assert_eq!(
            engine.cancel(&owner, bid).unwrap_err(),
            ExchangeError::NotOrderOwner {
                order_id: bid,
                trader: "owner".to_string()
            }
        );

        let cancelled = engine.cancel(&alice, bid).unwrap();
        assert_eq!(cancelled.amount, 4);
        assert_eq!(engine.currency_balance_of(&alice), 1_000);
        assert_eq!(engine.buy_book_summary("FAB").unwrap().as_tuple(), (0, 0, 0));
        assert!(engine.order(bid).is_none());

        engine.cancel(&owner, ask).unwrap();
        assert_eq!(engine.asset_balance_of("FAB", &owner).unwrap(), 1_000);
        assert_eq!(
            engine.cancel(&owner, ask).unwrap_err(),
            ExchangeError::OrderNotFound(ask)
        );
        assert_eq!(engine.open_orders(), 0);
    }

    #[test]
    fn test_partially_filled_order_cancels_remainder() {
        let (mut engine, _) = setup(ExchangeConfig::default());
        let owner = trader("owner");
        let alice = trader("alice");
        engine.deposit_currency(&alice, 1_000).unwrap();

        let ask = engine.sell(&owner, "FAB", 10, 50).unwrap().order_id;
        engine.buy(&alice, "FAB", 4, 50).unwrap();
        assert_eq!(engine.order(ask).map(|o| o.filled_amount()), Some(4));

        let cancelled = engine.cancel(&owner, ask).unwrap();
        assert_eq!(cancelled.amount, 6);
        assert_eq!(engine.asset_balance_of("FAB", &owner).unwrap(), 996);
        assert_eq!(engine.currency_balance_of(&owner), 200);
    }

    #[test]
    fn test_events_follow_state_changes() {
        let recorder = Arc::new(RecordingEventHandler::new());
        let mut engine = MatchingEngine::new(ExchangeConfig::default(), recorder.clone()).unwrap();
        let owner = trader("owner");
        let alice = trader("alice");
        let token = Arc::new(FixedSupplyToken::new(owner.clone()));
        engine.register(&owner, "FAB", token.clone()).unwrap();
        token.authorize(&owner, &engine.config().custodian, 10);
        engine.deposit_asset(&owner, "FAB", 10).unwrap();
        engine.deposit_currency(&alice, 1_000).unwrap();
        engine.sell(&owner, "FAB", 10, 20).unwrap();
        recorder.take();

        let _ = engine.buy(&alice, "FAB", 100, 20);
        assert!(recorder.take().is_empty());

        engine.buy(&alice, "FAB", 15, 20).unwrap();
        let events = recorder.take();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            ExchangeEvent::OrderMatched { trade, .. } if trade.quantity == 10 && trade.seller == owner
        ));
        assert!(matches!(
            &events[1],
            ExchangeEvent::OrderBooked { amount: 5, side: Side::Buy, .. }
        ));
    }

    #[test]
    fn test_depth_and_offers() {
        let (mut engine, _) = setup(ExchangeConfig::default());
        let owner = trader("owner");
        engine.sell(&owner, "FAB", 10, 120).unwrap();
        engine.sell(&owner, "FAB", 20, 110).unwrap();
        engine.sell(&owner, "FAB", 30, 110).unwrap();

        assert_eq!(
            engine.depth("FAB", Side::Sell, 5).unwrap(),
            vec![(110, 50), (120, 10)]
        );
        assert_eq!(engine.sell_offers_range("FAB", 110).unwrap(), (1, 2));
        assert_eq!(
            engine.sell_offer_at("FAB", 110, 2).unwrap(),
            Some((owner.clone(), 30))
        );
        assert_eq!(engine.sell_offer_at("FAB", 110, 3).unwrap(), None);
        assert_eq!(engine.buy_offers_range("FAB", 110).unwrap(), (1, 0));
        assert_eq!(engine.buy_offer_at("FAB", 110, 1).unwrap(), None);
    }

    #[test]
    fn test_custodian_cannot_hold_or_trade() {
        let (mut engine, token) = setup(ExchangeConfig::default());
        let custodian = engine.config().custodian.clone();
        let index = engine.registry().resolve("FAB").unwrap().index;

        // Self-transfer would move no tokens
        token.authorize(&custodian, &custodian, 100);
        let err = engine.deposit_asset(&custodian, "FAB", 100).unwrap_err();
        assert!(matches!(err, ExchangeError::CustodianAccount { .. }));
        assert_eq!(
            engine.ledger().total_asset(index),
            u128::from(token.balance_of(&custodian))
        );

        assert!(matches!(
            engine.withdraw_asset(&custodian, "FAB", 1),
            Err(ExchangeError::CustodianAccount { .. })
        ));
        assert!(matches!(
            engine.sell(&custodian, "FAB", 1, 10),
            Err(ExchangeError::CustodianAccount { .. })
        ));
        assert_eq!(engine.open_orders(), 0);
    }

    /// Takes the newest order of each crossing level first
    struct NewestFirst;

    impl MatchingAlgorithm for NewestFirst {
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
                if plan.remaining == 0 || !side.crosses(limit, level.price) {
                    break;
                }
                plan.last_examined = Some(level.price);
                let orders: Vec<&Order> = level.orders().collect();
                for maker in orders.into_iter().rev() {
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
            "NewestFirst"
        }
    }

    /// Claims the whole amount from the best order, whatever it holds
    struct Overfill;

    impl MatchingAlgorithm for Overfill {
        fn plan_match(
            &self,
            _side: Side,
            _limit: Price,
            amount: Quantity,
            opposite: &OrderBookSide,
        ) -> MatchPlan {
            let mut plan = MatchPlan {
                remaining: amount,
                ..MatchPlan::default()
            };
            if let Some(maker) = opposite.best_level().and_then(|level| level.get(1)) {
                plan.fills.push(PlannedFill {
                    maker_order_id: maker.id,
                    maker: maker.trader.clone(),
                    price: maker.price,
                    quantity: amount,
                    exhausts_maker: true,
                });
                plan.remaining = 0;
            }
            plan
        }

        fn name(&self) -> &str {
            "Overfill"
        }
    }

    /// FAB in custody for "a" and "b", currency for "c"
    fn engine_with(algorithm: Box<dyn MatchingAlgorithm>) -> MatchingEngine {
        let mut engine = MatchingEngineBuilder::new().algorithm(algorithm).build().unwrap();
        let owner = trader("owner");
        let token = Arc::new(FixedSupplyToken::new(owner.clone()));
        engine.register(&owner, "FAB", token.clone()).unwrap();
        for name in ["a", "b"] {
            let holder = trader(name);
            token.transfer(&owner, &holder, 10).unwrap();
            token.authorize(&holder, &engine.config().custodian, 10);
            engine.deposit_asset(&holder, "FAB", 10).unwrap();
        }
        engine.deposit_currency(&trader("c"), 1_000).unwrap();
        engine
    }

    #[test]
    fn test_custom_algorithm_pays_the_order_it_removes() {
        let mut engine = engine_with(Box::new(NewestFirst));
        engine.sell(&trader("a"), "FAB", 1, 100).unwrap();
        engine.sell(&trader("b"), "FAB", 1, 100).unwrap();

        let outcome = engine.buy(&trader("c"), "FAB", 1, 100).unwrap();
        assert_eq!(outcome.trades[0].seller, trader("b"));
        assert_eq!(engine.currency_balance_of(&trader("a")), 0);
        assert_eq!(engine.currency_balance_of(&trader("b")), 100);
        assert_eq!(
            engine.offers_at("FAB", Side::Sell, 100).unwrap(),
            vec![(trader("a"), 1)]
        );
        assert!(engine.order(OrderId::new(2)).is_none());
        assert_eq!(engine.order(OrderId::new(1)).map(|o| o.amount), Some(1));
    }

    #[test]
    fn test_unusable_plan_is_rejected_before_settlement() {
        let mut engine = engine_with(Box::new(Overfill));
        engine.sell(&trader("a"), "FAB", 1, 100).unwrap();

        let err = engine.buy(&trader("c"), "FAB", 3, 100).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidMatchPlan(_)));

        assert_eq!(engine.currency_balance_of(&trader("c")), 1_000);
        assert_eq!(engine.currency_balance_of(&trader("a")), 0);
        assert_eq!(engine.asset_balance_of("FAB", &trader("c")).unwrap(), 0);
        assert_eq!(engine.sell_book_summary("FAB").unwrap().as_tuple(), (100, 100, 1));

        // No order id was consumed
        let next = engine.sell(&trader("b"), "FAB", 1, 200).unwrap();
        assert_eq!(next.order_id, OrderId::new(2));
    }
}

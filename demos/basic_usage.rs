// ============================================================================
// Basic Usage Example
// ============================================================================

use ledger_exchange::prelude::*;
use std::sync::Arc;

fn main() -> Result<(), ExchangeError> {
    #[cfg(feature = "logging")]
    ledger_exchange::utils::init_tracing("ledger_exchange=debug");

    println!("=== Ledger Exchange Example ===\n");

    let issuer = TraderId::from("issuer");
    let config = ExchangeConfig::default().with_registrar(issuer.clone());
    let mut engine = MatchingEngine::new(config, Arc::new(LoggingEventHandler))?;

    // Register FAB; its whole supply starts with the issuer
    let token = Arc::new(FixedSupplyToken::new(issuer.clone()));
    engine.register(&issuer, "FAB", token.clone())?;
    println!("Registered FAB (supply {})\n", token.total_supply());

    // Sellers pull tokens into custody, buyers fund currency
    let sellers: Vec<TraderId> = (0..3).map(|i| TraderId::new(format!("seller_{}", i))).collect();
    for seller in &sellers {
        token
            .transfer(&issuer, seller, 100)
            .map_err(ExchangeError::from)?;
        token.authorize(seller, &engine.config().custodian, 100);
        engine.deposit_asset(seller, "FAB", 100)?;
    }
    let buyer = TraderId::from("buyer");
    engine.deposit_currency(&buyer, 50_000)?;

    println!("Adding sell orders...");
    for (i, seller) in sellers.iter().enumerate() {
        let price = 100 + i as u64 * 5;
        let outcome = engine.sell(seller, "FAB", 20, price)?;
        println!("  {} sells 20 @ {} -> {}", seller, price, outcome.order_id);
    }

    println!("\n=== Sell Book ===");
    for (price, amount) in engine.depth("FAB", Side::Sell, 5)? {
        println!("  {} @ {}", amount, price);
    }
    let (best, frontier, total) = engine.sell_book_summary("FAB")?.as_tuple();
    println!("best {}, frontier {}, outstanding {}", best, frontier, total);

    // Crosses the first two levels and rests the remainder
    println!("\n=== Submitting Buy 50 @ 106 ===");
    let before = engine.currency_balance_of(&buyer);
    let outcome = engine.buy(&buyer, "FAB", 50, 106)?;
    for trade in &outcome.trades {
        println!(
            "  Trade {}: {} @ {} ({} -> {})",
            trade.id, trade.quantity, trade.price, trade.seller, trade.buyer
        );
    }
    println!(
        "Filled {}, resting {:?}, currency charged {}",
        outcome.filled_amount,
        outcome.resting_order(),
        before - engine.currency_balance_of(&buyer)
    );

    // Cancel what is left and get the reservation back
    if let Some(order_id) = outcome.resting_order() {
        let cancelled = engine.cancel(&buyer, order_id)?;
        println!("Cancelled {} ({} left)", order_id, cancelled.amount);
    }

    println!("\n=== Final State ===");
    println!("Buy book:  {:?}", engine.buy_book_summary("FAB")?.as_tuple());
    println!("Sell book: {:?}", engine.sell_book_summary("FAB")?.as_tuple());
    println!("Buyer FAB: {}", engine.asset_balance_of("FAB", &buyer)?);
    println!(
        "Retained from price improvement: {}",
        engine.custody().currency_retained
    );

    Ok(())
}

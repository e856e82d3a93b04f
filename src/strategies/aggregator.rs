use std::collections::{BTreeMap, HashMap};
use tracing::info;
use crate::config::TraderTables;
use crate::data::types::{Market, Trade};
use crate::strategies::types::{MarketAggregate, Markets, TraderPosition};

/// One [`Market`] per market id; the first trade that mentions it wins.
pub fn extract_markets(trades: &[&Trade]) -> HashMap<String, Market> {
    let mut markets = HashMap::new();
    for trade in trades {
        if trade.condition_id.is_empty() || markets.contains_key(&trade.condition_id) {
            continue;
        }
        markets.insert(
            trade.condition_id.clone(),
            Market {
                market_id: trade.condition_id.clone(),
                title: trade.title.clone().unwrap_or_else(|| "Unknown Market".to_string()),
                slug: trade.slug.clone().unwrap_or_default(),
                resolved: trade.resolved,
                closed: trade.closed,
            },
        );
    }
    markets
}

/// Keep markets that are neither resolved nor closed.
pub fn live_markets(markets: HashMap<String, Market>) -> HashMap<String, Market> {
    markets.into_iter().filter(|(_, m)| m.is_live()).collect()
}

/// Fold qualifying trades of live markets into one aggregate per market.
pub fn aggregate(
    trades: &[&Trade],
    live: &HashMap<String, Market>,
    traders: &TraderTables,
) -> Markets {
    let mut markets: Markets = BTreeMap::new();

    for trade in trades {
        let Some(market) = live.get(&trade.condition_id) else {
            continue;
        };

        let agg = markets
            .entry(market.market_id.clone())
            .or_insert_with(|| {
                MarketAggregate::new(market.market_id.clone(), market.title.clone(), market.slug.clone())
            });
        fold_trade(agg, trade, traders);
    }

    info!("Aggregated trades into {} markets", markets.len());
    markets
}

fn fold_trade(agg: &mut MarketAggregate, trade: &Trade, traders: &TraderTables) {
    let outcome = trade.outcome.to_uppercase();

    agg.wallet_outcomes
        .entry(trade.proxy_wallet.clone())
        .or_default()
        .insert(outcome.clone());

    agg.latest_timestamp = agg.latest_timestamp.max(trade.timestamp);

    if trade.price > 0.0 {
        agg.entry_prices.push(trade.price);
        agg.outcome_prices.entry(outcome.clone()).or_default().push(trade.price);
    }

    let trader = trade.trader();
    let position = agg
        .outcomes
        .entry(outcome)
        .or_default()
        .entry(trader.clone())
        .or_insert_with(|| TraderPosition::new(traders.rating(&trader)));

    // Size accumulates; price is the latest cost basis
    position.total_size += trade.size;
    position.last_price = trade.price;
    position.count += 1;
    position.sides.push(trade.side);
}

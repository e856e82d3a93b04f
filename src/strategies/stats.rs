use std::collections::HashMap;
use crate::data::types::Trade;

/// Per-trader totals across every qualifying trade, regardless of market.
#[derive(Debug, Clone, PartialEq)]
pub struct TraderStat {
    pub trader: String,
    /// Wallet of the first trade seen under this name.
    pub wallet: String,
    pub trades: usize,
    pub total_size: f64,
    pub avg_price: f64,
}

#[derive(Default)]
struct Accumulator {
    wallet: String,
    trades: usize,
    total_size: f64,
    prices: Vec<f64>,
}

/// Build the trader summary, largest total size first.
pub fn collect_trader_stats(trades: &[&Trade]) -> Vec<TraderStat> {
    let mut order: Vec<String> = Vec::new();
    let mut acc: HashMap<String, Accumulator> = HashMap::new();

    for trade in trades {
        let trader = trade.trader();
        let entry = acc.entry(trader.clone()).or_insert_with(|| {
            order.push(trader);
            Accumulator {
                wallet: trade.proxy_wallet.clone(),
                ..Accumulator::default()
            }
        });
        entry.trades += 1;
        entry.total_size += trade.size;
        entry.prices.push(trade.price);
    }

    let mut stats: Vec<TraderStat> = order
        .into_iter()
        .filter_map(|trader| {
            let a = acc.remove(&trader)?;
            let avg_price = if a.prices.is_empty() {
                0.0
            } else {
                a.prices.iter().sum::<f64>() / a.prices.len() as f64
            };
            Some(TraderStat {
                trader,
                wallet: a.wallet,
                trades: a.trades,
                total_size: a.total_size,
                avg_price,
            })
        })
        .collect();

    // Stable sort keeps first-seen order among equal sizes
    stats.sort_by(|a, b| b.total_size.total_cmp(&a.total_size));
    stats
}

use std::collections::HashSet;
use crate::data::types::Trade;

/// Trades fetched for the tracked wallets, in wallet order.
#[derive(Debug, Clone, Default)]
pub struct TradeStore {
    trades: Vec<Trade>,
}

impl TradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one wallet's trades, stamping the wallet on records that lack it.
    pub fn extend_wallet(&mut self, wallet: &str, trades: Vec<Trade>) {
        self.trades.extend(trades.into_iter().map(|mut trade| {
            if trade.proxy_wallet.is_empty() {
                trade.proxy_wallet = wallet.to_string();
            }
            trade
        }));
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Keep every trade whose market appears among the `limit` most recent
    /// trades. The cap picks markets, so older trades in a recent market
    /// survive while markets with no recent activity are dropped whole.
    pub fn recent(self, limit: usize) -> TradeStore {
        if self.trades.len() <= limit {
            return self;
        }

        let mut by_time: Vec<&Trade> = self.trades.iter().collect();
        by_time.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let recent_markets: HashSet<String> = by_time
            .into_iter()
            .take(limit)
            .map(|t| t.condition_id.clone())
            .collect();

        let trades = self.trades
            .into_iter()
            .filter(|t| recent_markets.contains(&t.condition_id))
            .collect();

        TradeStore { trades }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(market: &str, timestamp: i64) -> Trade {
        serde_json::from_value(serde_json::json!({
            "conditionId": market,
            "timestamp": timestamp,
        }))
        .unwrap()
    }

    #[test]
    fn test_extend_wallet_stamps_missing_wallet() {
        let mut store = TradeStore::new();
        let mut own = trade("m1", 1);
        own.proxy_wallet = "0xother".to_string();
        store.extend_wallet("0xwallet", vec![trade("m1", 2), own]);

        assert_eq!(store.trades()[0].proxy_wallet, "0xwallet");
        assert_eq!(store.trades()[1].proxy_wallet, "0xother");
    }

    #[test]
    fn test_recent_keeps_whole_markets() {
        let mut store = TradeStore::new();
        store.extend_wallet("0xa", vec![trade("old", 10), trade("hot", 100), trade("hot", 5)]);
        store.extend_wallet("0xb", vec![trade("warm", 50)]);

        let recent = store.recent(2);
        let markets: Vec<&str> = recent.trades().iter().map(|t| t.condition_id.as_str()).collect();

        // "hot" at ts=5 stays because the market itself is recent
        assert_eq!(markets, vec!["hot", "hot", "warm"]);
    }

    #[test]
    fn test_recent_under_limit_is_untouched() {
        let mut store = TradeStore::new();
        store.extend_wallet("0xa", vec![trade("m1", 1), trade("m2", 2)]);

        assert_eq!(store.recent(600).len(), 2);
    }
}

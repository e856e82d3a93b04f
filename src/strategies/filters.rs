//! Filter stages of the consensus pipeline.
//!
//! Every stage takes the aggregate collection by value and returns the
//! survivors. Market-level checks report a [`Rejection`] for logging;
//! position-level stages rewrite the outcome map and drop markets left
//! empty.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};
use crate::config::{TraderTables, VolatilityConfig};
use crate::data::results::ResultChecker;
use crate::strategies::types::{MarketAggregate, Markets, Rejection, TraderPosition};

/// Prices below this or above its complement are exempt from the
/// per-trader minimum.
const EXTREME_PRICE: f64 = 0.10;

fn retain_markets<F>(markets: Markets, mut check: F) -> Markets
where
    F: FnMut(&MarketAggregate) -> Result<(), Rejection>,
{
    markets
        .into_iter()
        .filter(|(id, market)| match check(market) {
            Ok(()) => true,
            Err(reason) => {
                debug!("✗ {} ({}): {}", id, market.title, reason);
                false
            }
        })
        .collect()
}

fn retain_positions<F>(markets: Markets, mut keep: F) -> Markets
where
    F: FnMut(&str, &TraderPosition) -> bool,
{
    markets
        .into_iter()
        .filter_map(|(id, mut market)| {
            for traders in market.outcomes.values_mut() {
                traders.retain(|name, position| keep(name, position));
            }
            market.prune();
            (!market.is_empty()).then_some((id, market))
        })
        .collect()
}

/// Stage 1. Also stamps `total_wallets` on the survivors.
pub fn min_wallets(markets: Markets, min_wallets: usize) -> Markets {
    markets
        .into_iter()
        .filter_map(|(id, mut market)| {
            let wallets = market.wallet_count();
            if wallets >= min_wallets {
                market.total_wallets = wallets;
                Some((id, market))
            } else {
                debug!("✗ {}: {}", id, Rejection::TooFewWallets(wallets, min_wallets));
                None
            }
        })
        .collect()
}

/// Share of wallets behind the most popular outcome. Wallets trading
/// several outcomes count toward the total but toward no single outcome.
pub fn check_majority(market: &MarketAggregate, threshold: f64) -> Result<(), Rejection> {
    let total_votes = market.wallet_count();
    let max_votes = market.outcomes.values().map(|traders| traders.len()).max().unwrap_or(0);

    if total_votes == 0 || max_votes == 0 {
        return Err(Rejection::NoVotes);
    }

    let share = max_votes as f64 / total_votes as f64;
    if share >= threshold {
        Ok(())
    } else {
        Err(Rejection::WeakMajority(max_votes, total_votes, share * 100.0, threshold * 100.0))
    }
}

/// Stage 2.
pub fn majority_vote(markets: Markets, threshold: f64) -> Markets {
    retain_markets(markets, |m| check_majority(m, threshold))
}

fn meets_min_bet(trader: &str, position: &TraderPosition, tables: &TraderTables) -> bool {
    position.total_size >= tables.min_bet(trader)
        || position.last_price < EXTREME_PRICE
        || position.last_price > 1.0 - EXTREME_PRICE
}

/// Stage 3.
pub fn min_bet_size(markets: Markets, tables: &TraderTables) -> Markets {
    retain_positions(markets, |trader, position| meets_min_bet(trader, position, tables))
}

/// Stage 4. Traders present on more than one outcome of a market carry no
/// directional signal and are removed from all of them.
pub fn both_sides(markets: Markets) -> Markets {
    markets
        .into_iter()
        .filter_map(|(id, mut market)| {
            let mut appearances: BTreeMap<&str, usize> = BTreeMap::new();
            for traders in market.outcomes.values() {
                for name in traders.keys() {
                    *appearances.entry(name.as_str()).or_default() += 1;
                }
            }
            let hedgers: Vec<String> = appearances
                .into_iter()
                .filter(|(_, count)| *count > 1)
                .map(|(name, _)| name.to_string())
                .collect();

            if !hedgers.is_empty() {
                debug!("{}: removing traders on both sides: {:?}", id, hedgers);
                for traders in market.outcomes.values_mut() {
                    traders.retain(|name, _| !hedgers.contains(name));
                }
                market.prune();
            }
            (!market.is_empty()).then_some((id, market))
        })
        .collect()
}

/// Stage 5.
pub fn exited_positions(markets: Markets) -> Markets {
    retain_positions(markets, |_, position| !position.has_exited())
}

pub fn check_hedged_wallets(market: &MarketAggregate) -> Result<(), Rejection> {
    match market.wallet_outcomes.iter().find(|(_, outcomes)| outcomes.len() > 1) {
        Some((wallet, _)) => Err(Rejection::HedgedWallet(wallet.clone())),
        None => Ok(()),
    }
}

/// Stage 6 (optional).
pub fn hedged_wallets(markets: Markets) -> Markets {
    retain_markets(markets, check_hedged_wallets)
}

/// Gap in trader count between the most and least backed outcome; a lone
/// outcome is measured against zero.
pub fn check_trader_margin(market: &MarketAggregate, min_margin: usize) -> Result<(), Rejection> {
    let counts: Vec<usize> = market.outcomes.values().map(|traders| traders.len()).collect();
    let margin = match counts.as_slice() {
        [] => 0,
        [only] => *only,
        _ => {
            let max = counts.iter().copied().max().unwrap_or(0);
            let min = counts.iter().copied().min().unwrap_or(0);
            max - min
        }
    };

    if margin >= min_margin {
        Ok(())
    } else {
        Err(Rejection::NarrowMargin(margin, min_margin))
    }
}

/// Stage 7 (optional).
pub fn trader_margin(markets: Markets, min_margin: usize) -> Markets {
    retain_markets(markets, |m| check_trader_margin(m, min_margin))
}

/// One noisy outcome disqualifies the whole market. Outcomes with fewer
/// than `min_prices` distinct entry prices are not checked.
pub fn check_volatility(market: &MarketAggregate, config: &VolatilityConfig) -> Result<(), Rejection> {
    for (outcome, traders) in &market.outcomes {
        let mut prices: Vec<f64> = traders.values().map(|p| p.last_price).collect();
        prices.sort_by(f64::total_cmp);
        prices.dedup();
        let (Some(&min), Some(&max)) = (prices.first(), prices.last()) else {
            continue;
        };
        if prices.len() < config.min_prices {
            continue;
        }

        let spread = max - min;
        debug!(
            "{} {}: spread {:.3} over {} distinct prices ({} trade prices)",
            market.market_id,
            outcome,
            spread,
            prices.len(),
            market.outcome_prices.get(outcome).map_or(0, Vec::len)
        );
        if spread > config.max_spread {
            return Err(Rejection::Volatile(outcome.clone(), spread, config.max_spread));
        }
    }
    Ok(())
}

/// Stage 8.
pub fn volatility(markets: Markets, config: &VolatilityConfig) -> Markets {
    let before = markets.len();
    let markets = retain_markets(markets, |m| check_volatility(m, config));
    info!("{} of {} markets remain after volatility filtering", markets.len(), before);
    markets
}

pub fn check_market_age(
    market: &MarketAggregate,
    max_age: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<(), Rejection> {
    let age_secs = now.timestamp() - market.latest_timestamp;
    if age_secs <= max_age.num_seconds() {
        Ok(())
    } else {
        Err(Rejection::Stale(
            age_secs as f64 / 3600.0,
            max_age.num_seconds() as f64 / 3600.0,
        ))
    }
}

/// Stage 9.
pub fn market_age(markets: Markets, max_age: chrono::Duration, now: DateTime<Utc>) -> Markets {
    retain_markets(markets, |m| check_market_age(m, max_age, now))
}

/// Stage 10.
pub fn external_results(markets: Markets, checker: &dyn ResultChecker, now: DateTime<Utc>) -> Markets {
    retain_markets(markets, |m| {
        if checker.is_concluded(&m.title, now) {
            Err(Rejection::Concluded)
        } else {
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;
    use crate::data::types::Side;

    /// Builds aggregates by hand: (wallet, trader, outcome, size, price, sides).
    struct MarketBuilder {
        market: MarketAggregate,
    }

    impl MarketBuilder {
        fn new(id: &str) -> Self {
            Self {
                market: MarketAggregate::new(id.to_string(), format!("Market {}", id), format!("slug-{}", id)),
            }
        }

        fn position(mut self, wallet: &str, trader: &str, outcome: &str, size: f64, price: f64, sides: &[Side]) -> Self {
            self.market
                .wallet_outcomes
                .entry(wallet.to_string())
                .or_insert_with(BTreeSet::new)
                .insert(outcome.to_string());
            let mut position = TraderPosition::new(None);
            position.total_size = size;
            position.last_price = price;
            position.count = sides.len() as u32;
            position.sides = sides.to_vec();
            self.market
                .outcomes
                .entry(outcome.to_string())
                .or_default()
                .insert(trader.to_string(), position);
            self
        }

        fn buy(self, wallet: &str, outcome: &str, size: f64, price: f64) -> Self {
            self.position(wallet, wallet, outcome, size, price, &[Side::Buy])
        }

        fn wallet_only(mut self, wallet: &str, outcomes: &[&str]) -> Self {
            self.market
                .wallet_outcomes
                .insert(wallet.to_string(), outcomes.iter().map(|o| o.to_string()).collect());
            self
        }

        fn latest(mut self, ts: i64) -> Self {
            self.market.latest_timestamp = ts;
            self
        }

        fn build(self) -> MarketAggregate {
            self.market
        }
    }

    fn markets(list: Vec<MarketAggregate>) -> Markets {
        list.into_iter().map(|m| (m.market_id.clone(), m)).collect()
    }

    fn tables(min_bets: &[(&str, f64)]) -> TraderTables {
        let mut tables = TraderTables::default();
        for (name, min) in min_bets {
            tables.min_bet_size.insert(name.to_string(), *min);
        }
        tables
    }

    #[test]
    fn test_min_wallets_stamps_total() {
        let input = markets(vec![
            MarketBuilder::new("m1").buy("a", "YES", 50.0, 0.5).buy("b", "YES", 50.0, 0.5).build(),
            MarketBuilder::new("m2").buy("a", "YES", 50.0, 0.5).build(),
        ]);

        let out = min_wallets(input, 2);

        assert_eq!(out.len(), 1);
        assert_eq!(out["m1"].total_wallets, 2);
    }

    #[test]
    fn test_majority_vote_thresholds() {
        // 7 of 10 wallets on YES, 3 hedging wallets with no position left
        let mut builder = MarketBuilder::new("m1");
        for i in 0..7 {
            builder = builder.buy(&format!("y{}", i), "YES", 50.0, 0.5);
        }
        for i in 0..3 {
            builder = builder.wallet_only(&format!("h{}", i), &["YES", "NO"]);
        }
        let market = builder.build();

        assert!(check_majority(&market, 0.65).is_ok());
        assert!(check_majority(&market, 0.70).is_ok());
        assert!(matches!(
            check_majority(&market, 0.75),
            Err(Rejection::WeakMajority(7, 10, _, _))
        ));
    }

    #[test]
    fn test_majority_vote_penalizes_hedgers() {
        // 2 on YES, 1 on NO, 1 hedger counted only in the total: 2/4
        let market = MarketBuilder::new("m1")
            .buy("a", "YES", 50.0, 0.5)
            .buy("b", "YES", 50.0, 0.5)
            .buy("c", "NO", 50.0, 0.5)
            .wallet_only("h", &["YES", "NO"])
            .build();

        assert!(check_majority(&market, 0.65).is_err());
        assert!(check_majority(&market, 0.50).is_ok());
    }

    #[test]
    fn test_majority_vote_empty_market_is_rejected() {
        let market = MarketBuilder::new("m1").build();
        assert_eq!(check_majority(&market, 0.65), Err(Rejection::NoVotes));
    }

    #[test]
    fn test_min_bet_size_extreme_price_exemption() {
        let tables = tables(&[("t", 10.0)]);

        let cheap = markets(vec![MarketBuilder::new("m1").buy("t", "YES", 5.0, 0.05).build()]);
        assert_eq!(min_bet_size(cheap, &tables).len(), 1);

        let expensive = markets(vec![MarketBuilder::new("m1").buy("t", "YES", 5.0, 0.95).build()]);
        assert_eq!(min_bet_size(expensive, &tables).len(), 1);

        let middle = markets(vec![MarketBuilder::new("m1").buy("t", "YES", 5.0, 0.50).build()]);
        assert!(min_bet_size(middle, &tables).is_empty());
    }

    #[test]
    fn test_min_bet_size_drops_only_small_positions() {
        let tables = tables(&[("small", 100.0)]);
        let input = markets(vec![MarketBuilder::new("m1")
            .buy("small", "YES", 50.0, 0.5)
            .buy("other", "YES", 1.0, 0.5)
            .buy("lone", "NO", 20.0, 0.5)
            .build()]);

        let out = min_bet_size(input, &tables);
        let yes: Vec<&String> = out["m1"].outcomes["YES"].keys().collect();

        assert_eq!(yes, vec!["other"]);
        assert!(out["m1"].outcomes.contains_key("NO"));
    }

    #[test]
    fn test_both_sides_removes_trader_everywhere() {
        let input = markets(vec![
            MarketBuilder::new("m1")
                .buy("a", "YES", 50.0, 0.6)
                .buy("a", "NO", 50.0, 0.4)
                .buy("b", "YES", 50.0, 0.6)
                .build(),
            MarketBuilder::new("m2")
                .buy("c", "YES", 50.0, 0.6)
                .buy("c", "NO", 50.0, 0.4)
                .build(),
        ]);

        let out = both_sides(input);

        assert_eq!(out.len(), 1);
        assert_eq!(out["m1"].outcomes.len(), 1);
        assert_eq!(out["m1"].outcomes["YES"].keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_exited_positions() {
        let input = markets(vec![MarketBuilder::new("m1")
            .position("w1", "exited", "YES", 50.0, 0.5, &[Side::Buy, Side::Sell])
            .position("w2", "holder", "YES", 50.0, 0.5, &[Side::Buy, Side::Buy])
            .build()]);

        let out = exited_positions(input);
        assert_eq!(out["m1"].outcomes["YES"].keys().collect::<Vec<_>>(), vec!["holder"]);

        let only_exits = markets(vec![MarketBuilder::new("m1")
            .position("w1", "exited", "YES", 50.0, 0.5, &[Side::Sell, Side::Buy])
            .build()]);
        assert!(exited_positions(only_exits).is_empty());
    }

    #[test]
    fn test_hedged_wallets() {
        let clean = MarketBuilder::new("m1").buy("a", "YES", 50.0, 0.5).build();
        let hedged = MarketBuilder::new("m2")
            .buy("a", "YES", 50.0, 0.5)
            .wallet_only("h", &["YES", "NO"])
            .build();

        assert!(check_hedged_wallets(&clean).is_ok());
        assert_eq!(check_hedged_wallets(&hedged), Err(Rejection::HedgedWallet("h".to_string())));
        assert_eq!(hedged_wallets(markets(vec![clean, hedged])).len(), 1);
    }

    #[test]
    fn test_trader_margin() {
        let two_nil = MarketBuilder::new("m1").buy("a", "YES", 50.0, 0.5).buy("b", "YES", 50.0, 0.5).build();
        let two_one = MarketBuilder::new("m2")
            .buy("a", "YES", 50.0, 0.5)
            .buy("b", "YES", 50.0, 0.5)
            .buy("c", "NO", 50.0, 0.5)
            .build();
        let three_one = MarketBuilder::new("m3")
            .buy("a", "YES", 50.0, 0.5)
            .buy("b", "YES", 50.0, 0.5)
            .buy("d", "YES", 50.0, 0.5)
            .buy("c", "NO", 50.0, 0.5)
            .build();

        assert!(check_trader_margin(&two_nil, 2).is_ok());
        assert_eq!(check_trader_margin(&two_one, 2), Err(Rejection::NarrowMargin(1, 2)));
        assert!(check_trader_margin(&three_one, 2).is_ok());
    }

    #[test]
    fn test_volatility_spread() {
        let config = VolatilityConfig::default();

        let calm = MarketBuilder::new("m1").buy("a", "YES", 50.0, 0.40).buy("b", "YES", 50.0, 0.60).build();
        assert!(check_volatility(&calm, &config).is_ok());

        let noisy = MarketBuilder::new("m2")
            .buy("a", "YES", 50.0, 0.30)
            .buy("b", "YES", 50.0, 0.60)
            .buy("c", "NO", 50.0, 0.40)
            .build();
        assert!(matches!(check_volatility(&noisy, &config), Err(Rejection::Volatile(o, _, _)) if o == "YES"));

        // The whole market goes, not just the outlier
        let out = volatility(markets(vec![calm, noisy]), &config);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["m1"]);
    }

    #[test]
    fn test_volatility_needs_min_samples() {
        let config = VolatilityConfig { min_prices: 3, ..VolatilityConfig::default() };
        let market = MarketBuilder::new("m1").buy("a", "YES", 50.0, 0.10).buy("b", "YES", 50.0, 0.80).build();

        assert!(check_volatility(&market, &config).is_ok());
    }

    #[test]
    fn test_volatility_counts_distinct_prices() {
        let config = VolatilityConfig { min_prices: 3, ..VolatilityConfig::default() };
        let repeated = MarketBuilder::new("m1")
            .buy("a", "YES", 50.0, 0.10)
            .buy("b", "YES", 50.0, 0.10)
            .buy("c", "YES", 50.0, 0.80)
            .build();
        assert!(check_volatility(&repeated, &config).is_ok());

        let spread_out = MarketBuilder::new("m2")
            .buy("a", "YES", 50.0, 0.10)
            .buy("b", "YES", 50.0, 0.20)
            .buy("c", "YES", 50.0, 0.80)
            .build();
        assert!(matches!(check_volatility(&spread_out, &config), Err(Rejection::Volatile(o, _, _)) if o == "YES"));

        // One distinct price never clears the default sample of two
        let same_price = MarketBuilder::new("m3").buy("a", "YES", 50.0, 0.5).buy("b", "YES", 50.0, 0.5).build();
        assert!(check_volatility(&same_price, &VolatilityConfig::default()).is_ok());
    }

    #[test]
    fn test_market_age() {
        let now = Utc.timestamp_opt(1_000_000, 0).unwrap();
        let max_age = chrono::Duration::hours(6);

        let fresh = MarketBuilder::new("m1").buy("a", "YES", 50.0, 0.5).latest(1_000_000 - 6 * 3600).build();
        let stale = MarketBuilder::new("m2").buy("a", "YES", 50.0, 0.5).latest(1_000_000 - 6 * 3600 - 1).build();

        assert!(check_market_age(&fresh, max_age, now).is_ok());
        assert!(matches!(check_market_age(&stale, max_age, now), Err(Rejection::Stale(_, _))));
        assert_eq!(market_age(markets(vec![fresh, stale]), max_age, now).len(), 1);
    }

    struct TitleChecker(&'static str);

    impl ResultChecker for TitleChecker {
        fn is_concluded(&self, title: &str, _now: DateTime<Utc>) -> bool {
            title.contains(self.0)
        }
    }

    #[test]
    fn test_external_results() {
        let input = markets(vec![
            MarketBuilder::new("done").buy("a", "YES", 50.0, 0.5).build(),
            MarketBuilder::new("open").buy("a", "YES", 50.0, 0.5).build(),
        ]);

        let out = external_results(input, &TitleChecker("done"), Utc::now());
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["open"]);
    }

    #[test]
    fn test_stages_are_fixed_points_on_empty_input() {
        let tables = TraderTables::default();
        let config = VolatilityConfig::default();

        assert!(min_wallets(Markets::new(), 2).is_empty());
        assert!(majority_vote(Markets::new(), 0.65).is_empty());
        assert!(min_bet_size(Markets::new(), &tables).is_empty());
        assert!(both_sides(Markets::new()).is_empty());
        assert!(exited_positions(Markets::new()).is_empty());
        assert!(hedged_wallets(Markets::new()).is_empty());
        assert!(trader_margin(Markets::new(), 2).is_empty());
        assert!(volatility(Markets::new(), &config).is_empty());
        assert!(market_age(Markets::new(), chrono::Duration::hours(6), Utc::now()).is_empty());
    }
}

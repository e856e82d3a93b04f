use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};
use crate::config::PipelineConfig;
use crate::data::market_status::LiveStatusChecker;
use crate::data::results::ResultChecker;
use crate::data::types::{MarketStatus, Trade};
use crate::strategies::aggregator::{aggregate, extract_markets, live_markets};
use crate::strategies::filters;
use crate::strategies::qualify::TradeQualifier;
use crate::strategies::stats::{collect_trader_stats, TraderStat};
use crate::strategies::types::{MarketAggregate, Markets, Rejection, Stage};

/// Why a run produced no markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoData {
    NoQualifyingTrades,
    NoLiveMarkets,
    EmptiedBy(Stage),
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Surviving markets, most recent trade first.
    pub markets: Vec<MarketAggregate>,
    pub trader_stats: Vec<TraderStat>,
    pub no_data: Option<NoData>,
}

impl PipelineReport {
    fn empty(trader_stats: Vec<TraderStat>, reason: NoData) -> Self {
        Self {
            markets: Vec::new(),
            trader_stats,
            no_data: Some(reason),
        }
    }
}

/// Turns a batch of wallet trades into the markets where tracked wallets
/// agree on one side.
pub struct ConsensusPipeline {
    config: PipelineConfig,
    qualifier: TradeQualifier,
    result_checker: Box<dyn ResultChecker>,
    status_checker: Box<dyn LiveStatusChecker>,
}

impl ConsensusPipeline {
    pub fn new(
        config: PipelineConfig,
        result_checker: Box<dyn ResultChecker>,
        status_checker: Box<dyn LiveStatusChecker>,
    ) -> Result<Self> {
        let qualifier = TradeQualifier::new(&config)?;
        Ok(Self {
            config,
            qualifier,
            result_checker,
            status_checker,
        })
    }

    pub fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::HedgedWallets => self.config.exclude_hedged_markets,
            Stage::TraderMargin => self.config.min_trader_margin.is_some(),
            Stage::Volatility => self.config.volatility.enabled,
            Stage::MarketAge => self.config.max_market_age().is_some(),
            Stage::ExternalResults => self.config.check_external_results,
            Stage::LiveStatus => self.config.check_live_status,
            _ => true,
        }
    }

    pub async fn run(&self, trades: &[Trade], now: DateTime<Utc>) -> PipelineReport {
        let qualifying = self.qualifier.filter(trades);
        let trader_stats = collect_trader_stats(&qualifying);
        info!(
            "{} of {} trades qualify ({} traders)",
            qualifying.len(),
            trades.len(),
            trader_stats.len()
        );

        if qualifying.is_empty() {
            warn!("No qualifying trades");
            return PipelineReport::empty(trader_stats, NoData::NoQualifyingTrades);
        }

        let all_markets = extract_markets(&qualifying);
        info!("Extracted {} unique markets from trades", all_markets.len());

        let live = live_markets(all_markets);
        info!("Filtered to {} markets (not resolved/closed from trade metadata)", live.len());
        if live.is_empty() {
            return PipelineReport::empty(trader_stats, NoData::NoLiveMarkets);
        }

        let mut markets = aggregate(&qualifying, &live, &self.config.traders);

        for stage in Stage::ORDER {
            if !self.is_enabled(stage) {
                continue;
            }

            let before = markets.len();
            markets = self.apply(stage, markets, now).await;
            markets.retain(|_, m| !m.is_empty());
            info!("{} markets remain after {} filtering (from {})", markets.len(), stage, before);

            if markets.is_empty() {
                return PipelineReport::empty(trader_stats, NoData::EmptiedBy(stage));
            }
        }

        let mut output: Vec<MarketAggregate> = markets.into_values().collect();
        output.sort_by(|a, b| b.latest_timestamp.cmp(&a.latest_timestamp));
        for market in &output {
            info!(
                "✓ {}: {} wallets, avg entry {:.3}",
                market.title,
                market.total_wallets,
                market.average_entry_price().unwrap_or_default()
            );
        }

        PipelineReport {
            markets: output,
            trader_stats,
            no_data: None,
        }
    }

    async fn apply(&self, stage: Stage, markets: Markets, now: DateTime<Utc>) -> Markets {
        let config = &self.config;
        match stage {
            Stage::MinWallets => filters::min_wallets(markets, config.min_wallets),
            Stage::MajorityVote => filters::majority_vote(markets, config.majority_threshold),
            Stage::MinBetSize => filters::min_bet_size(markets, &config.traders),
            Stage::BothSides => filters::both_sides(markets),
            Stage::ExitedPositions => filters::exited_positions(markets),
            Stage::HedgedWallets => filters::hedged_wallets(markets),
            Stage::TraderMargin => match config.min_trader_margin {
                Some(margin) => filters::trader_margin(markets, margin),
                None => markets,
            },
            Stage::Volatility => filters::volatility(markets, &config.volatility),
            Stage::MarketAge => match config.max_market_age() {
                Some(max_age) => filters::market_age(markets, max_age, now),
                None => markets,
            },
            Stage::ExternalResults => {
                filters::external_results(markets, self.result_checker.as_ref(), now)
            }
            Stage::LiveStatus => self.live_status(markets).await,
        }
    }

    /// Stage 11. Calls run one at a time with a fixed pause between them.
    async fn live_status(&self, markets: Markets) -> Markets {
        let delay = Duration::from_millis(self.config.live_status_delay_ms);
        let timeout = Duration::from_secs(self.config.live_status_timeout_secs);
        let mut live = Markets::new();

        for (id, market) in markets {
            if market.slug.is_empty() {
                debug!("✗ {}: {}", id, Rejection::MissingSlug);
                continue;
            }

            let status = tokio::time::timeout(timeout, self.status_checker.status(&market.slug))
                .await
                .unwrap_or_else(|_| {
                    warn!("Live status check for {} timed out", market.slug);
                    MarketStatus::NOT_LIVE
                });

            if status.is_live() {
                debug!("✓ {} is LIVE (slug={})", id, market.slug);
                live.insert(id, market);
            } else {
                let reason = Rejection::NotLive {
                    resolved: status.resolved,
                    closed: status.closed,
                };
                info!("✗ {}: {} (slug={})", id, reason, market.slug);
            }

            tokio::time::sleep(delay).await;
        }

        live
    }
}

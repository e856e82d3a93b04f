use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use crate::data::types::Side;

/// Aggregates keyed by market id.
pub type Markets = BTreeMap<String, MarketAggregate>;

/// outcome -> trader -> position
pub type OutcomeTraders = BTreeMap<String, BTreeMap<String, TraderPosition>>;

/// One trader's exposure to one outcome of one market.
#[derive(Debug, Clone, PartialEq)]
pub struct TraderPosition {
    /// Cumulative size over every qualifying trade.
    pub total_size: f64,
    /// Price of the most recent trade, not an average.
    pub last_price: f64,
    pub count: u32,
    /// Display-only annotation from the ratings table.
    pub rating: Option<u8>,
    pub sides: Vec<Side>,
}

impl TraderPosition {
    pub fn new(rating: Option<u8>) -> Self {
        Self {
            total_size: 0.0,
            last_price: 0.0,
            count: 0,
            rating,
            sides: Vec::new(),
        }
    }

    /// Both bought and sold: the position was closed out.
    pub fn has_exited(&self) -> bool {
        self.sides.contains(&Side::Buy) && self.sides.contains(&Side::Sell)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketAggregate {
    pub market_id: String,
    pub title: String,
    pub slug: String,
    pub outcomes: OutcomeTraders,
    /// Every non-zero entry price seen in the market.
    pub entry_prices: Vec<f64>,
    pub outcome_prices: BTreeMap<String, Vec<f64>>,
    pub latest_timestamp: i64,
    /// Distinct outcomes each wallet traded; more than one means hedging.
    pub wallet_outcomes: BTreeMap<String, BTreeSet<String>>,
    /// Set by the minimum-wallets stage.
    pub total_wallets: usize,
}

impl MarketAggregate {
    pub fn new(market_id: String, title: String, slug: String) -> Self {
        Self {
            market_id,
            title,
            slug,
            outcomes: BTreeMap::new(),
            entry_prices: Vec::new(),
            outcome_prices: BTreeMap::new(),
            latest_timestamp: 0,
            wallet_outcomes: BTreeMap::new(),
            total_wallets: 0,
        }
    }

    pub fn wallet_count(&self) -> usize {
        self.wallet_outcomes.len()
    }

    /// Drop outcomes with no traders left.
    pub fn prune(&mut self) {
        self.outcomes.retain(|_, traders| !traders.is_empty());
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.values().all(|traders| traders.is_empty())
    }

    pub fn average_entry_price(&self) -> Option<f64> {
        if self.entry_prices.is_empty() {
            return None;
        }
        Some(self.entry_prices.iter().sum::<f64>() / self.entry_prices.len() as f64)
    }
}

/// The filter stages, in the order the pipeline runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    MinWallets,
    MajorityVote,
    MinBetSize,
    BothSides,
    ExitedPositions,
    HedgedWallets,
    TraderMargin,
    Volatility,
    MarketAge,
    ExternalResults,
    LiveStatus,
}

impl Stage {
    pub const ORDER: [Stage; 11] = [
        Stage::MinWallets,
        Stage::MajorityVote,
        Stage::MinBetSize,
        Stage::BothSides,
        Stage::ExitedPositions,
        Stage::HedgedWallets,
        Stage::TraderMargin,
        Stage::Volatility,
        Stage::MarketAge,
        Stage::ExternalResults,
        Stage::LiveStatus,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::MinWallets => "minimum wallets",
            Stage::MajorityVote => "majority vote",
            Stage::MinBetSize => "minimum bet size",
            Stage::BothSides => "both-sides exclusion",
            Stage::ExitedPositions => "exited positions",
            Stage::HedgedWallets => "hedged wallets",
            Stage::TraderMargin => "trader margin",
            Stage::Volatility => "volatility",
            Stage::MarketAge => "market age",
            Stage::ExternalResults => "external results",
            Stage::LiveStatus => "live status",
        };
        f.write_str(name)
    }
}

/// Why a whole market was dropped by a stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("only {0} wallets (minimum {1})")]
    TooFewWallets(usize, usize),

    #[error("majority {0}/{1} ({2:.1}%) below {3:.0}%")]
    WeakMajority(usize, usize, f64, f64),

    #[error("no votes")]
    NoVotes,

    #[error("wallet {0} traded several outcomes")]
    HedgedWallet(String),

    #[error("trader margin {0} below {1}")]
    NarrowMargin(usize, usize),

    #[error("outcome {0} price spread {1:.2} exceeds {2:.2}")]
    Volatile(String, f64, f64),

    #[error("last trade {0:.1}h ago (limit: {1:.1}h)")]
    Stale(f64, f64),

    #[error("event appears finished based on external check")]
    Concluded,

    #[error("not live (resolved={resolved}, closed={closed})")]
    NotLive { resolved: bool, closed: bool },

    #[error("no slug to check live status")]
    MissingSlug,
}

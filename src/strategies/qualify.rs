use anyhow::Result;
use regex::Regex;
use crate::config::PipelineConfig;
use crate::data::types::Trade;

/// Screens trades before they reach statistics or aggregation.
pub struct TradeQualifier {
    sub_market_patterns: [Regex; 2],
    keywords: Vec<String>,
    min_trade_size: f64,
}

impl TradeQualifier {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            // "Game 2", "map 3": sub-markets of a larger event
            sub_market_patterns: [
                Regex::new(r"(?i)\bgame\s*\d+\b")?,
                Regex::new(r"(?i)\bmap\s*\d+\b")?,
            ],
            keywords: config.keywords.iter().map(|k| k.to_lowercase()).collect(),
            min_trade_size: config.min_trade_size,
        })
    }

    pub fn is_sub_market(&self, title: &str) -> bool {
        self.sub_market_patterns.iter().any(|re| re.is_match(title))
    }

    fn matches_keywords(&self, title: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let title = title.to_lowercase();
        self.keywords.iter().any(|k| title.contains(k.as_str()))
    }

    pub fn qualifies(&self, trade: &Trade) -> bool {
        let title = trade.title();
        !self.is_sub_market(title)
            && self.matches_keywords(title)
            && trade.size >= self.min_trade_size
    }

    pub fn filter<'a>(&self, trades: &'a [Trade]) -> Vec<&'a Trade> {
        trades.iter().filter(|t| self.qualifies(t)).collect()
    }
}

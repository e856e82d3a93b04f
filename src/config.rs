use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    pub wallets: WalletsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_trade_limit")]
    pub trade_limit: usize,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            trade_limit: default_trade_limit(),
            fetch_concurrency: default_fetch_concurrency(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletsConfig {
    pub tracked: Vec<String>,
}

/// Everything the consensus pipeline reads. Passed into the pipeline
/// explicitly so tests can use synthetic tables.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_min_wallets")]
    pub min_wallets: usize,
    #[serde(default = "default_majority_threshold")]
    pub majority_threshold: f64,
    #[serde(default = "default_min_trade_size")]
    pub min_trade_size: f64,
    /// Empty means every title is allowed.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub volatility: VolatilityConfig,
    /// A non-positive value disables the age stage. A missing key keeps
    /// the 6 h default.
    #[serde(default = "default_max_market_age_hours")]
    pub max_market_age_hours: Option<f64>,
    #[serde(default)]
    pub exclude_hedged_markets: bool,
    #[serde(default)]
    pub min_trader_margin: Option<usize>,
    #[serde(default)]
    pub check_external_results: bool,
    #[serde(default)]
    pub check_live_status: bool,
    #[serde(default = "default_live_status_delay")]
    pub live_status_delay_ms: u64,
    #[serde(default = "default_live_status_timeout")]
    pub live_status_timeout_secs: u64,
    #[serde(default)]
    pub traders: TraderTables,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolatilityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_spread")]
    pub max_spread: f64,
    #[serde(default = "default_min_prices")]
    pub min_prices: usize,
}

/// Per-trader tables keyed by resolved trader name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraderTables {
    #[serde(default)]
    pub ratings: HashMap<String, u8>,
    #[serde(default)]
    pub min_bet_size: HashMap<String, f64>,
}

impl TraderTables {
    pub fn rating(&self, trader: &str) -> Option<u8> {
        self.ratings.get(trader).copied()
    }

    /// Unlisted traders have no minimum.
    pub fn min_bet(&self, trader: &str) -> f64 {
        self.min_bet_size.get(trader).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_output_csv")]
    pub output_csv: String,
    #[serde(default = "default_true")]
    pub show_individual_ratings: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub telegram_enabled: bool,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_wallets: default_min_wallets(),
            majority_threshold: default_majority_threshold(),
            min_trade_size: default_min_trade_size(),
            keywords: Vec::new(),
            volatility: VolatilityConfig::default(),
            max_market_age_hours: default_max_market_age_hours(),
            exclude_hedged_markets: false,
            min_trader_margin: None,
            check_external_results: false,
            check_live_status: false,
            live_status_delay_ms: default_live_status_delay(),
            live_status_timeout_secs: default_live_status_timeout(),
            traders: TraderTables::default(),
        }
    }
}

impl PipelineConfig {
    pub fn max_market_age(&self) -> Option<chrono::Duration> {
        self.max_market_age_hours
            .filter(|hours| *hours > 0.0)
            .map(|hours| chrono::Duration::seconds((hours * 3600.0) as i64))
    }
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_spread: default_max_spread(),
            min_prices: default_min_prices(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_csv: default_output_csv(),
            show_individual_ratings: true,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            telegram_enabled: false,
            top_n: default_top_n(),
        }
    }
}

fn default_trade_limit() -> usize { 600 }
fn default_fetch_concurrency() -> usize { 4 }
fn default_request_timeout() -> u64 { 10 }
fn default_min_wallets() -> usize { 2 }
fn default_majority_threshold() -> f64 { 0.65 }
fn default_min_trade_size() -> f64 { 10.0 }
fn default_max_market_age_hours() -> Option<f64> { Some(6.0) }
fn default_live_status_delay() -> u64 { 50 }
fn default_live_status_timeout() -> u64 { 5 }
fn default_max_spread() -> f64 { 0.25 }
fn default_min_prices() -> usize { 2 }
fn default_output_csv() -> String { "polymarket_trades_analysis.csv".to_string() }
fn default_top_n() -> usize { 4 }
fn default_true() -> bool { true }

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub polymarket_data_url: String,
    pub polymarket_web_url: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        // The tables live under [traders] in the file but belong to the pipeline.
        let file: TraderFile = toml::from_str(contents)?;
        if let Some(traders) = file.traders {
            config.pipeline.traders = traders;
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct TraderFile {
    #[serde(default)]
    traders: Option<TraderTables>,
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            polymarket_data_url: std::env::var("POLYMARKET_DATA_URL")
                .unwrap_or_else(|_| "https://data-api.polymarket.com".to_string()),
            polymarket_web_url: std::env::var("POLYMARKET_WEB_URL")
                .unwrap_or_else(|_| "https://polymarket.com".to_string()),
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|s| !s.is_empty()),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok().filter(|s| !s.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
            [wallets]
            tracked = ["0xabc", "0xdef"]
            "#,
        )
        .unwrap();

        assert_eq!(config.wallets.tracked.len(), 2);
        assert_eq!(config.system.trade_limit, 600);
        assert_eq!(config.pipeline.min_wallets, 2);
        assert!((config.pipeline.majority_threshold - 0.65).abs() < 1e-9);
        assert_eq!(config.pipeline.max_market_age_hours, Some(6.0));
        assert!(config.pipeline.volatility.enabled);
        assert!(!config.pipeline.check_live_status);
        assert!(!config.pipeline.check_external_results);
        assert!(config.report.show_individual_ratings);
        assert_eq!(config.notifications.top_n, 4);
    }

    #[test]
    fn test_trader_tables_are_moved_into_pipeline() {
        let config = Config::parse(
            r#"
            [wallets]
            tracked = []

            [pipeline]
            majority_threshold = 0.7

            [traders.ratings]
            fabiplouf = 9

            [traders.min_bet_size]
            RN1 = 80
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.traders.rating("fabiplouf"), Some(9));
        assert_eq!(config.pipeline.traders.rating("nobody"), None);
        assert!((config.pipeline.traders.min_bet("RN1") - 80.0).abs() < 1e-9);
        assert_eq!(config.pipeline.traders.min_bet("nobody"), 0.0);
        assert!((config.pipeline.majority_threshold - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_non_positive_age_disables_age_stage() {
        let mut pipeline = PipelineConfig::default();
        assert_eq!(pipeline.max_market_age(), Some(chrono::Duration::hours(6)));

        pipeline.max_market_age_hours = Some(0.0);
        assert_eq!(pipeline.max_market_age(), None);

        pipeline.max_market_age_hours = None;
        assert_eq!(pipeline.max_market_age(), None);
    }

    #[test]
    fn test_age_key_in_file() {
        let omitted = Config::parse("[wallets]\ntracked = []\n[pipeline]\nmin_wallets = 3\n").unwrap();
        assert_eq!(omitted.pipeline.max_market_age(), Some(chrono::Duration::hours(6)));

        let zero = Config::parse("[wallets]\ntracked = []\n[pipeline]\nmax_market_age_hours = 0\n").unwrap();
        assert_eq!(zero.pipeline.max_market_age(), None);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = Config::parse(include_str!("../config.toml")).unwrap();

        assert!(!config.wallets.tracked.is_empty());
        assert_eq!(config.pipeline.traders.rating("RN1"), Some(9));
        assert!((config.pipeline.traders.min_bet("0xheavy888") - 150.0).abs() < 1e-9);
        assert_eq!(config.pipeline.min_trader_margin, None);
        assert_eq!(config.pipeline.max_market_age(), Some(chrono::Duration::hours(6)));
    }
}

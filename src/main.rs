mod config;
mod data;
mod monitoring;
mod strategies;

use anyhow::Result;
use chrono::Utc;
use std::time::Duration;
use config::{Config, EnvConfig};
use data::data_api::{fetch_all, DataApiClient};
use data::market_status::MarketPageChecker;
use data::results::DateTokenChecker;
use monitoring::logger::CsvExporter;
use monitoring::report;
use monitoring::telegram::{TelegramNotifier, NO_MARKETS_MESSAGE};
use strategies::consensus::ConsensusPipeline;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        tracing::error!("Analysis failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing::info!("Polymarket LIVE trades analysis starting...");

    // Load configuration
    let config = Config::load("config.toml")?;
    let env_config = EnvConfig::load()?;

    let timeout = Duration::from_secs(config.system.request_timeout_secs);
    tracing::info!("Tracking {} wallets", config.wallets.tracked.len());
    tracing::info!("Minimum wallets per market: {}", config.pipeline.min_wallets);
    tracing::info!("Majority threshold: {:.0}%", config.pipeline.majority_threshold * 100.0);
    tracing::info!("Live status re-check: {}", config.pipeline.check_live_status);
    tracing::info!("External result check: {}", config.pipeline.check_external_results);

    // Fetch trades
    let source = DataApiClient::new(env_config.polymarket_data_url.clone(), timeout)?;
    let store = fetch_all(&source, &config.wallets.tracked, config.system.fetch_concurrency).await;

    if store.is_empty() {
        tracing::warn!("No trades fetched from any tracked wallet");
    }

    let total = store.len();
    let store = store.recent(config.system.trade_limit);
    if store.len() < total {
        tracing::info!(
            "Limited to markets of the {} most recent trades ({} of {} trades kept)",
            config.system.trade_limit,
            store.len(),
            total
        );
    }

    // Run the consensus pipeline
    let status_checker = MarketPageChecker::new(
        env_config.polymarket_web_url.clone(),
        Duration::from_secs(config.pipeline.live_status_timeout_secs),
    )?;
    let pipeline = ConsensusPipeline::new(
        config.pipeline.clone(),
        Box::new(DateTokenChecker::new()?),
        Box::new(status_checker),
    )?;
    let result = pipeline.run(store.trades(), Utc::now()).await;

    let notifier = if config.notifications.telegram_enabled {
        TelegramNotifier::from_credentials(
            env_config.telegram_bot_token.as_deref(),
            env_config.telegram_chat_id.as_deref(),
        )?
    } else {
        None
    };

    if let Some(reason) = result.no_data {
        tracing::info!("No markets: {:?}", reason);
        println!("\nNo LIVE markets found matching criteria.");
        if let Some(notifier) = &notifier {
            notifier.send_message(NO_MARKETS_MESSAGE).await;
        }
        return Ok(());
    }

    let rows = report::market_rows(&result.markets, config.report.show_individual_ratings);

    if !result.trader_stats.is_empty() {
        let rule = "=".repeat(100);
        println!("\n{}\nTRADER SUMMARY\n{}", rule, rule);
        println!("{}", report::render_trader_summary(&result.trader_stats, &config.pipeline.traders));
    }

    let rule = "=".repeat(100);
    println!("\n{}\nMARKETS\n{}", rule, rule);
    println!("{}", report::render_market_table(&rows));
    println!("{}", rule);

    if CsvExporter::new(config.report.output_csv.clone()).export(&rows)? {
        println!("\nCSV exported to: {}", config.report.output_csv);
    }

    if let Some(notifier) = &notifier {
        notifier.send_top_markets(&rows, config.notifications.top_n).await;
    }

    tracing::info!("Analysis complete. Found {} markets to display", rows.len());
    Ok(())
}

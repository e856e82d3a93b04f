use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info, warn};
use crate::data::store::TradeStore;
use crate::data::types::Trade;

/// Supplies the trade history of one wallet. Failures yield an empty list.
#[async_trait]
pub trait TradeSource: Send + Sync {
    async fn fetch_trades(&self, wallet: &str) -> Vec<Trade>;
}

pub struct DataApiClient {
    client: Client,
    base_url: String,
}

impl DataApiClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url })
    }

    async fn request_trades(&self, wallet: &str) -> Result<Vec<Trade>> {
        let url = format!("{}/trades", self.base_url);

        let records: Vec<serde_json::Value> = self.client
            .get(&url)
            .query(&[("user", wallet)])
            .send()
            .await
            .context("Failed to fetch trades")?
            .error_for_status()
            .context("Data API returned an error status")?
            .json()
            .await
            .context("Failed to parse trades response")?;

        Ok(parse_trades(records, wallet))
    }
}

#[async_trait]
impl TradeSource for DataApiClient {
    async fn fetch_trades(&self, wallet: &str) -> Vec<Trade> {
        info!("Fetching trades for wallet: {}", wallet);

        match self.request_trades(wallet).await {
            Ok(trades) => {
                info!("Retrieved {} trades for {}", trades.len(), wallet);
                trades
            }
            Err(e) => {
                error!("Error fetching trades for {}: {:#}", wallet, e);
                Vec::new()
            }
        }
    }
}

/// Decode records one at a time. Bad fields are defaulted by `Trade`
/// itself; only a record that is not an object is skipped.
fn parse_trades(records: Vec<serde_json::Value>, wallet: &str) -> Vec<Trade> {
    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<Trade>(record) {
            Ok(trade) => Some(trade),
            Err(e) => {
                warn!("Skipping malformed trade for {}: {}", wallet, e);
                None
            }
        })
        .collect()
}

/// Fetch every tracked wallet with bounded concurrency, keeping wallet order.
pub async fn fetch_all<S: TradeSource + ?Sized>(
    source: &S,
    wallets: &[String],
    concurrency: usize,
) -> TradeStore {
    let results: Vec<(String, Vec<Trade>)> = stream::iter(wallets.iter())
        .map(|wallet| async move { (wallet.clone(), source.fetch_trades(wallet).await) })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut store = TradeStore::new();
    for (wallet, trades) in results {
        store.extend_wallet(&wallet, trades);
    }

    info!("Fetched {} total trades from {} wallets", store.len(), wallets.len());
    store
}

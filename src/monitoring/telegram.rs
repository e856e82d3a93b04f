use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};
use crate::monitoring::report::MarketRow;

pub const NO_MARKETS_MESSAGE: &str = "⚠️ No markets found in this run.";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{}", bot_token),
            chat_id,
        })
    }

    /// Build a notifier from optional credentials; `None` when either is missing.
    pub fn from_credentials(bot_token: Option<&str>, chat_id: Option<&str>) -> Result<Option<Self>> {
        match (bot_token, chat_id) {
            (Some(token), Some(chat)) => Ok(Some(Self::new(token, chat.to_string())?)),
            _ => {
                warn!("Telegram credentials not configured");
                Ok(None)
            }
        }
    }

    /// Delivery failures are logged and reported as `false`.
    pub async fn send_message(&self, text: &str) -> bool {
        match self.post(text).await {
            Ok(()) => {
                info!("Telegram notification sent successfully");
                true
            }
            Err(e) => {
                error!("Failed to send Telegram notification: {:#}", e);
                false
            }
        }
    }

    async fn post(&self, text: &str) -> Result<()> {
        let url = format!("{}/sendMessage", self.base_url);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        self.client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach Telegram")?
            .error_for_status()
            .context("Telegram rejected the message")?;
        Ok(())
    }

    pub async fn send_top_markets(&self, rows: &[MarketRow], top_n: usize) -> bool {
        self.send_message(&top_markets_message(rows, top_n)).await
    }
}

pub fn top_markets_message(rows: &[MarketRow], top_n: usize) -> String {
    if rows.is_empty() {
        return NO_MARKETS_MESSAGE.to_string();
    }

    let top = &rows[..rows.len().min(top_n)];
    let mut message = format!("🎯 <b>TOP {} POLYMARKET BETS</b>\n\n", top.len());

    for (i, row) in top.iter().enumerate() {
        message.push_str(&format!("<b>{}. {}</b>\n", i + 1, html_escape(&row.title)));
        if row.opposite.is_empty() {
            message.push_str(&format!("   📊 {}\n", html_escape(&row.outcome)));
        } else {
            message.push_str(&format!("   ✅ {}\n", html_escape(&row.outcome)));
            message.push_str(&format!("   ❌ {}\n", html_escape(&row.opposite)));
        }
        message.push_str(&format!("   👥 {} traders\n\n", row.total_wallets));
    }
    message
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

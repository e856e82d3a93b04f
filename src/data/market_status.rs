use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use crate::data::types::MarketStatus;

/// Re-checks whether a market is still open. Any failure must be reported
/// as [`MarketStatus::NOT_LIVE`].
#[async_trait]
pub trait LiveStatusChecker: Send + Sync {
    async fn status(&self, slug: &str) -> MarketStatus;
}

/// Reads the resolved/closed flags embedded in the public market page.
pub struct MarketPageChecker {
    client: Client,
    base_url: String,
    resolved_re: Regex,
    closed_re: Regex,
}

impl MarketPageChecker {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            resolved_re: Regex::new(r#"(?i)"resolved"\s*:\s*(true|false)"#)?,
            closed_re: Regex::new(r#"(?i)"closed"\s*:\s*(true|false)"#)?,
        })
    }

    async fn fetch_status(&self, slug: &str) -> Result<MarketStatus> {
        let url = format!("{}/market/{}", self.base_url, slug);
        let response = self.client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch market page")?;

        // A missing page means the market was removed or archived
        if !response.status().is_success() {
            debug!("Market page {} returned {}", slug, response.status());
            return Ok(MarketStatus::NOT_LIVE);
        }

        let body = response.text().await.context("Failed to read market page")?;
        Ok(self.parse_status(&body))
    }

    /// Flags absent from the page read as false.
    pub fn parse_status(&self, page: &str) -> MarketStatus {
        MarketStatus {
            resolved: first_flag(&self.resolved_re, page),
            closed: first_flag(&self.closed_re, page),
        }
    }
}

fn first_flag(re: &Regex, page: &str) -> bool {
    re.captures(page)
        .map(|cap| cap[1].eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[async_trait]
impl LiveStatusChecker for MarketPageChecker {
    async fn status(&self, slug: &str) -> MarketStatus {
        match self.fetch_status(slug).await {
            Ok(status) => status,
            Err(e) => {
                debug!("Error fetching market status for {}: {:#}", slug, e);
                MarketStatus::NOT_LIVE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> MarketPageChecker {
        MarketPageChecker::new("http://localhost".to_string(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_status_reads_flags() {
        let page = r#"<script>{"slug":"x","resolved": false,"closed" :TRUE}</script>"#;
        let status = checker().parse_status(page);

        assert!(!status.resolved);
        assert!(status.closed);
    }

    #[test]
    fn test_parse_status_defaults_to_live() {
        let status = checker().parse_status("<html>nothing here</html>");
        assert!(status.is_live());
    }

    #[test]
    fn test_parse_status_uses_first_occurrence() {
        let page = r#""closed":false ... "closed":true"#;
        assert!(!checker().parse_status(page).closed);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_not_live() {
        let checker =
            MarketPageChecker::new("http://127.0.0.1:9".to_string(), Duration::from_millis(500))
                .unwrap();
        assert_eq!(checker.status("any-slug").await, MarketStatus::NOT_LIVE);
    }
}

use std::collections::BTreeMap;
use crate::strategies::stats::TraderStat;
use crate::strategies::types::{MarketAggregate, TraderPosition};
use crate::config::TraderTables;

/// One rendered market row.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketRow {
    pub title: String,
    pub market_id: String,
    pub outcome: String,
    pub opposite: String,
    pub total_wallets: usize,
    pub latest_trade: i64,
}

impl MarketRow {
    /// Both sides joined the way the CSV and notifications show them.
    pub fn outcomes(&self) -> String {
        if self.opposite.is_empty() {
            self.outcome.clone()
        } else {
            format!("{} | {}", self.outcome, self.opposite)
        }
    }
}

/// `[9 7 -] $150 ($0.610)`: each trader's rating, total size, mean entry.
pub fn format_individual_ratings(traders: &BTreeMap<String, TraderPosition>) -> String {
    if traders.is_empty() {
        return String::new();
    }

    let ratings: Vec<String> = traders
        .values()
        .map(|p| p.rating.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()))
        .collect();
    let total_size: f64 = traders.values().map(|p| p.total_size).sum();
    let avg_price = traders.values().map(|p| p.last_price).sum::<f64>() / traders.len() as f64;

    let mut parts = vec![format!("[{}]", ratings.join(" "))];
    if total_size > 0.0 {
        parts.push(format!("${:.0}", total_size));
    }
    parts.push(format!("(${:.3})", avg_price));
    parts.join(" ")
}

/// `2 ($150) MMR: 8.0`: trader count, total size, mean rating of rated traders.
pub fn format_average_rating(traders: &BTreeMap<String, TraderPosition>) -> String {
    let total_size: f64 = traders.values().map(|p| p.total_size).sum();
    let ratings: Vec<u8> = traders.values().filter_map(|p| p.rating).collect();

    let mut out = format!("{} (${:.0})", traders.len(), total_size);
    if !ratings.is_empty() {
        let avg = ratings.iter().map(|r| *r as f64).sum::<f64>() / ratings.len() as f64;
        out.push_str(&format!(" MMR: {:.1}", avg));
    }
    out
}

pub fn market_row(market: &MarketAggregate, individual_ratings: bool) -> MarketRow {
    // Outcome keys are already sorted; the first two are shown
    let mut rendered = market.outcomes.iter().map(|(outcome, traders)| {
        let detail = if individual_ratings {
            format_individual_ratings(traders)
        } else {
            format_average_rating(traders)
        };
        format!("{}: {}", outcome, detail)
    });

    MarketRow {
        title: market.title.clone(),
        market_id: market.market_id.clone(),
        outcome: rendered.next().unwrap_or_default(),
        opposite: rendered.next().unwrap_or_default(),
        total_wallets: market.total_wallets,
        latest_trade: market.latest_timestamp,
    }
}

pub fn market_rows(markets: &[MarketAggregate], individual_ratings: bool) -> Vec<MarketRow> {
    markets.iter().map(|m| market_row(m, individual_ratings)).collect()
}

pub fn render_trader_summary(stats: &[TraderStat], tables: &TraderTables) -> String {
    let header = ["Trader", "Wallet", "Rating", "Bets", "Avg Entry Price", "Total Size"];
    let rows: Vec<[String; 6]> = stats
        .iter()
        .map(|s| {
            [
                s.trader.clone(),
                s.wallet.clone(),
                tables
                    .rating(&s.trader)
                    .map(|r| format!("{}/10", r))
                    .unwrap_or_else(|| "-".to_string()),
                s.trades.to_string(),
                format!("${:.3}", s.avg_price),
                format!("${:.2}", s.total_size),
            ]
        })
        .collect();

    let mut widths = header.map(display_width);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(display_width(cell));
        }
    }

    let line = |cells: [&str; 6]| -> String {
        cells
            .iter()
            .zip(widths.iter())
            .map(|(cell, w)| format!("{:>width$}", cell, width = *w))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut out = vec![line(header)];
    for row in &rows {
        out.push(line([&row[0], &row[1], &row[2], &row[3], &row[4], &row[5]]));
    }
    out.join("\n")
}

/// Padding in `format!` counts chars, so widths must too.
fn display_width(text: &str) -> usize {
    text.chars().count()
}

pub fn render_market_table(rows: &[MarketRow]) -> String {
    let title_w = rows.iter().map(|r| display_width(&r.title)).chain([12]).max().unwrap_or(12);
    let left_w = rows.iter().map(|r| display_width(&r.outcome)).chain([7]).max().unwrap_or(7);
    let right_w = rows.iter().map(|r| display_width(&r.opposite)).max().unwrap_or(0);
    let wallets_w = 13;

    let mut header = format!("{:<title_w$}  {:<left_w$}", "Market Title", "Outcome");
    if right_w > 0 {
        header.push_str(&format!("   {:<right_w$}", "Opposite"));
    }
    header.push_str(&format!("  {:>wallets_w$}", "Total Wallets"));

    let mut out = vec![header, "-".repeat(title_w + left_w + right_w + wallets_w + 6)];
    for row in rows {
        let sides = if right_w > 0 {
            format!("{:<left_w$} | {:<right_w$}", row.outcome, row.opposite)
        } else {
            format!("{:<left_w$}", row.outcome)
        };
        out.push(format!("{:<title_w$}  {}  {:>wallets_w$}", row.title, sides, row.total_wallets));
    }
    out.join("\n")
}

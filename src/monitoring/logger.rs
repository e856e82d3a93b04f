use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::{info, warn};
use crate::monitoring::report::MarketRow;

const HEADER: &str = "market_title,market_id,outcomes,total_wallets,latest_trade";

pub struct CsvExporter {
    path: String,
}

impl CsvExporter {
    pub fn new(path: String) -> Self {
        Self { path }
    }

    /// Write all rows, replacing any previous export. Nothing is written for
    /// an empty result.
    pub fn export(&self, rows: &[MarketRow]) -> Result<bool> {
        if rows.is_empty() {
            warn!("No data to export");
            return Ok(false);
        }

        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create CSV file: {}", self.path))?;
        let mut writer = BufWriter::new(file);
        write_rows(&mut writer, rows)?;
        writer.flush()?;

        info!("Results exported to {}", self.path);
        Ok(true)
    }
}

fn write_rows<W: Write>(out: &mut W, rows: &[MarketRow]) -> Result<()> {
    writeln!(out, "{}", HEADER)?;
    for row in rows {
        writeln!(
            out,
            "{},{},{},{},{}",
            escape(&row.title),
            escape(&row.market_id),
            escape(&row.outcomes()),
            row.total_wallets,
            row.latest_trade
        )?;
    }
    Ok(())
}

/// Quote a field when it holds a comma, quote or newline.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(title: &str) -> MarketRow {
        MarketRow {
            title: title.to_string(),
            market_id: "0xc1".to_string(),
            outcome: "YES: [9] $100 ($0.600)".to_string(),
            opposite: "NO: [-] $60 ($0.400)".to_string(),
            total_wallets: 3,
            latest_trade: 1_760_000_000,
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a, b"), "\"a, b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_write_rows() {
        let mut buf = Vec::new();
        write_rows(&mut buf, &[row("Lakers vs Celtics, Game Night")]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], HEADER);
        assert_eq!(
            lines[1],
            "\"Lakers vs Celtics, Game Night\",0xc1,YES: [9] $100 ($0.600) | NO: [-] $60 ($0.400),3,1760000000"
        );
    }

    #[test]
    fn test_export_skips_empty_result() {
        let path = std::env::temp_dir().join("wallet_consensus_empty_export.csv");
        let _ = std::fs::remove_file(&path);
        let exporter = CsvExporter::new(path.to_string_lossy().into_owned());

        assert!(!exporter.export(&[]).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_export_writes_file() {
        let path = std::env::temp_dir().join("wallet_consensus_export.csv");
        let exporter = CsvExporter::new(path.to_string_lossy().into_owned());

        assert!(exporter.export(&[row("Lakers vs Celtics")]).unwrap());
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        let _ = std::fs::remove_file(&path);
    }
}

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use tracing::debug;

/// Decides whether the real-world event behind a market title is already
/// over. Errors must be reported as `false`.
pub trait ResultChecker: Send + Sync {
    fn is_concluded(&self, title: &str, now: DateTime<Utc>) -> bool;
}

/// Treats a title as concluded when it carries an explicit `YYYY-MM-DD`
/// date more than one whole day in the past.
pub struct DateTokenChecker {
    date_re: Regex,
}

impl DateTokenChecker {
    pub fn new() -> Result<Self> {
        Ok(Self {
            date_re: Regex::new(r"202[0-9]-\d{2}-\d{2}")?,
        })
    }
}

impl ResultChecker for DateTokenChecker {
    fn is_concluded(&self, title: &str, now: DateTime<Utc>) -> bool {
        let Some(token) = self.date_re.find(title) else {
            return false;
        };

        let event_date = match NaiveDate::parse_from_str(token.as_str(), "%Y-%m-%d") {
            Ok(date) => date,
            Err(e) => {
                debug!("Unparseable date {} in {}: {}", token.as_str(), title, e);
                return false;
            }
        };

        let Some(event_start) = event_date.and_hms_opt(0, 0, 0) else {
            return false;
        };

        let days_ago = (now - event_start.and_utc()).num_days();
        if days_ago > 1 {
            debug!("Event from {} days ago, marking as finished: {}", days_ago, title);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_old_date_is_concluded() {
        let checker = DateTokenChecker::new().unwrap();
        assert!(checker.is_concluded("Lakers vs Celtics (2026-02-03)", now()));
    }

    #[test]
    fn test_recent_or_future_date_is_not_concluded() {
        let checker = DateTokenChecker::new().unwrap();
        // 1 day 12 hours ago rounds down to 1 whole day
        assert!(!checker.is_concluded("Match on 2026-02-05", now()));
        assert!(!checker.is_concluded("Match on 2026-02-06", now()));
        assert!(!checker.is_concluded("Match on 2026-03-01", now()));
    }

    #[test]
    fn test_title_without_date_is_not_concluded() {
        let checker = DateTokenChecker::new().unwrap();
        assert!(!checker.is_concluded("Will BTC close above 100k?", now()));
    }

    #[test]
    fn test_invalid_date_token_is_not_concluded() {
        let checker = DateTokenChecker::new().unwrap();
        assert!(!checker.is_concluded("Event 2026-13-45", now()));
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    #[default]
    Buy,
    Sell,
}

/// One trade record as returned by the data API `/trades` endpoint.
///
/// Every field is optional on the wire, and null or mistyped values fall
/// back to the same defaults as missing ones: numbers 0, price 0.5, side BUY.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    #[serde(default, alias = "wallet", deserialize_with = "lenient::string")]
    pub proxy_wallet: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub condition_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub outcome: String,
    #[serde(default, deserialize_with = "lenient::side")]
    pub side: Side,
    #[serde(default, deserialize_with = "lenient::number")]
    pub size: f64,
    #[serde(default = "default_price", deserialize_with = "lenient::price")]
    pub price: f64,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub pseudonym: Option<String>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub timestamp: i64,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub resolved: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub closed: bool,
}

fn default_price() -> f64 {
    0.5
}

/// Field readers that never fail: anything unusable becomes the default.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use super::{default_price, Side};

    fn as_f64(value: &Value) -> Option<f64> {
        let n = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        n.filter(|n| n.is_finite())
    }

    fn as_string(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(as_string(Value::deserialize(d)?).unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(as_string(Value::deserialize(d)?))
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(as_f64(&Value::deserialize(d)?).unwrap_or(0.0))
    }

    pub fn price<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(as_f64(&Value::deserialize(d)?).unwrap_or_else(default_price))
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(d)?;
        let ts = match &value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        Ok(ts.or_else(|| as_f64(&value).map(|f| f as i64)).unwrap_or(0))
    }

    pub fn side<'de, D: Deserializer<'de>>(d: D) -> Result<Side, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) if s.trim().eq_ignore_ascii_case("sell") => Side::Sell,
            _ => Side::Buy,
        })
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => b,
            Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        })
    }
}

impl Trade {
    pub fn trader(&self) -> String {
        trader_identity(self.name.as_deref(), self.pseudonym.as_deref(), &self.proxy_wallet)
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }
}

/// Resolve the name a trader is known by: display name, then alias, then
/// the first 8 characters of the wallet. Empty strings count as absent.
pub fn trader_identity(name: Option<&str>, alias: Option<&str>, wallet: &str) -> String {
    name.filter(|n| !n.is_empty())
        .or_else(|| alias.filter(|a| !a.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| wallet.chars().take(8).collect())
}

/// Market metadata taken from the first trade that mentions it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub market_id: String,
    pub title: String,
    pub slug: String,
    pub resolved: bool,
    pub closed: bool,
}

impl Market {
    pub fn is_live(&self) -> bool {
        !self.resolved && !self.closed
    }
}

/// Resolved/closed flags reported by a live-status lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketStatus {
    pub resolved: bool,
    pub closed: bool,
}

impl MarketStatus {
    /// Reported whenever the status cannot be determined.
    pub const NOT_LIVE: MarketStatus = MarketStatus { resolved: true, closed: true };

    pub fn is_live(&self) -> bool {
        !self.resolved && !self.closed
    }
}

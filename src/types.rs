//! Core value types shared by the exchange layer and the traders

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Symbol → last price, e.g. "BTCUSDT" → 27000.0
pub type PriceMap = std::collections::HashMap<String, f64>;

fn asset_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]{1,20}$").expect("static regex"))
}

/// Normalize and validate an asset name ("btc" -> "BTC")
pub fn asset_name(raw: &str) -> Result<String> {
    let name = raw.trim().to_uppercase();
    if asset_pattern().is_match(&name) {
        Ok(name)
    } else {
        Err(Error::InvalidSymbol(raw.to_string()))
    }
}

/// A base/quote trading pair, e.g. BTC/USDT
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub base: String,
    pub quote: String,
}

impl Symbol {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Validating constructor for user-supplied names
    pub fn parse(base: &str, quote: &str) -> Result<Self> {
        Ok(Self {
            base: asset_name(base)?,
            quote: asset_name(quote)?,
        })
    }

    /// Split a concatenated exchange symbol ("BTCUSDT") using a known quote asset
    pub fn from_pair(pair: &str, quote: &str) -> Option<Self> {
        let base = pair.strip_suffix(quote)?;
        if base.is_empty() {
            return None;
        }
        Some(Self::new(base, quote))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.quote)
    }
}

/// Lifecycle of a tracked position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeState {
    /// Buy requested, not yet executed
    Buy,
    Bought,
    /// Sell requested, not yet executed
    Sell,
    Sold,
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeState::Buy => "BUY",
            TradeState::Bought => "BOUGHT",
            TradeState::Sell => "SELL",
            TradeState::Sold => "SOLD",
        };
        f.write_str(s)
    }
}

/// Outcome of an attempted exchange operation
///
/// Business failures (not enough balance, nothing to sell) are represented
/// as `from_exchange == false` with a message, never as an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub symbol: Symbol,
    #[serde(default)]
    pub quantity: f64,
    /// Fill price (first fill, or weighted average after a join)
    #[serde(default)]
    pub price: f64,
    /// Quote amount paid on a buy or gained on a sell
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub commission: f64,
    #[serde(default)]
    pub commission_asset: Option<String>,
    #[serde(default)]
    pub profit: f64,
    #[serde(default)]
    pub msg: String,
    /// True when the values come from an executed exchange order
    #[serde(default)]
    pub from_exchange: bool,
}

impl TradeResult {
    /// An empty, non-executed result carrying a message
    pub fn from_msg(symbol: Symbol, msg: impl Into<String>) -> Self {
        Self {
            symbol,
            quantity: 0.0,
            price: 0.0,
            cost: 0.0,
            commission: 0.0,
            commission_asset: None,
            profit: 0.0,
            msg: msg.into(),
            from_exchange: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.from_exchange
    }

    pub fn paid(&self) -> f64 {
        self.cost
    }

    pub fn gained(&self) -> f64 {
        self.cost
    }

    /// Merge a new fill into this one (repeated buys of the same asset)
    pub fn join(&self, next: &TradeResult) -> Result<TradeResult> {
        if self.symbol != next.symbol {
            return Err(Error::SymbolMismatch {
                left: self.symbol.to_string(),
                right: next.symbol.to_string(),
            });
        }
        if !self.from_exchange {
            return Ok(next.clone());
        }
        if !next.from_exchange {
            return Ok(self.clone());
        }

        let quantity = self.quantity + next.quantity;
        let cost = self.cost + next.cost;
        let price = if quantity > 0.0 { cost / quantity } else { next.price };
        let commission_asset = next
            .commission_asset
            .clone()
            .or_else(|| self.commission_asset.clone());

        Ok(TradeResult {
            symbol: self.symbol.clone(),
            quantity,
            price,
            cost,
            commission: self.commission + next.commission,
            commission_asset,
            profit: self.profit + next.profit,
            msg: next.msg.clone(),
            from_exchange: true,
        })
    }
}

impl fmt::Display for TradeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.from_exchange {
            return write!(f, "{}: {}", self.symbol, self.msg);
        }
        write!(
            f,
            "{}: qty={} price={} cost={:.2}",
            self.symbol, self.quantity, self.price, self.cost
        )?;
        if self.profit != 0.0 {
            write!(f, " profit={:.2}", self.profit)?;
        }
        if !self.msg.is_empty() {
            write!(f, " ({})", self.msg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(quantity: f64, price: f64) -> TradeResult {
        TradeResult {
            quantity,
            price,
            cost: quantity * price,
            from_exchange: true,
            ..TradeResult::from_msg(Symbol::new("BTC", "USDT"), "")
        }
    }

    #[test]
    fn test_symbol_display_and_split() {
        let symbol = Symbol::new("btc", "usdt");
        assert_eq!(symbol.to_string(), "BTCUSDT");
        assert_eq!(Symbol::from_pair("BTCUSDT", "USDT"), Some(symbol));
        assert_eq!(Symbol::from_pair("USDT", "USDT"), None);
        assert_eq!(Symbol::from_pair("ETHBTC", "USDT"), None);
    }

    #[test]
    fn test_asset_name_validation() {
        assert_eq!(asset_name(" eth ").unwrap(), "ETH");
        assert_eq!(asset_name("t").unwrap(), "T");
        assert!(asset_name("BT C").is_err());
        assert!(asset_name("").is_err());
    }

    #[test]
    fn test_join_weighted_average() {
        let joined = fill(1.0, 100.0).join(&fill(0.5, 200.0)).unwrap();
        assert!((joined.quantity - 1.5).abs() < 1e-9);
        assert!((joined.cost - 200.0).abs() < 1e-9);
        assert!((joined.price - 133.333).abs() < 0.01);
        assert!(joined.succeeded());
    }

    #[test]
    fn test_join_rejects_other_symbol() {
        let mut other = fill(1.0, 10.0);
        other.symbol = Symbol::new("ETH", "USDT");
        assert!(matches!(
            fill(1.0, 100.0).join(&other),
            Err(Error::SymbolMismatch { .. })
        ));
    }

    #[test]
    fn test_join_with_empty_marker_takes_new_fill() {
        let empty = TradeResult::from_msg(Symbol::new("BTC", "USDT"), "Asset sold");
        let joined = empty.join(&fill(2.0, 50.0)).unwrap();
        assert_eq!(joined, fill(2.0, 50.0));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&TradeState::Bought).unwrap(), "\"bought\"");
    }
}

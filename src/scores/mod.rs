//! Market-wide survivor scoring
//!
//! A coin scores a point when its price keeps rising while nearly the whole
//! market does not. [`survivors::Survivors`] maintains the scores,
//! [`score_trader::ScoreTrader`] optionally trades the best of them.

pub mod score_trader;
pub mod survivors;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::trade::window::{PriceWindow, TREND_LENGTH};

pub use score_trader::ScoreTrader;
pub use survivors::Survivors;

/// Maximum share of rising coins for a tick to count as "market down"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScoreSelectivity {
    #[serde(alias = "extreme")]
    Extreme,
    #[default]
    #[serde(alias = "high")]
    High,
    #[serde(alias = "moderate")]
    Moderate,
    #[serde(alias = "minimal")]
    Minimal,
}

impl ScoreSelectivity {
    pub fn threshold(&self) -> f64 {
        match self {
            ScoreSelectivity::Extreme => 0.005,
            ScoreSelectivity::High => 0.01,
            ScoreSelectivity::Moderate => 0.03,
            ScoreSelectivity::Minimal => 0.05,
        }
    }
}

impl fmt::Display for ScoreSelectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScoreSelectivity::Extreme => "EXTREME",
            ScoreSelectivity::High => "HIGH",
            ScoreSelectivity::Moderate => "MODERATE",
            ScoreSelectivity::Minimal => "MINIMAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinScore {
    pub coin_name: String,
    #[serde(default)]
    pub prices: PriceWindow,
    #[serde(default)]
    pub score: u32,
}

impl CoinScore {
    pub fn new(coin_name: impl Into<String>) -> Self {
        Self {
            coin_name: coin_name.into(),
            prices: PriceWindow::new(),
            score: 0,
        }
    }

    pub fn push_price(&mut self, price: f64) {
        self.prices.push(price);
    }

    pub fn price_goes_up(&self) -> bool {
        self.prices.goes_up(TREND_LENGTH)
    }

    pub fn increment(&mut self) {
        self.score += 1;
    }
}

/// Share of observed coins that went up or down on the last update
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketMove {
    pub up_percent: f64,
    pub down_percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectivity_parsing() {
        let s: ScoreSelectivity = serde_json::from_str("\"MODERATE\"").unwrap();
        assert_eq!(s, ScoreSelectivity::Moderate);
        let s: ScoreSelectivity = serde_json::from_str("\"extreme\"").unwrap();
        assert_eq!(s.threshold(), 0.005);
        assert_eq!(ScoreSelectivity::default().threshold(), 0.01);
    }
}

//! Exchange access
//!
//! Everything that talks to a market goes through the [`Exchange`] trait:
//! prices, free balances, and market orders. Business failures come back as
//! a [`TradeResult`] with `from_exchange == false`; only transport problems
//! are errors.

pub mod binance;
pub mod coinstats;
pub mod prices;
pub mod retry;
pub mod signer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

use crate::error::Result;
use crate::types::{PriceMap, Symbol, TradeResult};

pub use binance::BinanceClient;
pub use coinstats::CoinStatsClient;
pub use prices::PriceProvider;
pub use retry::RetryPolicy;

#[async_trait]
pub trait Exchange: Send + Sync {
    async fn get_price(&self, symbol: &Symbol) -> Result<f64>;

    /// Last price of every listed symbol
    async fn get_prices(&self) -> Result<PriceMap>;

    async fn get_free_balance(&self, asset: &str) -> Result<f64>;

    /// Spend `quote_cost` units of the quote asset
    async fn market_buy(&self, symbol: &Symbol, quote_cost: f64) -> Result<TradeResult>;

    /// Sell up to `quantity` units of the base asset
    async fn market_sell(&self, symbol: &Symbol, quantity: f64) -> Result<TradeResult>;
}

/// Source of the full price map, independent of order execution
#[async_trait]
pub trait PriceFeed: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_prices(&self) -> Result<PriceMap>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PriceProviderKind {
    #[default]
    Binance,
    CoinStats,
}

impl PriceProviderKind {
    /// Resolve a configured provider name, falling back to Binance
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "binance" | "" => PriceProviderKind::Binance,
            "coinstats" => PriceProviderKind::CoinStats,
            other => {
                error!(
                    "Unknown price provider: {}. Using Binance as price provider.",
                    other
                );
                PriceProviderKind::Binance
            }
        }
    }
}

impl fmt::Display for PriceProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceProviderKind::Binance => f.write_str("Binance"),
            PriceProviderKind::CoinStats => f.write_str("CoinStats"),
        }
    }
}

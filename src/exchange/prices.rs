//! Shared per-tick price snapshot
//!
//! The full symbol -> price map is fetched once and memoized in the cache
//! for [`PRICES_TTL`], so every consumer in a tick sees the same prices.
//! Each fresh fetch is also appended to a per-symbol [`PriceWindow`], which
//! gives the anomaly detector a short market-wide price history.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::PriceFeed;
use crate::cache::{Cache, LONG_TTL, PRICES_KEY, PRICES_TTL, PRICE_WINDOWS_KEY};
use crate::error::{Error, Result};
use crate::trade::PriceWindow;
use crate::types::{PriceMap, Symbol};

pub type PriceWindows = BTreeMap<String, PriceWindow>;

pub struct PriceProvider {
    feed: Arc<dyn PriceFeed>,
    cache: Arc<dyn Cache>,
}

impl PriceProvider {
    pub fn new(feed: Arc<dyn PriceFeed>, cache: Arc<dyn Cache>) -> Self {
        Self { feed, cache }
    }

    pub fn feed_name(&self) -> &'static str {
        self.feed.name()
    }

    /// Cached snapshot, refreshed from the feed when missing or expired
    pub async fn get_prices(&self) -> Result<PriceMap> {
        if let Some(raw) = self.cache.get(PRICES_KEY) {
            match serde_json::from_str::<PriceMap>(&raw) {
                Ok(prices) => return Ok(prices),
                Err(e) => warn!("Discarding unreadable cached prices: {}", e),
            }
        }

        let prices = self.feed.fetch_prices().await?;
        debug!("Fetched {} prices from {}", prices.len(), self.feed.name());
        self.cache
            .put(PRICES_KEY, serde_json::to_string(&prices)?, PRICES_TTL);
        self.record(&prices)?;
        Ok(prices)
    }

    pub async fn get_price(&self, symbol: &Symbol) -> Result<f64> {
        let prices = self.get_prices().await?;
        prices
            .get(&symbol.to_string())
            .copied()
            .ok_or_else(|| Error::PriceNotFound(symbol.to_string()))
    }

    fn load_windows(&self) -> PriceWindows {
        self.cache
            .get(PRICE_WINDOWS_KEY)
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(windows) => Some(windows),
                Err(e) => {
                    warn!("Discarding unreadable price windows: {}", e);
                    None
                }
            })
            .unwrap_or_default()
    }

    fn record(&self, prices: &PriceMap) -> Result<()> {
        let mut windows = self.load_windows();
        windows.retain(|symbol, _| prices.contains_key(symbol));
        for (symbol, price) in prices {
            windows.entry(symbol.clone()).or_default().push(*price);
        }
        self.cache
            .put(PRICE_WINDOWS_KEY, serde_json::to_string(&windows)?, LONG_TTL);
        Ok(())
    }

    /// Price history of every symbol quoted in `quote`, current snapshot included
    pub async fn windows(&self, quote: &str) -> Result<PriceWindows> {
        self.get_prices().await?;
        Ok(self
            .load_windows()
            .into_iter()
            .filter(|(symbol, _)| Symbol::from_pair(symbol, quote).is_some())
            .collect())
    }

    /// Drop the memoized snapshot so the next read hits the feed
    pub fn invalidate(&self) {
        self.cache.remove(PRICES_KEY);
    }
}

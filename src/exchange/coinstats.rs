//! CoinStats public price feed
//!
//! Prices are quoted in USD; they are keyed as `<COIN><stable coin>` so the
//! map lines up with exchange symbols.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::retry::{with_retry, RetryPolicy};
use super::PriceFeed;
use crate::error::{Error, Result};
use crate::types::PriceMap;

pub const COINSTATS_API: &str = "https://api.coinstats.app/public/v1";

#[derive(Debug, Deserialize)]
struct CoinsResponse {
    coins: Vec<Coin>,
}

#[derive(Debug, Deserialize)]
struct Coin {
    symbol: String,
    price: f64,
}

pub struct CoinStatsClient {
    client: Client,
    base_url: String,
    stable_coin: String,
    retry: RetryPolicy,
}

impl CoinStatsClient {
    pub fn new(base_url: &str, stable_coin: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            stable_coin: stable_coin.to_uppercase(),
            retry: RetryPolicy::prices(),
        })
    }

    async fn fetch_once(&self) -> Result<String> {
        let url = format!("{}/coins?skip=0&limit=2000&currency=USD", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Exchange {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(body)
    }
}

fn parse_coins(body: &str, stable_coin: &str) -> Result<PriceMap> {
    let response: CoinsResponse =
        serde_json::from_str(body).map_err(|e| Error::Decode(e.to_string()))?;
    Ok(response
        .coins
        .into_iter()
        .filter(|c| c.price > 0.0)
        .map(|c| (format!("{}{}", c.symbol.to_uppercase(), stable_coin), c.price))
        .collect())
}

#[async_trait]
impl PriceFeed for CoinStatsClient {
    fn name(&self) -> &'static str {
        "CoinStats"
    }

    async fn fetch_prices(&self) -> Result<PriceMap> {
        let this = self;
        let body = with_retry(self.retry, "coinstats", move || this.fetch_once()).await?;
        let prices = parse_coins(&body, &self.stable_coin)?;
        debug!("CoinStats returned {} prices", prices.len());
        Ok(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coins_keyed_by_stable_coin() {
        let body = r#"{"coins":[
            {"id":"bitcoin","symbol":"BTC","price":27000.5},
            {"id":"dead","symbol":"DEAD","price":0}
        ]}"#;
        let prices = parse_coins(body, "USDT").unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["BTCUSDT"], 27000.5);
    }
}

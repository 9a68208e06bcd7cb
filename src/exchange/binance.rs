//! Binance spot REST client
//!
//! Signed endpoints carry `timestamp` and `signature` query parameters and
//! the API key in the `X-MBX-APIKEY` header. Each HTTP round trip runs under
//! a [`RetryPolicy`]; response bodies are decoded once, after the retry loop,
//! so a malformed order response never causes a second order.
//!
//! Every order carries a fresh `newClientOrderId`. A retried order first
//! looks that id up and only posts again if the exchange never saw it.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Deserializer};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::retry::{with_retry, RetryPolicy};
use super::{signer, Exchange, PriceFeed};
use crate::clock::{self, Clock};
use crate::config::ExchangeConfig;
use crate::error::{Error, Result};
use crate::types::{PriceMap, Symbol, TradeResult};

pub const BINANCE_API: &str = "https://api.binance.com/api/v3";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Message of the -2013 error returned for an unknown order id
const UNKNOWN_ORDER: &str = "Order does not exist";

/// At most 36 characters from `[A-Za-z0-9._:/-]`
fn new_client_order_id() -> String {
    format!("st-{}", Uuid::new_v4().simple())
}

/// One order attempt. The first attempt posts; later attempts look the
/// order up first so a post whose response was lost is not repeated.
async fn order_attempt<L, P>(posted: &AtomicBool, lookup: L, post: P) -> Result<String>
where
    L: Future<Output = Result<String>>,
    P: Future<Output = Result<String>>,
{
    if posted.swap(true, Ordering::SeqCst) {
        match lookup.await {
            Ok(body) => {
                warn!("Order found by client id after a failed attempt");
                return Ok(body);
            }
            Err(Error::Exchange { message, .. }) if message.contains(UNKNOWN_ORDER) => {
                debug!("Order was never placed, posting again");
            }
            Err(e) => return Err(e),
        }
    }
    post.await
}

/// Binance encodes decimals as strings
fn de_decimal<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Decimal {
        Str(String),
        Num(f64),
    }

    match Decimal::deserialize(deserializer)? {
        Decimal::Str(s) => s.parse().map_err(serde::de::Error::custom),
        Decimal::Num(n) => Ok(n),
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    #[serde(deserialize_with = "de_decimal")]
    price: f64,
}

#[derive(Debug, Deserialize)]
struct Account {
    balances: Vec<Balance>,
}

#[derive(Debug, Deserialize)]
struct Balance {
    asset: String,
    #[serde(deserialize_with = "de_decimal")]
    free: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(deserialize_with = "de_decimal")]
    executed_qty: f64,
    #[serde(deserialize_with = "de_decimal")]
    cummulative_quote_qty: f64,
    #[serde(default)]
    fills: Vec<Fill>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fill {
    #[serde(deserialize_with = "de_decimal")]
    price: f64,
    #[serde(deserialize_with = "de_decimal")]
    commission: f64,
    commission_asset: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    msg: String,
}

pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    clock: Arc<dyn Clock>,
    price_retry: RetryPolicy,
    account_retry: RetryPolicy,
}

impl BinanceClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            clock: clock::system(),
            price_retry: RetryPolicy::prices(),
            account_retry: RetryPolicy::account(),
        })
    }

    pub fn with_retry_policies(mut self, prices: RetryPolicy, account: RetryPolicy) -> Self {
        self.price_retry = prices;
        self.account_retry = account;
        self
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    /// Single HTTP round trip returning the raw body
    async fn send_once(
        &self,
        method: Method,
        resource: &str,
        query: &str,
        signed: bool,
    ) -> Result<String> {
        let query = if signed {
            if !self.has_credentials() {
                return Err(Error::MissingCredentials(
                    "exchange.api_key and exchange.api_secret are required".to_string(),
                ));
            }
            signer::sign(&self.api_secret, query, self.clock.timestamp_millis())
        } else {
            query.to_string()
        };

        let url = if query.is_empty() {
            format!("{}/{}", self.base_url, resource)
        } else {
            format!("{}/{}?{}", self.base_url, resource, query)
        };

        let mut request = self.client.request(method, &url);
        if !self.api_key.is_empty() {
            request = request.header(API_KEY_HEADER, &self.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(status_error(status, &body))
        }
    }

    async fn send(
        &self,
        method: Method,
        resource: &str,
        query: &str,
        signed: bool,
        policy: RetryPolicy,
    ) -> Result<String> {
        let this = self;
        with_retry(policy, resource, move || {
            let method = method.clone();
            async move { this.send_once(method, resource, query, signed).await }
        })
        .await
    }

    async fn market_order(&self, symbol: &Symbol, query: String) -> Result<TradeResult> {
        let client_order_id = new_client_order_id();
        let post_query = format!("{}&newClientOrderId={}", query, client_order_id);
        let lookup_query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("symbol", &symbol.to_string())
            .append_pair("origClientOrderId", &client_order_id)
            .finish();
        let posted = AtomicBool::new(false);

        let this = self;
        let (post_query, lookup_query, posted) = (&post_query, &lookup_query, &posted);
        let body = with_retry(self.account_retry, "order", move || async move {
            order_attempt(
                posted,
                this.send_once(Method::GET, "order", lookup_query, true),
                this.send_once(Method::POST, "order", post_query, true),
            )
            .await
        })
        .await?;
        debug!(client_order_id = %client_order_id, "Order response: {}", body);

        let result = parse_order(symbol, &body)?;
        info!("{}", result);
        Ok(result)
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.msg)
        .unwrap_or_else(|_| body.to_string());
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        Error::RateLimited(message)
    } else {
        Error::Exchange {
            status: status.as_u16(),
            message,
        }
    }
}

/// Decimal amount as the exchange expects it in a query string
fn format_amount(value: f64) -> String {
    let s = format!("{:.8}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

fn parse_prices(body: &str) -> Result<PriceMap> {
    let tickers: Vec<TickerPrice> =
        serde_json::from_str(body).map_err(|e| Error::Decode(e.to_string()))?;
    Ok(tickers.into_iter().map(|t| (t.symbol, t.price)).collect())
}

/// Free balance of `asset`, 0 when the asset is absent or the body is malformed
fn parse_free_balance(asset: &str, body: &str) -> f64 {
    match serde_json::from_str::<Account>(body) {
        Ok(account) => account
            .balances
            .into_iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or(0.0),
        Err(e) => {
            error!("Malformed account response: {}", e);
            0.0
        }
    }
}

fn parse_order(symbol: &Symbol, body: &str) -> Result<TradeResult> {
    let order: OrderResponse =
        serde_json::from_str(body).map_err(|e| Error::Decode(e.to_string()))?;

    let price = match order.fills.first() {
        Some(fill) => fill.price,
        None if order.executed_qty > 0.0 => order.cummulative_quote_qty / order.executed_qty,
        None => 0.0,
    };

    Ok(TradeResult {
        quantity: order.executed_qty,
        price,
        cost: order.cummulative_quote_qty,
        commission: order.fills.iter().map(|f| f.commission).sum(),
        commission_asset: order.fills.first().map(|f| f.commission_asset.clone()),
        from_exchange: true,
        ..TradeResult::from_msg(symbol.clone(), "")
    })
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn get_price(&self, symbol: &Symbol) -> Result<f64> {
        let query = format!("symbol={}", symbol);
        let body = self
            .send(Method::GET, "ticker/price", &query, false, self.price_retry)
            .await?;
        let ticker: TickerPrice =
            serde_json::from_str(&body).map_err(|e| Error::Decode(e.to_string()))?;
        Ok(ticker.price)
    }

    async fn get_prices(&self) -> Result<PriceMap> {
        let body = self
            .send(Method::GET, "ticker/price", "", false, self.price_retry)
            .await?;
        parse_prices(&body)
    }

    async fn get_free_balance(&self, asset: &str) -> Result<f64> {
        let body = self
            .send(Method::GET, "account", "", true, self.account_retry)
            .await?;
        Ok(parse_free_balance(asset, &body))
    }

    async fn market_buy(&self, symbol: &Symbol, quote_cost: f64) -> Result<TradeResult> {
        let free = self.get_free_balance(&symbol.quote).await?;
        if free <= 0.0 || free < quote_cost {
            return Ok(TradeResult::from_msg(
                symbol.clone(),
                format!("NOT ENOUGH TO BUY: {}={}", symbol.quote, free),
            ));
        }

        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("symbol", &symbol.to_string())
            .append_pair("type", "MARKET")
            .append_pair("side", "BUY")
            .append_pair("quoteOrderQty", &format_amount(quote_cost))
            .finish();
        self.market_order(symbol, query).await
    }

    async fn market_sell(&self, symbol: &Symbol, quantity: f64) -> Result<TradeResult> {
        let free = self.get_free_balance(&symbol.base).await?;
        if free <= 0.0 {
            return Ok(TradeResult::from_msg(
                symbol.clone(),
                format!("NOT ENOUGH TO SELL: {}={}", symbol.base, free),
            ));
        }

        // Partial fills leave less than tracked; never sell more than we hold
        let quantity = if quantity > 0.0 { quantity.min(free) } else { free };

        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("symbol", &symbol.to_string())
            .append_pair("type", "MARKET")
            .append_pair("side", "SELL")
            .append_pair("quantity", &format_amount(quantity))
            .finish();
        self.market_order(symbol, query).await
    }
}

#[async_trait]
impl PriceFeed for BinanceClient {
    fn name(&self) -> &'static str {
        "Binance"
    }

    async fn fetch_prices(&self) -> Result<PriceMap> {
        self.get_prices().await
    }
}

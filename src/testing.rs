//! In-memory exchange and price feed for unit tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::exchange::{Exchange, PriceFeed};
use crate::store::{MemoryStore, Store};
use crate::types::{PriceMap, Symbol, TradeResult};

/// Exchange that fills market orders at configured prices
#[derive(Default)]
pub struct MockExchange {
    prices: Mutex<PriceMap>,
    balances: Mutex<HashMap<String, f64>>,
    commission: Mutex<Option<(f64, String)>>,
    fail_orders: AtomicBool,
    buys: AtomicU32,
    sells: AtomicU32,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn set_balance(&self, asset: &str, amount: f64) {
        self.balances.lock().unwrap().insert(asset.to_string(), amount);
    }

    pub fn set_commission(&self, amount: f64, asset: &str) {
        *self.commission.lock().unwrap() = Some((amount, asset.to_string()));
    }

    /// Make every order fail with a transport error
    pub fn fail_orders(&self) {
        self.fail_orders.store(true, Ordering::SeqCst);
    }

    pub fn buys(&self) -> u32 {
        self.buys.load(Ordering::SeqCst)
    }

    pub fn sells(&self) -> u32 {
        self.sells.load(Ordering::SeqCst)
    }

    fn balance(&self, asset: &str) -> f64 {
        self.balances.lock().unwrap().get(asset).copied().unwrap_or(0.0)
    }

    fn add_balance(&self, asset: &str, delta: f64) {
        *self
            .balances
            .lock()
            .unwrap()
            .entry(asset.to_string())
            .or_insert(0.0) += delta;
    }

    fn check_transport(&self) -> Result<()> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(Error::Http("connection reset by peer".to_string()));
        }
        Ok(())
    }

    fn fill(&self, symbol: &Symbol, quantity: f64, price: f64) -> TradeResult {
        let commission = self.commission.lock().unwrap().clone();
        TradeResult {
            quantity,
            price,
            cost: quantity * price,
            commission: commission.as_ref().map_or(0.0, |(c, _)| *c),
            commission_asset: commission.map(|(_, a)| a),
            from_exchange: true,
            ..TradeResult::from_msg(symbol.clone(), "")
        }
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn get_price(&self, symbol: &Symbol) -> Result<f64> {
        self.prices
            .lock()
            .unwrap()
            .get(&symbol.to_string())
            .copied()
            .ok_or_else(|| Error::PriceNotFound(symbol.to_string()))
    }

    async fn get_prices(&self) -> Result<PriceMap> {
        Ok(self.prices.lock().unwrap().clone())
    }

    async fn get_free_balance(&self, asset: &str) -> Result<f64> {
        Ok(self.balance(asset))
    }

    async fn market_buy(&self, symbol: &Symbol, quote_cost: f64) -> Result<TradeResult> {
        self.check_transport()?;
        let free = self.balance(&symbol.quote);
        if free <= 0.0 || free < quote_cost {
            return Ok(TradeResult::from_msg(
                symbol.clone(),
                format!("NOT ENOUGH TO BUY: {}={}", symbol.quote, free),
            ));
        }
        let price = self.get_price(symbol).await?;
        let quantity = quote_cost / price;
        self.add_balance(&symbol.quote, -quote_cost);
        self.add_balance(&symbol.base, quantity);
        self.buys.fetch_add(1, Ordering::SeqCst);
        Ok(self.fill(symbol, quantity, price))
    }

    async fn market_sell(&self, symbol: &Symbol, quantity: f64) -> Result<TradeResult> {
        self.check_transport()?;
        let free = self.balance(&symbol.base);
        if free <= 0.0 {
            return Ok(TradeResult::from_msg(
                symbol.clone(),
                format!("NOT ENOUGH TO SELL: {}={}", symbol.base, free),
            ));
        }
        let quantity = if quantity > 0.0 { quantity.min(free) } else { free };
        let price = self.get_price(symbol).await?;
        self.add_balance(&symbol.base, -quantity);
        self.add_balance(&symbol.quote, quantity * price);
        self.sells.fetch_add(1, Ordering::SeqCst);
        Ok(self.fill(symbol, quantity, price))
    }
}

/// Price feed returning a fixed, editable map
pub struct StaticFeed {
    prices: Mutex<PriceMap>,
    calls: AtomicU32,
}

impl StaticFeed {
    pub fn new(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: Mutex::new(prices.iter().map(|(s, p)| (s.to_string(), *p)).collect()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn set(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceFeed for StaticFeed {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch_prices(&self) -> Result<PriceMap> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.prices.lock().unwrap().clone())
    }
}

/// Store that refuses writes to a single key
pub struct RejectingStore {
    inner: MemoryStore,
    key: String,
}

impl RejectingStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            inner: MemoryStore::new(),
            key: key.into(),
        }
    }
}

impl Store for RejectingStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        if key == self.key {
            return Err(Error::Store(format!("write to {} rejected", key)));
        }
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }
}

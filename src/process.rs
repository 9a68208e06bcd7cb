//! Per-tick orchestration
//!
//! One [`Process::tick`] takes a single price snapshot and runs every
//! consumer against it in a fixed order: position memos, survivor scores,
//! automatic score trading, the stable coin balance snapshot and the
//! anomaly detector. A failing step is alerted and the tick moves on.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::alerts::AlertLog;
use crate::anomaly::{AnomalyDetector, PriceAnomaly};
use crate::cache::{Cache, MemoryCache};
use crate::clock::{self, Clock};
use crate::config::{Config, TradingConfig};
use crate::error::{Error, Result};
use crate::exchange::{
    BinanceClient, CoinStatsClient, Exchange, PriceFeed, PriceProvider, PriceProviderKind,
};
use crate::scores::{MarketMove, ScoreTrader, Survivors};
use crate::store::{set_typed, JsonFileStore, Statistics, Store, TradesDao, STABLE_COINS_KEY};
use crate::trade::Trader;
use crate::types::{PriceMap, TradeResult};

/// What one tick did
#[derive(Debug, Default)]
pub struct TickSummary {
    pub results: Vec<TradeResult>,
    pub market_move: Option<MarketMove>,
    pub anomalies: usize,
    pub digest: Option<String>,
}

pub struct Process {
    exchange: Arc<dyn Exchange>,
    prices: Arc<PriceProvider>,
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    trades: Arc<TradesDao>,
    stats: Arc<Statistics>,
    survivors: Arc<Survivors>,
    trading: TradingConfig,
    tick_deadline: Duration,
}

impl Process {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        feed: Arc<dyn PriceFeed>,
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        clock: Arc<dyn Clock>,
        trading: TradingConfig,
        tick_deadline: Duration,
    ) -> Self {
        Self {
            exchange,
            prices: Arc::new(PriceProvider::new(feed, cache.clone())),
            trades: Arc::new(TradesDao::new(store.clone())),
            stats: Arc::new(Statistics::new(store.clone(), clock)),
            survivors: Arc::new(Survivors::new(store.clone(), cache.clone())),
            store,
            cache,
            trading,
            tick_deadline,
        }
    }

    /// Wire the Binance client, the configured price feed and the JSON store
    pub fn from_config(config: &Config) -> Result<Self> {
        let binance = Arc::new(BinanceClient::new(&config.exchange)?);
        let feed: Arc<dyn PriceFeed> = match config.trading.price_provider_kind() {
            PriceProviderKind::Binance => binance.clone(),
            PriceProviderKind::CoinStats => Arc::new(CoinStatsClient::new(
                &config.exchange.coinstats_url,
                &config.trading.stable_coin,
                Duration::from_millis(config.exchange.request_timeout_ms),
            )?),
        };
        let store = Arc::new(JsonFileStore::open(&config.store.path)?);

        info!(
            "Using {} prices, store at {}",
            feed.name(),
            config.store.path
        );

        Ok(Self::new(
            binance,
            feed,
            store,
            Arc::new(MemoryCache::new()),
            clock::system(),
            config.trading.clone(),
            Duration::from_secs(config.scheduler.tick_deadline_secs),
        ))
    }

    pub fn trades(&self) -> Arc<TradesDao> {
        self.trades.clone()
    }

    pub fn survivors(&self) -> Arc<Survivors> {
        self.survivors.clone()
    }

    pub fn stats(&self) -> Arc<Statistics> {
        self.stats.clone()
    }

    pub fn prices(&self) -> Arc<PriceProvider> {
        self.prices.clone()
    }

    pub fn exchange(&self) -> Arc<dyn Exchange> {
        self.exchange.clone()
    }

    /// Trading rules for this tick, runtime overrides from the store applied
    pub fn effective_config(&self, alerts: &AlertLog) -> TradingConfig {
        match self.trading.with_store_overrides(self.store.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                alerts.alert("Ignoring invalid config override from store");
                alerts.error(&e);
                self.trading.clone()
            }
        }
    }

    pub async fn tick(&self) -> Result<TickSummary> {
        let alerts = Arc::new(AlertLog::new());
        let config = self.effective_config(&alerts);
        let prices = Arc::new(self.prices.get_prices().await?);

        let mut summary = TickSummary {
            results: self.trade_memos(&config, prices.clone(), alerts.clone()).await?,
            ..TickSummary::default()
        };

        match self
            .survivors
            .update(&prices, &config.stable_coin, config.score_selectivity)
        {
            Ok(market_move) => summary.market_move = Some(market_move),
            Err(e) => {
                alerts.alert("Failed to update scores");
                alerts.error(&e);
            }
        }

        let score_trader =
            ScoreTrader::new(self.survivors.clone(), self.trades.clone(), alerts.clone());
        if let Err(e) = score_trader.trade(&config) {
            alerts.alert("Failed to trade recommended coins");
            alerts.error(&e);
        }

        if let Err(e) = self.update_stable_coins_balance(&config).await {
            alerts.alert("Failed to read stable coins balance");
            alerts.error(&e);
        }

        match self.trade_anomalies(&config, alerts.clone()).await {
            Ok(count) => summary.anomalies = count,
            Err(e) => {
                alerts.alert("Failed to trade price anomalies");
                alerts.error(&e);
            }
        }

        summary.digest = alerts.digest();
        notify(summary.digest.as_deref());
        Ok(summary)
    }

    /// One [`Trader::tick`] per stored memo, bounded by the tick deadline
    async fn trade_memos(
        &self,
        config: &TradingConfig,
        prices: Arc<PriceMap>,
        alerts: Arc<AlertLog>,
    ) -> Result<Vec<TradeResult>> {
        let trader = Trader::new(
            self.exchange.clone(),
            self.trades.clone(),
            self.stats.clone(),
            alerts.clone(),
            config.clone(),
            prices,
        );
        let deadline = Instant::now() + self.tick_deadline;
        let mut results = Vec::new();

        for memo in self.trades.list()? {
            let coin = memo.coin_name().to_string();
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = if remaining.is_zero() {
                Err(Error::Deadline(coin.clone()))
            } else {
                timeout(remaining, trader.tick(memo))
                    .await
                    .unwrap_or_else(|_| Err(Error::Deadline(coin.clone())))
            };

            match outcome {
                Ok(result) => {
                    debug!(coin = %coin, "{}", result.msg);
                    results.push(result);
                }
                Err(e) if e.is_deadline() => alerts.debug_error(&e),
                Err(e) => {
                    warn!(coin = %coin, "Trade tick failed");
                    alerts.error(&e);
                }
            }
        }

        Ok(results)
    }

    async fn update_stable_coins_balance(&self, config: &TradingConfig) -> Result<()> {
        let balance = self.exchange.get_free_balance(&config.stable_coin).await?;
        let snapshot = BTreeMap::from([(config.stable_coin.clone(), balance)]);
        set_typed(self.store.as_ref(), STABLE_COINS_KEY, &snapshot)
    }

    async fn trade_anomalies(&self, config: &TradingConfig, alerts: Arc<AlertLog>) -> Result<usize> {
        let windows = self.prices.windows(&config.stable_coin).await?;
        let detector = AnomalyDetector::new(self.cache.clone(), self.trades.clone(), alerts);
        let detections = detector.trade(&windows, config)?;
        Ok(detections
            .iter()
            .filter(|(_, d)| matches!(d.anomaly, PriceAnomaly::Pump | PriceAnomaly::Dump))
            .count())
    }
}

/// Deliver the tick digest. Quiet ticks produce nothing.
fn notify(digest: Option<&str>) {
    if let Some(digest) = digest {
        warn!("{}", digest);
    }
}

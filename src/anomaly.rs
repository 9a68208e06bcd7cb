//! Pump and dump detection
//!
//! A strong price move starts a tracking period (kept alive while strong
//! moves repeat) and records the price the move started from. Once the
//! move calms down, the total change against that start price decides
//! whether it was a pump or a dump.
//!
//! All cache state for a tick is read in one batch and written back in one
//! batch; [`detect`] itself never touches the cache.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::alerts::AlertLog;
use crate::cache::{Cache, ExpirationEntries};
use crate::config::TradingConfig;
use crate::error::Result;
use crate::store::TradesDao;
use crate::trade::{PriceWindow, TradeActions};
use crate::types::{Symbol, TradeState};

/// A repeated strong move within this period extends the tracking
pub const TRACKING_TTL: Duration = Duration::from_secs(3 * 60);
pub const START_PRICE_TTL: Duration = Duration::from_secs(6 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceAnomaly {
    None,
    Pump,
    Dump,
    Tracking,
}

impl fmt::Display for PriceAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriceAnomaly::None => "NONE",
            PriceAnomaly::Pump => "PUMP",
            PriceAnomaly::Dump => "DUMP",
            PriceAnomaly::Tracking => "TRACKING",
        };
        f.write_str(s)
    }
}

pub fn tracking_key(symbol: &str) -> String {
    format!("{}-pump-dump-tracking", symbol)
}

pub fn start_price_key(symbol: &str) -> String {
    format!("{}-start-price", symbol)
}

/// `|current - start| / start` in percent
pub fn abs_percentage_change(start: f64, current: f64) -> f64 {
    if start == 0.0 {
        return 0.0;
    }
    ((current - start) / start * 100.0).abs()
}

/// Cache writes collected during one detection pass
#[derive(Debug, Default)]
pub struct CacheBatch {
    pub put: ExpirationEntries,
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub anomaly: PriceAnomaly,
    pub start_price: Option<f64>,
    pub current_price: f64,
    pub percent: f64,
}

impl Detection {
    fn quiet(anomaly: PriceAnomaly, current_price: f64) -> Self {
        Self {
            anomaly,
            start_price: None,
            current_price,
            percent: 0.0,
        }
    }
}

/// Classify one symbol.
///
/// `cached` is the batch read of tracking keys. Cache changes are added
/// to `batch`.
pub fn detect(
    symbol: &str,
    window: &PriceWindow,
    cached: &HashMap<String, String>,
    alert_threshold: f64,
    strong_move: f64,
    batch: &mut CacheBatch,
) -> Detection {
    let tracking_key = tracking_key(symbol);
    let start_key = start_price_key(symbol);
    let current = window.latest().unwrap_or(0.0);
    let start = cached.get(&start_key).and_then(|v| v.parse::<f64>().ok());

    let strong_up = window.strong_up(strong_move);
    let strong_down = window.strong_down(strong_move);

    if cached.contains_key(&tracking_key) || strong_up || strong_down {
        batch
            .put
            .insert(tracking_key, ("true".to_string(), TRACKING_TTL));
        let anchor = start.or_else(|| if strong_up { window.min() } else { window.max() });
        if let Some(anchor) = anchor {
            batch
                .put
                .insert(start_key, (anchor.to_string(), START_PRICE_TTL));
        }
        return Detection {
            start_price: anchor,
            ..Detection::quiet(PriceAnomaly::Tracking, current)
        };
    }

    let Some(start) = start else {
        return Detection::quiet(PriceAnomaly::None, current);
    };
    batch.remove.push(start_key);

    let percent = abs_percentage_change(start, current);
    let anomaly = if alert_threshold > 0.0 && percent < alert_threshold {
        PriceAnomaly::None
    } else if start > current {
        PriceAnomaly::Dump
    } else if start < current {
        PriceAnomaly::Pump
    } else {
        PriceAnomaly::None
    };

    Detection {
        anomaly,
        start_price: Some(start),
        current_price: current,
        percent,
    }
}

pub struct AnomalyDetector {
    cache: Arc<dyn Cache>,
    trades: Arc<TradesDao>,
    alerts: Arc<AlertLog>,
}

impl AnomalyDetector {
    pub fn new(cache: Arc<dyn Cache>, trades: Arc<TradesDao>, alerts: Arc<AlertLog>) -> Self {
        Self {
            cache,
            trades,
            alerts,
        }
    }

    /// Classify every `<coin><stable coin>` window and act on the results
    pub fn trade(
        &self,
        windows: &BTreeMap<String, PriceWindow>,
        config: &TradingConfig,
    ) -> Result<Vec<(Symbol, Detection)>> {
        let symbols: Vec<(String, Symbol)> = windows
            .keys()
            .filter_map(|pair| Symbol::from_pair(pair, &config.stable_coin).map(|s| (pair.clone(), s)))
            .collect();

        let keys: Vec<String> = symbols
            .iter()
            .flat_map(|(pair, _)| [tracking_key(pair), start_price_key(pair)])
            .collect();
        let cached = self.cache.get_all(&keys);

        let mut batch = CacheBatch::default();
        let mut detections = Vec::with_capacity(symbols.len());
        for (pair, symbol) in symbols {
            let detection = detect(
                &pair,
                &windows[&pair],
                &cached,
                config.price_anomaly_alert,
                config.strong_move,
                &mut batch,
            );
            detections.push((symbol, detection));
        }

        debug!(
            puts = batch.put.len(),
            removes = batch.remove.len(),
            "Applying anomaly cache batch"
        );
        self.cache.put_all(batch.put);
        self.cache.remove_all(&batch.remove);

        for (symbol, detection) in &detections {
            if let Err(e) = self.handle(symbol, detection, config) {
                warn!(symbol = %symbol, "Anomaly handling failed");
                self.alerts.error(&e);
            }
        }
        Ok(detections)
    }

    fn handle(&self, symbol: &Symbol, detection: &Detection, config: &TradingConfig) -> Result<()> {
        let start = detection.start_price.unwrap_or_default();
        match detection.anomaly {
            PriceAnomaly::Dump => {
                self.alerts.alert(format!(
                    "{} price dumped for {:.2}%: {} -> {}",
                    symbol.base, detection.percent, start, detection.current_price
                ));
                if config.buy_dumps {
                    self.alerts.alert(format!(
                        "Buying price dumps is enabled: {} will be bought.",
                        symbol.base
                    ));
                    TradeActions::new(self.trades.clone(), config.stable_coin.as_str())
                        .buy_symbol(symbol.clone())?;
                }
            }
            PriceAnomaly::Pump => {
                self.alerts.alert(format!(
                    "{} price pumped for {:.2}%: {} -> {}",
                    symbol.base, detection.percent, start, detection.current_price
                ));
                if config.sell_pumps {
                    let alerts = &self.alerts;
                    self.trades.change(&symbol.base, |memo| {
                        memo.map(|m| {
                            if m.state_is(TradeState::Bought) && m.profit() > 0.0 {
                                alerts.alert(format!(
                                    "Selling price pumps is enabled: {} will be sold.",
                                    symbol.base
                                ));
                                m.with_state(TradeState::Sell)
                            } else {
                                m
                            }
                        })
                    })?;
                }
            }
            PriceAnomaly::Tracking => {
                info!("{} strong move, tracking since {}", symbol, start);
            }
            PriceAnomaly::None => {}
        }
        Ok(())
    }
}

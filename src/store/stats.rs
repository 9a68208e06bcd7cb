//! Realized profit statistics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::{get_typed, set_typed, Store, STATISTICS_KEY};
use crate::clock::Clock;
use crate::error::Result;

/// Per-day trading statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub total_profit: f64,
    pub total_loss: f64,
    pub net_pnl: f64,
}

impl DailyStats {
    pub fn record_trade(&mut self, pnl: f64) {
        self.total_trades += 1;
        if pnl >= 0.0 {
            self.winning_trades += 1;
            self.total_profit += pnl;
        } else {
            self.losing_trades += 1;
            self.total_loss += pnl.abs();
        }
        self.net_pnl = self.total_profit - self.total_loss;
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        (self.winning_trades as f64 / self.total_trades as f64) * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_profit: f64,
    /// Keyed by UTC date, `YYYY-MM-DD`
    #[serde(default)]
    pub daily: BTreeMap<String, DailyStats>,
}

pub struct Statistics {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Statistics {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn get(&self) -> Result<StatsSnapshot> {
        Ok(get_typed(self.store.as_ref(), STATISTICS_KEY)?.unwrap_or_default())
    }

    pub fn total_profit(&self) -> Result<f64> {
        Ok(self.get()?.total_profit)
    }

    /// Record one closed trade and return the new total
    pub fn add_profit(&self, profit: f64) -> Result<f64> {
        let mut stats = self.get()?;
        let day = self.clock.now().format("%Y-%m-%d").to_string();

        stats.total_profit += profit;
        stats.daily.entry(day).or_default().record_trade(profit);
        set_typed(self.store.as_ref(), STATISTICS_KEY, &stats)?;

        info!(profit, total = stats.total_profit, "Profit recorded");
        Ok(stats.total_profit)
    }
}

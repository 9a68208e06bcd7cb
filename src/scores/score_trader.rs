//! Automatic trading of the best survivor scores

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::Survivors;
use crate::alerts::AlertLog;
use crate::config::TradingConfig;
use crate::error::Result;
use crate::store::TradesDao;
use crate::trade::TradeActions;
use crate::types::{Symbol, TradeState};

pub struct ScoreTrader {
    survivors: Arc<Survivors>,
    trades: Arc<TradesDao>,
    alerts: Arc<AlertLog>,
}

impl ScoreTrader {
    pub fn new(survivors: Arc<Survivors>, trades: Arc<TradesDao>, alerts: Arc<AlertLog>) -> Self {
        Self {
            survivors,
            trades,
            alerts,
        }
    }

    fn report(&self, coin: &str, outcome: Result<()>) {
        if let Err(e) = outcome {
            warn!(coin, "Score trade failed");
            self.alerts.error(&e);
        }
    }

    /// With `auto_trade_best_scores = N > 0`: request buys for the top N
    /// untracked coins, drop sold coins that fell out of the top N, and
    /// cancel pending buys that fell out of it. A failing coin is reported
    /// and skipped.
    pub fn trade(&self, config: &TradingConfig) -> Result<()> {
        let top = config.auto_trade_best_scores;
        if top == 0 {
            return Ok(());
        }

        let mut recommended = self.survivors.get_scores(&config.stable_coin)?;
        recommended.truncate(top);
        let is_recommended =
            |coin: &str| recommended.iter().any(|score| score.coin_name == coin);

        let actions = TradeActions::new(self.trades.clone(), config.stable_coin.as_str());

        for score in &recommended {
            let outcome = self.trades.has(&score.coin_name).and_then(|tracked| {
                if !tracked {
                    info!(
                        "{} has score {}, requesting buy",
                        score.coin_name, score.score
                    );
                    let symbol = Symbol::new(score.coin_name.as_str(), config.stable_coin.as_str());
                    actions.buy_symbol(symbol)?;
                }
                Ok(())
            });
            self.report(&score.coin_name, outcome);
        }

        for memo in self.trades.list_in(TradeState::Sold)? {
            if !is_recommended(memo.coin_name()) {
                debug!("{} left the recommendations, dropping", memo.coin_name());
                self.report(memo.coin_name(), actions.drop(memo.coin_name()));
            }
        }

        for memo in self.trades.list_in(TradeState::Buy)? {
            if !is_recommended(memo.coin_name()) {
                debug!("{} left the recommendations, cancelling buy", memo.coin_name());
                self.report(memo.coin_name(), actions.cancel(memo.coin_name()).map(|_| ()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::scores::ScoreSelectivity;
    use crate::store::MemoryStore;
    use crate::testing::RejectingStore;
    use crate::trade::PositionMemo;
    use crate::types::PriceMap;

    #[test]
    fn test_trades_top_scores() {
        let store = Arc::new(MemoryStore::new());
        let survivors = Arc::new(Survivors::new(store.clone(), Arc::new(MemoryCache::new())));
        let trades = Arc::new(TradesDao::new(store));

        // COIN7 is the only one rising among 100 coins
        for step in 0..3 {
            let prices: PriceMap = (0..100)
                .map(|i| {
                    let bump = if i == 7 { step as f64 } else { 0.0 };
                    (format!("COIN{}USDT", i), 10.0 + bump)
                })
                .collect();
            survivors
                .update(&prices, "USDT", ScoreSelectivity::High)
                .unwrap();
        }

        trades
            .set(&PositionMemo::buy_request(Symbol::new("OLD", "USDT")))
            .unwrap();
        trades
            .set(&PositionMemo::buy_request(Symbol::new("GONE", "USDT")).with_price(1.0).sold())
            .unwrap();

        let config = TradingConfig {
            auto_trade_best_scores: 3,
            ..TradingConfig::default()
        };
        ScoreTrader::new(survivors, trades.clone(), Arc::new(AlertLog::new()))
            .trade(&config)
            .unwrap();

        assert!(trades.get("COIN7").unwrap().unwrap().state_is(TradeState::Buy));
        assert!(!trades.has("OLD").unwrap());
        assert!(!trades.has("GONE").unwrap());
    }

    #[test]
    fn test_failing_coin_is_skipped() {
        let store = Arc::new(RejectingStore::new("trade/AAA"));
        let survivors = Arc::new(Survivors::new(store.clone(), Arc::new(MemoryCache::new())));
        let trades = Arc::new(TradesDao::new(store));

        // T and AAA rise among 100 USDT pairs and 100 BTC pairs
        for step in 0..3 {
            let mut prices: PriceMap = (0..98)
                .map(|i| (format!("COIN{}USDT", i), 10.0))
                .chain((0..100).map(|i| (format!("COIN{}BTC", i), 0.001)))
                .collect();
            prices.insert("TUSDT".to_string(), 1.0 + step as f64);
            prices.insert("AAAUSDT".to_string(), 1.0 + step as f64);
            survivors
                .update(&prices, "USDT", ScoreSelectivity::High)
                .unwrap();
        }
        trades
            .set(&PositionMemo::buy_request(Symbol::new("OLD", "USDT")))
            .unwrap();

        let alerts = Arc::new(AlertLog::new());
        let config = TradingConfig {
            auto_trade_best_scores: 5,
            ..TradingConfig::default()
        };
        ScoreTrader::new(survivors, trades.clone(), alerts.clone())
            .trade(&config)
            .unwrap();

        assert!(trades.get("T").unwrap().unwrap().state_is(TradeState::Buy));
        assert!(!trades.has("AAA").unwrap());
        assert!(!trades.has("OLD").unwrap());
        assert_eq!(alerts.errors().len(), 1);
    }
}

//! Per-asset decision engine
//!
//! [`Trader::tick`] runs exactly one decision for one memo against the
//! tick's price snapshot: execute a pending request, sell at a limit, trail
//! the stop limit, or keep the asset.

use std::sync::Arc;
use tracing::{debug, info};

use super::PositionMemo;
use crate::alerts::AlertLog;
use crate::config::TradingConfig;
use crate::error::{Error, Result};
use crate::exchange::Exchange;
use crate::store::{Statistics, TradesDao};
use crate::types::{PriceMap, Symbol, TradeResult, TradeState};

pub struct Trader {
    exchange: Arc<dyn Exchange>,
    trades: Arc<TradesDao>,
    stats: Arc<Statistics>,
    alerts: Arc<AlertLog>,
    config: TradingConfig,
    prices: Arc<PriceMap>,
}

impl Trader {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        trades: Arc<TradesDao>,
        stats: Arc<Statistics>,
        alerts: Arc<AlertLog>,
        config: TradingConfig,
        prices: Arc<PriceMap>,
    ) -> Self {
        Self {
            exchange,
            trades,
            stats,
            alerts,
            config,
            prices,
        }
    }

    fn price_of(&self, symbol: &Symbol) -> Result<f64> {
        let price = self
            .prices
            .get(&symbol.to_string())
            .copied()
            .ok_or_else(|| Error::PriceNotFound(symbol.to_string()))?;
        debug!("Symbol price: {} = {}", symbol, price);
        Ok(price)
    }

    /// Stop distance as a fraction of the buy price
    fn loss_limit(&self) -> Result<f64> {
        if self.config.profit_based_stop_limit && self.config.buy_quantity > 0.0 {
            let total = self.stats.total_profit()?;
            if total > 0.0 {
                return Ok((total / self.config.buy_quantity).min(1.0));
            }
        }
        Ok(self.config.stop_limit)
    }

    /// Run one decision for `memo` and persist the outcome
    pub async fn tick(&self, memo: PositionMemo) -> Result<TradeResult> {
        if memo.state_is(TradeState::Sell) {
            return self.sell_and_close(memo).await;
        }

        let price = self.price_of(memo.symbol())?;
        let memo = memo.with_price(price);

        match memo.state {
            TradeState::Buy => self.tick_buy(memo).await,
            TradeState::Sold => self.tick_sold(memo),
            _ => self.tick_bought(memo).await,
        }
    }

    async fn tick_buy(&self, memo: PositionMemo) -> Result<TradeResult> {
        let symbol = memo.symbol().clone();
        if !memo.price_goes_up() {
            self.trades.set(&memo)?;
            return Ok(TradeResult::from_msg(
                symbol,
                "Not buying yet. Price is not going up",
            ));
        }

        let fill = self
            .exchange
            .market_buy(&symbol, self.config.buy_quantity)
            .await?;
        if !fill.succeeded() {
            self.alerts.alert(format!("{}: buy failed: {}", symbol, fill.msg));
            self.trades.set(&memo)?;
            return Ok(fill);
        }
        self.alerts.alert(fill.to_string());

        let had_position = memo.has_position();
        let fill_price = fill.price;
        let mut memo = memo.join_trade(fill)?;
        if !had_position {
            memo = memo.with_restarted_prices(fill_price);
        }

        let stop_limit = memo.trade_result.price * (1.0 - self.loss_limit()?);
        let memo = memo.with_stop_limit(stop_limit);
        self.trades.set(&memo)?;
        info!("{} stop limit saved: {}", symbol, stop_limit);

        Ok(memo.trade_result)
    }

    fn tick_sold(&self, memo: PositionMemo) -> Result<TradeResult> {
        let symbol = memo.symbol().clone();
        let swing_entry = self.config.swing_trade_enabled
            && memo.price_goes_up()
            && memo.current_price() < memo.trade_result.price;

        if swing_entry {
            let memo = memo.with_state(TradeState::Buy);
            self.trades.set(&memo)?;
            self.alerts.info(format!(
                "{}: price recovering below last sale, requesting buy",
                symbol
            ));
            return Ok(TradeResult::from_msg(symbol, "Swing trade: buy requested"));
        }

        self.trades.set(&memo)?;
        Ok(TradeResult::from_msg(symbol, "Asset sold"))
    }

    async fn tick_bought(&self, memo: PositionMemo) -> Result<TradeResult> {
        let symbol = memo.symbol().clone();
        let price = memo.current_price();
        let goes_up = memo.price_goes_up();

        if price <= memo.stop_limit_price {
            if memo.stop_limit_crossed_down() {
                self.alerts.alert(format!(
                    "{}: crossed stop limit: price '{}' <= '{}'",
                    symbol, price, memo.stop_limit_price
                ));
            }
            if !memo.hold && self.config.sell_at_stop_limit {
                return self.sell_and_close(memo).await;
            }
        }

        let profit_limit_price = memo.profit_limit_price(self.config.profit_limit);
        if price >= profit_limit_price {
            if memo.profit_limit_crossed_up(self.config.profit_limit) {
                self.alerts.alert(format!(
                    "{}: crossed profit limit: price '{}' >= '{}'",
                    symbol, price, profit_limit_price
                ));
            }
            // Riding the trend, held, or profit taking disabled
            if !goes_up && !memo.hold && self.config.sell_at_profit_limit {
                return self.sell_and_close(memo).await;
            }
        }

        let mut memo = memo;
        if goes_up {
            if let Some(previous) = memo.prices.previous() {
                let trailed = previous * (1.0 - self.loss_limit()?);
                if trailed > memo.stop_limit_price {
                    debug!("{} price goes up, stop limit {} -> {}", symbol, memo.stop_limit_price, trailed);
                    memo = memo.with_stop_limit(trailed);
                }
            }
        }

        self.trades.set(&memo)?;
        info!(
            "{} asset kept. Stop limit price: '{}'",
            symbol, memo.stop_limit_price
        );
        Ok(TradeResult::from_msg(symbol, "Keeping the asset"))
    }

    /// Commission expressed in the quote asset
    fn commission_cost(&self, result: &TradeResult) -> f64 {
        match result.commission_asset.as_deref() {
            None => 0.0,
            Some(asset) if asset == result.symbol.quote => result.commission,
            Some(asset) => {
                let pair = format!("{}{}", asset, result.symbol.quote);
                self.prices
                    .get(&pair)
                    .map(|price| result.commission * price)
                    .unwrap_or(0.0)
            }
        }
    }

    /// Sell the tracked quantity and stop tracking the asset.
    ///
    /// The memo is stored in SELL state first, so a transport failure
    /// leaves the request for the next tick.
    async fn sell_and_close(&self, memo: PositionMemo) -> Result<TradeResult> {
        let memo = memo.with_state(TradeState::Sell);
        self.trades.set(&memo)?;

        let symbol = memo.symbol().clone();
        let mut result = self
            .exchange
            .market_sell(&symbol, memo.trade_result.quantity)
            .await?;

        if result.succeeded() {
            let buy_commission = self.commission_cost(&memo.trade_result);
            let sell_commission = self.commission_cost(&result);
            debug!(
                "{} commission: buy ~{}, sell ~{}",
                symbol, buy_commission, sell_commission
            );
            let profit =
                result.gained() - memo.trade_result.paid() - buy_commission - sell_commission;
            result.profit = (profit * 100.0).round() / 100.0;
            self.alerts.alert(result.to_string());
            self.stats.add_profit(result.profit)?;

            if self.config.averaging_down && result.profit > 0.0 {
                self.average_down(&symbol)?;
            }
        } else {
            self.alerts.alert(format!("{}: sell failed: {}", symbol, result.msg));
        }

        if self.config.swing_trade_enabled {
            let exit_price = if result.succeeded() {
                result.price
            } else {
                memo.trade_result.price
            };
            self.trades.set(&memo.sold_at(exit_price))?;
        } else {
            self.trades.delete(memo.coin_name())?;
        }

        Ok(result)
    }

    /// Put profit to work on the worst losing position
    fn average_down(&self, sold: &Symbol) -> Result<()> {
        let worst = self
            .trades
            .list_in(TradeState::Bought)?
            .into_iter()
            .filter(|m| m.symbol() != sold && m.profit() < 0.0)
            .min_by(|a, b| a.profit_percent().total_cmp(&b.profit_percent()));

        if let Some(memo) = worst {
            self.alerts.info(format!(
                "Averaging down is enabled: buying more {}",
                memo.coin_name()
            ));
            self.trades.set(&memo.with_state(TradeState::Buy))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;
    use crate::testing::MockExchange;

    struct Fixture {
        exchange: Arc<MockExchange>,
        trades: Arc<TradesDao>,
        stats: Arc<Statistics>,
        alerts: Arc<AlertLog>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            Self {
                exchange: Arc::new(MockExchange::new()),
                trades: Arc::new(TradesDao::new(store.clone())),
                stats: Arc::new(Statistics::new(store, Arc::new(SystemClock))),
                alerts: Arc::new(AlertLog::new()),
            }
        }

        fn trader(&self, config: &TradingConfig, prices: &[(&str, f64)]) -> Trader {
            let prices: PriceMap = prices.iter().map(|(s, p)| (s.to_string(), *p)).collect();
            Trader::new(
                self.exchange.clone(),
                self.trades.clone(),
                self.stats.clone(),
                self.alerts.clone(),
                config.clone(),
                Arc::new(prices),
            )
        }

        async fn tick_at(&self, config: &TradingConfig, coin: &str, price: f64) -> TradeResult {
            let memo = self.trades.get(coin).unwrap().unwrap();
            let pair = format!("{}USDT", coin);
            self.trader(config, &[(pair.as_str(), price)])
                .tick(memo)
                .await
                .unwrap()
        }
    }

    fn config() -> TradingConfig {
        TradingConfig {
            buy_quantity: 100.0,
            stop_limit: 0.05,
            profit_limit: 0.1,
            ..TradingConfig::default()
        }
    }

    fn bought_memo(coin: &str, quantity: f64, price: f64, stop: f64) -> PositionMemo {
        let fill = TradeResult {
            quantity,
            price,
            cost: quantity * price,
            from_exchange: true,
            ..TradeResult::from_msg(Symbol::new(coin, "USDT"), "")
        };
        PositionMemo::buy_request(Symbol::new(coin, "USDT"))
            .join_trade(fill)
            .unwrap()
            .with_restarted_prices(price)
            .with_stop_limit(stop)
    }

    #[tokio::test]
    async fn test_stop_limit_sells_and_closes() {
        let fx = Fixture::new();
        let config = config();
        fx.exchange.set_balance("BTC", 1.0);
        fx.trades.set(&bought_memo("BTC", 1.0, 100.0, 95.0)).unwrap();

        fx.tick_at(&config, "BTC", 98.0).await;
        let memo = fx.trades.get("BTC").unwrap().unwrap();
        assert_eq!(memo.stop_limit_price, 95.0);
        assert_eq!(memo.prices.as_slice(), &[100.0, 100.0, 100.0, 98.0]);

        fx.exchange.set_price("BTCUSDT", 94.0);
        let result = fx.tick_at(&config, "BTC", 94.0).await;

        assert!(result.succeeded());
        assert!((result.profit + 6.0).abs() < 1e-9);
        assert!(fx.trades.get("BTC").unwrap().is_none());
        assert_eq!(fx.exchange.sells(), 1);
        assert!(fx
            .alerts
            .alerts()
            .iter()
            .any(|a| a.contains("crossed stop limit")));
        assert!((fx.stats.total_profit().unwrap() + 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_hold_keeps_asset_below_stop() {
        let fx = Fixture::new();
        let config = config();
        fx.trades
            .set(&bought_memo("BTC", 1.0, 100.0, 95.0).with_hold(true))
            .unwrap();

        let result = fx.tick_at(&config, "BTC", 90.0).await;
        assert!(!result.succeeded());
        assert!(fx.trades.get("BTC").unwrap().is_some());
        assert_eq!(fx.exchange.sells(), 0);
    }

    #[tokio::test]
    async fn test_stop_limit_trails_rising_price() {
        let fx = Fixture::new();
        let config = config();
        fx.trades.set(&bought_memo("BTC", 1.0, 100.0, 95.0)).unwrap();

        fx.tick_at(&config, "BTC", 101.0).await;
        fx.tick_at(&config, "BTC", 102.0).await;

        let memo = fx.trades.get("BTC").unwrap().unwrap();
        // previous price 101 * 0.95
        assert!((memo.stop_limit_price - 95.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_profit_limit_waits_while_rising() {
        let fx = Fixture::new();
        let config = config();
        fx.exchange.set_balance("BTC", 1.0);
        fx.trades.set(&bought_memo("BTC", 1.0, 100.0, 95.0)).unwrap();

        fx.tick_at(&config, "BTC", 105.0).await;
        fx.tick_at(&config, "BTC", 111.0).await;
        assert_eq!(fx.exchange.sells(), 0, "still going up");

        fx.exchange.set_price("BTCUSDT", 110.5);
        let result = fx.tick_at(&config, "BTC", 110.5).await;
        assert!(result.succeeded());
        assert!((result.profit - 10.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_buy_waits_for_uptrend() {
        let fx = Fixture::new();
        let config = config();
        fx.exchange.set_balance("USDT", 1000.0);
        fx.trades
            .set(&PositionMemo::buy_request(Symbol::new("ETH", "USDT")))
            .unwrap();

        let res = fx.tick_at(&config, "ETH", 10.0).await;
        assert_eq!(res.msg, "Not buying yet. Price is not going up");
        fx.tick_at(&config, "ETH", 11.0).await;

        fx.exchange.set_price("ETHUSDT", 12.0);
        let res = fx.tick_at(&config, "ETH", 12.0).await;
        assert!(res.succeeded());

        let memo = fx.trades.get("ETH").unwrap().unwrap();
        assert!(memo.state_is(TradeState::Bought));
        assert_eq!(memo.prices.as_slice(), &[12.0, 12.0, 12.0]);
        assert!((memo.stop_limit_price - 11.4).abs() < 1e-9);
        assert_eq!(fx.exchange.buys(), 1);
    }

    #[tokio::test]
    async fn test_failed_buy_stays_requested() {
        let fx = Fixture::new();
        let config = config();
        let memo = PositionMemo::buy_request(Symbol::new("ETH", "USDT"))
            .with_price(10.0)
            .with_price(11.0);
        fx.trades.set(&memo).unwrap();

        let res = fx.tick_at(&config, "ETH", 12.0).await;
        assert!(!res.succeeded());
        assert!(res.msg.starts_with("NOT ENOUGH TO BUY"));
        assert!(fx
            .trades
            .get("ETH")
            .unwrap()
            .unwrap()
            .state_is(TradeState::Buy));
    }

    #[tokio::test]
    async fn test_transport_error_keeps_sell_request() {
        let fx = Fixture::new();
        let config = config();
        fx.exchange.fail_orders();
        fx.trades
            .set(&bought_memo("BTC", 1.0, 100.0, 95.0).with_state(TradeState::Sell))
            .unwrap();

        let memo = fx.trades.get("BTC").unwrap().unwrap();
        let res = fx.trader(&config, &[("BTCUSDT", 100.0)]).tick(memo).await;
        assert!(res.is_err());
        assert!(fx
            .trades
            .get("BTC")
            .unwrap()
            .unwrap()
            .state_is(TradeState::Sell));
    }

    #[tokio::test]
    async fn test_failed_sell_result_still_closes() {
        let fx = Fixture::new();
        let config = config();
        fx.trades
            .set(&bought_memo("BTC", 1.0, 100.0, 95.0).with_state(TradeState::Sell))
            .unwrap();

        let res = fx.tick_at(&config, "BTC", 100.0).await;
        assert!(res.msg.starts_with("NOT ENOUGH TO SELL"));
        assert!(fx.trades.get("BTC").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_swing_trade_keeps_sold_memo() {
        let fx = Fixture::new();
        let config = TradingConfig {
            swing_trade_enabled: true,
            ..config()
        };
        fx.exchange.set_balance("BTC", 1.0);
        fx.exchange.set_price("BTCUSDT", 120.0);
        fx.trades
            .set(&bought_memo("BTC", 1.0, 100.0, 95.0).with_state(TradeState::Sell))
            .unwrap();

        fx.tick_at(&config, "BTC", 120.0).await;
        let memo = fx.trades.get("BTC").unwrap().unwrap();
        assert!(memo.state_is(TradeState::Sold));
        assert_eq!(memo.trade_result.price, 120.0);

        fx.tick_at(&config, "BTC", 110.0).await;
        assert!(fx.trades.get("BTC").unwrap().unwrap().state_is(TradeState::Sold));

        // [100, 110, 111] rises while still below the 120 exit
        let res = fx.tick_at(&config, "BTC", 111.0).await;
        assert_eq!(res.msg, "Swing trade: buy requested");
        let memo = fx.trades.get("BTC").unwrap().unwrap();
        assert!(memo.state_is(TradeState::Buy));
    }

    #[tokio::test]
    async fn test_commission_counts_against_profit() {
        let fx = Fixture::new();
        let config = config();
        fx.exchange.set_balance("BTC", 1.0);
        fx.exchange.set_price("BTCUSDT", 110.0);
        fx.exchange.set_commission(0.01, "BNB");

        let mut memo = bought_memo("BTC", 1.0, 100.0, 95.0).with_state(TradeState::Sell);
        memo.trade_result.commission = 0.01;
        memo.trade_result.commission_asset = Some("BNB".to_string());
        fx.trades.set(&memo).unwrap();

        let res = fx
            .trader(&config, &[("BTCUSDT", 110.0), ("BNBUSDT", 300.0)])
            .tick(memo)
            .await
            .unwrap();
        // 110 - 100 - 3 - 3
        assert!((res.profit - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_averaging_down_after_profit() {
        let fx = Fixture::new();
        let config = TradingConfig {
            averaging_down: true,
            ..config()
        };
        fx.exchange.set_balance("BTC", 1.0);
        fx.exchange.set_price("BTCUSDT", 110.0);
        fx.trades
            .set(&bought_memo("BTC", 1.0, 100.0, 95.0).with_state(TradeState::Sell))
            .unwrap();
        fx.trades
            .set(&bought_memo("ETH", 1.0, 10.0, 9.0).with_price(8.0))
            .unwrap();

        fx.tick_at(&config, "BTC", 110.0).await;
        assert!(fx
            .trades
            .get("ETH")
            .unwrap()
            .unwrap()
            .state_is(TradeState::Buy));
    }

    #[tokio::test]
    async fn test_profit_based_stop_limit() {
        let fx = Fixture::new();
        let config = TradingConfig {
            profit_based_stop_limit: true,
            ..config()
        };
        fx.stats.add_profit(20.0).unwrap();
        let trader = fx.trader(&config, &[]);
        assert!((trader.loss_limit().unwrap() - 0.2).abs() < 1e-9);
    }
}

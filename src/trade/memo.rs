//! Persistent state of one tracked position
//!
//! A [`PositionMemo`] is replaced, never edited: every transition consumes
//! the memo and returns the next one.

use serde::{Deserialize, Serialize};

use super::window::{PriceWindow, TREND_LENGTH};
use crate::error::Result;
use crate::types::{Symbol, TradeResult, TradeState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionMemo {
    pub trade_result: TradeResult,
    pub state: TradeState,
    #[serde(default)]
    pub prices: PriceWindow,
    /// Price below which the position is sold automatically
    #[serde(default)]
    pub stop_limit_price: f64,
    #[serde(default)]
    pub max_observed_price: f64,
    /// Keep the asset even when a limit is crossed
    #[serde(default)]
    pub hold: bool,
}

impl PositionMemo {
    /// A buy request for an asset that is not tracked yet
    pub fn buy_request(symbol: Symbol) -> Self {
        Self {
            trade_result: TradeResult::from_msg(symbol, ""),
            state: TradeState::Buy,
            prices: PriceWindow::new(),
            stop_limit_price: 0.0,
            max_observed_price: 0.0,
            hold: false,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.trade_result.symbol
    }

    /// Base asset name, also the storage identity of the memo
    pub fn coin_name(&self) -> &str {
        &self.trade_result.symbol.base
    }

    pub fn state_is(&self, state: TradeState) -> bool {
        self.state == state
    }

    /// Holds an executed position
    pub fn has_position(&self) -> bool {
        self.trade_result.from_exchange && self.trade_result.quantity > 0.0
    }

    pub fn current_price(&self) -> f64 {
        self.prices.latest().unwrap_or(0.0)
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.prices.push(price);
        if let Some(max) = self.prices.max() {
            self.max_observed_price = self.max_observed_price.max(max);
        }
        self
    }

    /// Start a fresh window at `price`
    pub fn with_restarted_prices(mut self, price: f64) -> Self {
        self.prices = PriceWindow::new();
        self.with_price(price)
    }

    pub fn with_state(self, state: TradeState) -> Self {
        match state {
            TradeState::Sold => self.sold(),
            _ => Self { state, ..self },
        }
    }

    pub fn with_stop_limit(self, stop_limit_price: f64) -> Self {
        Self {
            stop_limit_price,
            ..self
        }
    }

    pub fn with_hold(self, hold: bool) -> Self {
        Self { hold, ..self }
    }

    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.trade_result.symbol = symbol;
        self
    }

    /// Drop the executed position, keeping the last trade price and the window
    pub fn sold(self) -> Self {
        let price = self.trade_result.price;
        self.sold_at(price)
    }

    /// Like [`sold`](Self::sold), recording `price` as the exit price
    pub fn sold_at(self, price: f64) -> Self {
        let trade_result = TradeResult {
            price,
            ..TradeResult::from_msg(self.trade_result.symbol, "Asset sold")
        };
        Self {
            trade_result,
            state: TradeState::Sold,
            prices: self.prices,
            stop_limit_price: 0.0,
            max_observed_price: self.max_observed_price,
            hold: false,
        }
    }

    /// Merge a new buy fill into the position and mark it bought
    pub fn join_trade(self, fill: TradeResult) -> Result<Self> {
        let trade_result = if self.trade_result.from_exchange {
            self.trade_result.join(&fill)?
        } else {
            fill
        };
        Ok(Self {
            trade_result,
            state: TradeState::Bought,
            ..self
        })
    }

    /// Revert a pending request. `None` means nothing is left to track.
    pub fn reset_state(self) -> Option<Self> {
        if self.has_position() {
            Some(Self {
                state: TradeState::Bought,
                ..self
            })
        } else if !self.prices.is_unset() {
            Some(self.sold())
        } else {
            None
        }
    }

    /// Unrealized profit in quote units
    pub fn profit(&self) -> f64 {
        self.current_price() * self.trade_result.quantity - self.trade_result.paid()
    }

    pub fn profit_percent(&self) -> f64 {
        let paid = self.trade_result.paid();
        if paid > 0.0 {
            self.profit() / paid * 100.0
        } else {
            0.0
        }
    }

    /// Loss realized if sold exactly at the stop limit
    pub fn stop_limit_loss(&self) -> f64 {
        if self.trade_result.price > 0.0 {
            self.trade_result.paid() * (self.stop_limit_price / self.trade_result.price - 1.0)
        } else {
            0.0
        }
    }

    pub fn stop_limit_loss_percent(&self) -> f64 {
        let paid = self.trade_result.paid();
        if paid > 0.0 {
            self.stop_limit_loss() / paid * 100.0
        } else {
            0.0
        }
    }

    /// Price move since the last trade price
    pub fn sold_price_change_percent(&self) -> f64 {
        let price = self.trade_result.price;
        if price > 0.0 {
            (self.current_price() - price) / price * 100.0
        } else {
            0.0
        }
    }

    pub fn profit_limit_price(&self, profit_limit: f64) -> f64 {
        self.trade_result.price * (1.0 + profit_limit)
    }

    pub fn stop_limit_crossed_down(&self) -> bool {
        self.prices.crossed_down(self.stop_limit_price)
    }

    pub fn profit_limit_crossed_up(&self, profit_limit: f64) -> bool {
        self.prices.crossed_up(self.profit_limit_price(profit_limit))
    }

    pub fn price_goes_up(&self) -> bool {
        self.prices.goes_up(TREND_LENGTH)
    }
}

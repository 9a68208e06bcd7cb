//! User-initiated requests on tracked assets
//!
//! Actions only change the stored memo. The trader executes pending
//! requests on its next tick.

use std::sync::Arc;
use tracing::info;

use super::PositionMemo;
use crate::error::{Error, Result};
use crate::store::TradesDao;
use crate::types::{asset_name, Symbol, TradeState};

pub struct TradeActions {
    trades: Arc<TradesDao>,
    stable_coin: String,
}

impl TradeActions {
    pub fn new(trades: Arc<TradesDao>, stable_coin: impl Into<String>) -> Self {
        Self {
            trades,
            stable_coin: stable_coin.into().to_uppercase(),
        }
    }

    fn existing(&self, action: &'static str, coin: &str) -> Result<PositionMemo> {
        self.trades.get(coin)?.ok_or_else(|| Error::InvalidAction {
            action,
            coin: coin.to_string(),
            reason: "asset is not tracked".to_string(),
        })
    }

    /// Request a buy: a new position, or more of an existing one
    pub fn buy(&self, coin: &str) -> Result<PositionMemo> {
        let coin = asset_name(coin)?;
        self.buy_symbol(Symbol::new(coin, self.stable_coin.as_str()))
    }

    /// Buy request for a symbol taken from the exchange snapshot. Listed
    /// names are used as they are.
    pub fn buy_symbol(&self, symbol: Symbol) -> Result<PositionMemo> {
        let memo = match self.trades.get(&symbol.base)? {
            Some(memo) if memo.has_position() => memo.with_state(TradeState::Buy),
            Some(memo) => memo.with_symbol(symbol).with_state(TradeState::Buy),
            None => PositionMemo::buy_request(symbol),
        };
        self.trades.set(&memo)?;
        info!("{}: buy requested", memo.symbol());
        Ok(memo)
    }

    pub fn sell(&self, coin: &str) -> Result<PositionMemo> {
        let memo = self.existing("sell", coin)?;
        if !memo.has_position() {
            return Err(Error::InvalidAction {
                action: "sell",
                coin: coin.to_string(),
                reason: format!("nothing bought, state is {}", memo.state),
            });
        }
        let memo = memo.with_state(TradeState::Sell);
        self.trades.set(&memo)?;
        info!("{}: sell requested", memo.symbol());
        Ok(memo)
    }

    pub fn set_hold(&self, coin: &str, hold: bool) -> Result<PositionMemo> {
        let memo = self.existing("hold", coin)?.with_hold(hold);
        self.trades.set(&memo)?;
        Ok(memo)
    }

    /// Forget an asset. Only sold assets and unfilled buy requests qualify.
    pub fn drop(&self, coin: &str) -> Result<()> {
        let memo = self.existing("drop", coin)?;
        if memo.state_is(TradeState::Sold) || memo.state_is(TradeState::Buy) {
            self.trades.delete(coin)?;
            info!("{}: dropped", memo.symbol());
            return Ok(());
        }
        Err(Error::InvalidAction {
            action: "drop",
            coin: coin.to_string(),
            reason: format!("it is not sold, state is {}", memo.state),
        })
    }

    /// Revert a pending buy or sell request
    pub fn cancel(&self, coin: &str) -> Result<Option<PositionMemo>> {
        self.existing("cancel", coin)?;
        self.trades.change(coin, |memo| memo.and_then(PositionMemo::reset_state))
    }

    /// Overwrite a memo with an edited version. Renaming the coin starts
    /// the new memo with a clean window and stop limit.
    pub fn replace(&self, coin: &str, memo: PositionMemo) -> Result<PositionMemo> {
        let memo = if memo.coin_name() != coin.to_uppercase() {
            let mut renamed = memo.with_stop_limit(0.0);
            renamed.prices = Default::default();
            renamed
        } else {
            memo
        };
        self.trades
            .change(coin, |_| Some(memo.clone()))
            .map(|_| memo)
    }
}

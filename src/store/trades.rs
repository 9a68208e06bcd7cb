//! Position memos in the store, keyed `trade/<BASE>`

use std::sync::Arc;
use tracing::debug;

use super::{get_typed, set_typed, Store};
use crate::error::Result;
use crate::trade::PositionMemo;
use crate::types::TradeState;

const TRADE_PREFIX: &str = "trade/";

pub fn trade_key(coin: &str) -> String {
    format!("{}{}", TRADE_PREFIX, coin.to_uppercase())
}

pub struct TradesDao {
    store: Arc<dyn Store>,
}

impl TradesDao {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn get(&self, coin: &str) -> Result<Option<PositionMemo>> {
        get_typed(self.store.as_ref(), &trade_key(coin))
    }

    pub fn has(&self, coin: &str) -> Result<bool> {
        Ok(self.store.get(&trade_key(coin))?.is_some())
    }

    pub fn set(&self, memo: &PositionMemo) -> Result<()> {
        set_typed(self.store.as_ref(), &trade_key(memo.coin_name()), memo)
    }

    pub fn delete(&self, coin: &str) -> Result<()> {
        debug!("Deleting memo from store: {}", trade_key(coin));
        self.store.delete(&trade_key(coin))
    }

    /// Every tracked memo, ordered by coin name
    pub fn list(&self) -> Result<Vec<PositionMemo>> {
        let mut memos = Vec::new();
        for key in self.store.keys()? {
            if let Some(coin) = key.strip_prefix(TRADE_PREFIX) {
                if let Some(memo) = self.get(coin)? {
                    memos.push(memo);
                }
            }
        }
        Ok(memos)
    }

    pub fn list_in(&self, state: TradeState) -> Result<Vec<PositionMemo>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|m| m.state_is(state))
            .collect())
    }

    /// Read-modify-write of one memo.
    ///
    /// `f` receives the stored memo, if any. Returning `None` deletes it.
    pub fn change<F>(&self, coin: &str, f: F) -> Result<Option<PositionMemo>>
    where
        F: FnOnce(Option<PositionMemo>) -> Option<PositionMemo>,
    {
        let current = self.get(coin)?;
        let existed = current.is_some();
        match f(current) {
            Some(next) => {
                if next.coin_name() != coin.to_uppercase() && existed {
                    self.delete(coin)?;
                }
                self.set(&next)?;
                Ok(Some(next))
            }
            None => {
                if existed {
                    self.delete(coin)?;
                }
                Ok(None)
            }
        }
    }
}

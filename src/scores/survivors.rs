//! Survivor scores: coins rising while the market falls
//!
//! Scores live in the cache between ticks and are synced to the store at
//! most every six hours. On a cold cache they are restored from the store.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{CoinScore, MarketMove, ScoreSelectivity};
use crate::cache::{
    Cache, LONG_TTL, MARKET_MOVE_KEY, RECOMMENDER_MEMOS_KEY, SCORES_SYNCED_KEY, SCORES_SYNC_TTL,
};
use crate::error::Result;
use crate::store::{get_typed, set_typed, Store, SURVIVOR_SCORES_KEY};
use crate::types::{PriceMap, Symbol};

/// How many recommendations [`Survivors::get_scores`] returns
pub const TOP_SCORES: usize = 10;

/// Exchange symbol -> score
pub type CoinScoreMap = BTreeMap<String, CoinScore>;

pub struct Survivors {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
}

impl Survivors {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>) -> Self {
        Self { store, cache }
    }

    fn load(&self) -> Result<CoinScoreMap> {
        if let Some(raw) = self.cache.get(RECOMMENDER_MEMOS_KEY) {
            match serde_json::from_str(&raw) {
                Ok(scores) => return Ok(scores),
                Err(e) => warn!("Cached scores unreadable, restoring from store: {}", e),
            }
        }
        Ok(get_typed(self.store.as_ref(), SURVIVOR_SCORES_KEY)?.unwrap_or_default())
    }

    /// Push the snapshot into every `<coin><stable_coin>` score and reward
    /// the coins that rose while almost nothing else did
    ///
    /// Only stable coin pairs are scored, but the market share is taken over
    /// every listed symbol in the snapshot.
    pub fn update(
        &self,
        prices: &PriceMap,
        stable_coin: &str,
        selectivity: ScoreSelectivity,
    ) -> Result<MarketMove> {
        let mut scores = self.load()?;
        let mut risen = Vec::new();
        let mut fallen = 0usize;
        let observed = prices.len();

        for (pair, price) in prices {
            let Some(symbol) = Symbol::from_pair(pair, stable_coin) else {
                continue;
            };

            let score = scores
                .entry(pair.clone())
                .or_insert_with(|| CoinScore::new(symbol.base.clone()));
            let previous = score.prices.latest();
            score.push_price(*price);

            if score.price_goes_up() {
                risen.push(pair.clone());
            } else if previous.is_some_and(|p| *price < p) {
                fallen += 1;
            }
        }

        let market_move = if observed > 0 {
            MarketMove {
                up_percent: risen.len() as f64 / observed as f64 * 100.0,
                down_percent: fallen as f64 / observed as f64 * 100.0,
            }
        } else {
            MarketMove::default()
        };
        info!("{:.2}% of market prices went up", market_move.up_percent);

        let allowed = selectivity.threshold() * observed as f64;
        if !risen.is_empty() && risen.len() as f64 <= allowed + 1e-9 {
            for pair in &risen {
                if let Some(score) = scores.get_mut(pair) {
                    score.increment();
                }
            }
            info!(coins = ?risen, "Updated survivors");
        }

        self.cache
            .put(RECOMMENDER_MEMOS_KEY, serde_json::to_string(&scores)?, LONG_TTL);
        self.cache
            .put(MARKET_MOVE_KEY, serde_json::to_string(&market_move)?, LONG_TTL);

        if self.cache.get(SCORES_SYNCED_KEY).is_none() {
            set_typed(self.store.as_ref(), SURVIVOR_SCORES_KEY, &scores)?;
            self.cache
                .put(SCORES_SYNCED_KEY, "true".to_string(), SCORES_SYNC_TTL);
            debug!("Synced {} scores to store", scores.len());
        }

        Ok(market_move)
    }

    /// Positive scores quoted in `stable_coin`, best first, at most ten
    pub fn get_scores(&self, stable_coin: &str) -> Result<Vec<CoinScore>> {
        let mut recommended: Vec<CoinScore> = self
            .load()?
            .into_iter()
            .filter(|(pair, score)| pair.ends_with(stable_coin) && score.score > 0)
            .map(|(_, score)| score)
            .collect();
        recommended.sort_by(|a, b| b.score.cmp(&a.score));
        recommended.truncate(TOP_SCORES);
        Ok(recommended)
    }

    pub fn reset_scores(&self) -> Result<()> {
        self.cache.put(
            RECOMMENDER_MEMOS_KEY,
            serde_json::to_string(&CoinScoreMap::new())?,
            LONG_TTL,
        );
        set_typed(self.store.as_ref(), SURVIVOR_SCORES_KEY, &CoinScoreMap::new())?;
        self.cache
            .put(SCORES_SYNCED_KEY, "true".to_string(), SCORES_SYNC_TTL);
        info!("Survivor scores reset");
        Ok(())
    }

    pub fn market_move(&self) -> Option<MarketMove> {
        self.cache
            .get(MARKET_MOVE_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }
}

//! Bounded FIFO of recent prices with trend predicates

use serde::{Deserialize, Serialize};

/// Maximum number of prices kept in a window
pub const PRICE_WINDOW_CAPACITY: usize = 10;

/// Number of prices that must rise in a row to count as "going up"
pub const TREND_LENGTH: usize = 3;

/// Recent prices, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceWindow(Vec<f64>);

impl PriceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_prices(mut prices: Vec<f64>) -> Self {
        if prices.len() > PRICE_WINDOW_CAPACITY {
            prices.drain(..prices.len() - PRICE_WINDOW_CAPACITY);
        }
        Self(prices)
    }

    /// No observation yet. Older records stored `[0, 0, 0]` for that.
    pub fn is_unset(&self) -> bool {
        self.0.first().map_or(true, |p| *p == 0.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Record a price. The first observation fills three slots.
    pub fn push(&mut self, price: f64) {
        if self.is_unset() {
            self.0 = vec![price; TREND_LENGTH];
            return;
        }
        self.0.push(price);
        if self.0.len() > PRICE_WINDOW_CAPACITY {
            let excess = self.0.len() - PRICE_WINDOW_CAPACITY;
            self.0.drain(..excess);
        }
    }

    pub fn latest(&self) -> Option<f64> {
        self.0.last().copied()
    }

    /// The price observed just before the latest one
    pub fn previous(&self) -> Option<f64> {
        self.0.len().checked_sub(2).map(|i| self.0[i])
    }

    pub fn min(&self) -> Option<f64> {
        self.0.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.0.iter().copied().reduce(f64::max)
    }

    fn tail(&self, n: usize) -> Option<&[f64]> {
        self.0.len().checked_sub(n).map(|start| &self.0[start..])
    }

    /// The last `k` prices are strictly increasing and non-zero
    pub fn goes_up(&self, k: usize) -> bool {
        match self.tail(k) {
            Some(tail) if k > 0 && tail[0] != 0.0 => tail.windows(2).all(|w| w[1] > w[0]),
            _ => false,
        }
    }

    fn goes_down(&self, k: usize) -> bool {
        match self.tail(k) {
            Some(tail) if k > 0 && tail[0] != 0.0 => tail.windows(2).all(|w| w[1] < w[0]),
            _ => false,
        }
    }

    /// The latest price is the first one below `limit`
    pub fn crossed_down(&self, limit: f64) -> bool {
        match self.0.split_last() {
            Some((last, earlier)) if !earlier.is_empty() => {
                *last < limit && earlier.iter().all(|p| *p >= limit)
            }
            _ => false,
        }
    }

    /// The latest price is the first one above `limit`
    pub fn crossed_up(&self, limit: f64) -> bool {
        match self.0.split_last() {
            Some((last, earlier)) if !earlier.is_empty() => {
                *last > limit && earlier.iter().all(|p| *p <= limit)
            }
            _ => false,
        }
    }

    /// Rise of at least `threshold` (a fraction) in one step, or over a
    /// steady three-price climb
    pub fn strong_up(&self, threshold: f64) -> bool {
        let (Some(latest), Some(previous)) = (self.latest(), self.previous()) else {
            return false;
        };
        if previous > 0.0 && (latest - previous) / previous >= threshold {
            return true;
        }
        match self.tail(TREND_LENGTH) {
            Some(tail) if self.goes_up(TREND_LENGTH) => (latest - tail[0]) / tail[0] >= threshold,
            _ => false,
        }
    }

    /// Drop of at least `threshold` in one step, or over a steady
    /// three-price decline
    pub fn strong_down(&self, threshold: f64) -> bool {
        let (Some(latest), Some(previous)) = (self.latest(), self.previous()) else {
            return false;
        };
        if previous > 0.0 && (previous - latest) / previous >= threshold {
            return true;
        }
        match self.tail(TREND_LENGTH) {
            Some(tail) if self.goes_down(TREND_LENGTH) => (tail[0] - latest) / tail[0] >= threshold,
            _ => false,
        }
    }
}

//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::Error;
use crate::exchange::binance::BINANCE_API;
use crate::exchange::coinstats::COINSTATS_API;
use crate::exchange::PriceProviderKind;
use crate::scores::ScoreSelectivity;
use crate::store::{get_typed, Store, CONFIG_KEY};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub trading: TradingConfig,
}

/// Exchange endpoints and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub api_secret: String,

    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_coinstats_url")]
    pub coinstats_url: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            api_secret: String::new(),
            request_timeout_ms: default_timeout_ms(),
            coinstats_url: default_coinstats_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// JSON file holding trades, scores and statistics
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Time budget for the per-asset work of one tick
    #[serde(default = "default_tick_deadline_secs")]
    pub tick_deadline_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            tick_deadline_secs: default_tick_deadline_secs(),
        }
    }
}

/// Trading rules, read once per tick
///
/// Fractions (`stop_limit`, `profit_limit`, `strong_move`) are in 0..1;
/// `price_anomaly_alert` is in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Quote amount spent per buy
    #[serde(default = "default_buy_quantity")]
    pub buy_quantity: f64,

    #[serde(default = "default_stop_limit")]
    pub stop_limit: f64,

    #[serde(default = "default_profit_limit")]
    pub profit_limit: f64,

    #[serde(default = "default_true")]
    pub sell_at_stop_limit: bool,

    #[serde(default = "default_true")]
    pub sell_at_profit_limit: bool,

    /// Derive the stop distance from realized profit
    #[serde(default)]
    pub profit_based_stop_limit: bool,

    #[serde(default)]
    pub swing_trade_enabled: bool,

    #[serde(default)]
    pub averaging_down: bool,

    #[serde(default = "default_price_anomaly_alert")]
    pub price_anomaly_alert: f64,

    #[serde(default)]
    pub buy_dumps: bool,

    #[serde(default)]
    pub sell_pumps: bool,

    /// Buy the top N survivors automatically, 0 disables
    #[serde(default)]
    pub auto_trade_best_scores: usize,

    #[serde(default)]
    pub score_selectivity: ScoreSelectivity,

    #[serde(default = "default_stable_coin")]
    pub stable_coin: String,

    #[serde(default = "default_strong_move")]
    pub strong_move: f64,

    #[serde(default = "default_price_provider")]
    pub price_provider: String,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            buy_quantity: default_buy_quantity(),
            stop_limit: default_stop_limit(),
            profit_limit: default_profit_limit(),
            sell_at_stop_limit: true,
            sell_at_profit_limit: true,
            profit_based_stop_limit: false,
            swing_trade_enabled: false,
            averaging_down: false,
            price_anomaly_alert: default_price_anomaly_alert(),
            buy_dumps: false,
            sell_pumps: false,
            auto_trade_best_scores: 0,
            score_selectivity: ScoreSelectivity::default(),
            stable_coin: default_stable_coin(),
            strong_move: default_strong_move(),
            price_provider: default_price_provider(),
        }
    }
}

/// `BuyQuantity` -> `buy_quantity`
fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl TradingConfig {
    pub fn price_provider_kind(&self) -> PriceProviderKind {
        PriceProviderKind::from_name(&self.price_provider)
    }

    /// Apply overrides given as a JSON object. Keys may be snake_case or
    /// PascalCase (`StopLimit`).
    pub fn merged(&self, overrides: &Value) -> crate::error::Result<Self> {
        let Value::Object(overrides) = overrides else {
            return Err(Error::Deserialization {
                key: CONFIG_KEY.to_string(),
                reason: "expected a JSON object".to_string(),
            });
        };

        let mut merged = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in overrides {
            merged.insert(snake_case(key), value.clone());
        }

        serde_json::from_value(Value::Object(merged)).map_err(|e| Error::Deserialization {
            key: CONFIG_KEY.to_string(),
            reason: e.to_string(),
        })
    }

    /// This config with the runtime overrides from the store, if any
    pub fn with_store_overrides(&self, store: &dyn Store) -> crate::error::Result<Self> {
        match get_typed::<Value>(store, CONFIG_KEY)? {
            Some(overrides) => {
                let merged = self.merged(&overrides)?;
                merged
                    .validate()
                    .map_err(|e| Error::Config(e.to_string()))?;
                Ok(merged)
            }
            None => Ok(self.clone()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.buy_quantity <= 0.0 {
            anyhow::bail!("buy_quantity must be positive");
        }

        if self.stop_limit <= 0.0 || self.stop_limit >= 1.0 {
            anyhow::bail!("stop_limit must be a fraction between 0 and 1");
        }

        if self.profit_limit <= 0.0 {
            anyhow::bail!("profit_limit must be positive");
        }

        if self.price_anomaly_alert < 0.0 {
            anyhow::bail!("price_anomaly_alert cannot be negative");
        }

        if self.strong_move <= 0.0 || self.strong_move >= 1.0 {
            anyhow::bail!("strong_move must be a fraction between 0 and 1");
        }

        crate::types::asset_name(&self.stable_coin)
            .with_context(|| format!("Invalid stable_coin: {}", self.stable_coin))?;

        Ok(())
    }
}

fn default_base_url() -> String {
    BINANCE_API.to_string()
}

fn default_coinstats_url() -> String {
    COINSTATS_API.to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_store_path() -> String {
    "data/store.json".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_tick_deadline_secs() -> u64 {
    50
}

fn default_buy_quantity() -> f64 {
    10.0
}

fn default_stop_limit() -> f64 {
    0.05
}

fn default_profit_limit() -> f64 {
    0.1
}

fn default_price_anomaly_alert() -> f64 {
    5.0
}

fn default_stable_coin() -> String {
    "USDT".to_string()
}

fn default_strong_move() -> f64 {
    0.05
}

fn default_price_provider() -> String {
    "Binance".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("exchange.base_url", default_base_url())?
            .set_default("exchange.request_timeout_ms", default_timeout_ms() as i64)?
            .set_default("store.path", default_store_path())?
            .set_default("scheduler.interval_secs", default_interval_secs() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix TRADER_)
            .add_source(
                config::Environment::with_prefix("TRADER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.exchange.base_url)
            .with_context(|| format!("Invalid exchange.base_url: {}", self.exchange.base_url))?;

        if self.exchange.api_key.is_empty() != self.exchange.api_secret.is_empty() {
            anyhow::bail!("exchange.api_key and exchange.api_secret must be set together");
        }

        if self.scheduler.interval_secs == 0 {
            anyhow::bail!("scheduler.interval_secs must be positive");
        }

        if self.scheduler.tick_deadline_secs > self.scheduler.interval_secs {
            tracing::warn!(
                "tick_deadline_secs ({}) exceeds interval_secs ({}): ticks may fall behind",
                self.scheduler.tick_deadline_secs,
                self.scheduler.interval_secs
            );
        }

        self.trading.validate()?;

        // Unknown names fall back to Binance with an error log
        self.trading.price_provider_kind();

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Exchange:
    base_url: {}
    api_key: {}
    api_secret: {}
    timeout: {}ms
  Store:
    path: {}
  Scheduler:
    interval: {}s
    tick_deadline: {}s
  Trading:
    stable_coin: {}
    buy_quantity: {}
    stop_limit: {}%
    profit_limit: {}%
    sell_at_stop_limit: {}
    sell_at_profit_limit: {}
    profit_based_stop_limit: {}
    swing_trade_enabled: {}
    averaging_down: {}
    price_anomaly_alert: {}%
    buy_dumps: {}
    sell_pumps: {}
    auto_trade_best_scores: {}
    score_selectivity: {}
    price_provider: {}
"#,
            self.exchange.base_url,
            mask_secret(&self.exchange.api_key),
            mask_secret(&self.exchange.api_secret),
            self.exchange.request_timeout_ms,
            self.store.path,
            self.scheduler.interval_secs,
            self.scheduler.tick_deadline_secs,
            self.trading.stable_coin,
            self.trading.buy_quantity,
            self.trading.stop_limit * 100.0,
            self.trading.profit_limit * 100.0,
            self.trading.sell_at_stop_limit,
            self.trading.sell_at_profit_limit,
            self.trading.profit_based_stop_limit,
            self.trading.swing_trade_enabled,
            self.trading.averaging_down,
            self.trading.price_anomaly_alert,
            self.trading.buy_dumps,
            self.trading.sell_pumps,
            self.trading.auto_trade_best_scores,
            self.trading.score_selectivity,
            self.trading.price_provider,
        )
    }
}

fn mask_secret(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(not set)"
    } else {
        "***"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trading.stable_coin, "USDT");
        assert_eq!(config.trading.score_selectivity, ScoreSelectivity::High);
        assert_eq!(config.scheduler.interval_secs, 60);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[trading]
stop_limit = 0.03
score_selectivity = "MODERATE"
auto_trade_best_scores = 5
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.trading.stop_limit, 0.03);
        assert_eq!(config.trading.score_selectivity, ScoreSelectivity::Moderate);
        assert_eq!(config.trading.auto_trade_best_scores, 5);
        assert!(config.trading.sell_at_stop_limit);
    }

    #[test]
    fn test_invalid_stop_limit_rejected() {
        let config = Config {
            trading: TradingConfig {
                stop_limit: 1.5,
                ..TradingConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_overrides_accept_pascal_case() {
        let store = MemoryStore::new();
        store
            .set(CONFIG_KEY, json!({"StopLimit": 0.02, "SellPumps": true}))
            .unwrap();

        let config = TradingConfig::default()
            .with_store_overrides(&store)
            .unwrap();
        assert_eq!(config.stop_limit, 0.02);
        assert!(config.sell_pumps);
        assert_eq!(config.buy_quantity, default_buy_quantity());
    }

    #[test]
    fn test_bad_override_is_typed_error() {
        let store = MemoryStore::new();
        store.set(CONFIG_KEY, json!({"BuyQuantity": "lots"})).unwrap();
        assert!(matches!(
            TradingConfig::default().with_store_overrides(&store),
            Err(Error::Deserialization { .. })
        ));
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("AutoTradeBestScores"), "auto_trade_best_scores");
        assert_eq!(snake_case("stop_limit"), "stop_limit");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(not set)");
        assert_eq!(mask_secret("abc"), "***");
    }
}

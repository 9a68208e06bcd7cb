//! Spot Trader Library
//!
//! Decision engine for crypto spot trading: stop-limit and take-profit
//! position tracking, survivor scores and pump/dump detection on top of a
//! signed exchange client.

pub mod alerts;
pub mod anomaly;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod exchange;
pub mod process;
pub mod scores;
pub mod store;
pub mod trade;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use process::Process;

//! Error types for the trading helper

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Marker the exchange layer treats as an explicit cancellation request
pub const INTERRUPT_MARKER: &str = "INTERRUPT";

/// Main error type for the trading helper
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    // Exchange errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Exchange returned {status}: {message}")]
    Exchange { status: u16, message: String },

    #[error("Rate limited by exchange: {0}")]
    RateLimited(String),

    #[error("Interrupted: {0}")]
    Interrupted(String),

    #[error("Malformed exchange response: {0}")]
    Decode(String),

    #[error("No price for symbol {0}")]
    PriceNotFound(String),

    // Trade errors
    #[error("Cannot join trades of different symbols: {left} and {right}")]
    SymbolMismatch { left: String, right: String },

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Cannot {action} {coin}: {reason}")]
    InvalidAction {
        action: &'static str,
        coin: String,
        reason: String,
    },

    // Scheduling
    #[error("Tick deadline exceeded while processing {0}")]
    Deadline(String),

    // Persistence errors
    #[error("Store error: {0}")]
    Store(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error for '{key}': {reason}")]
    Deserialization { key: String, reason: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Exchange { .. } | Error::RateLimited(_)
        ) && !self.is_interrupt()
    }

    /// Check if this error is an explicit interruption that must not be retried
    pub fn is_interrupt(&self) -> bool {
        match self {
            Error::Interrupted(_) => true,
            Error::Exchange { message, .. } => message.contains(INTERRUPT_MARKER),
            Error::Http(message) => message.contains(INTERRUPT_MARKER),
            _ => false,
        }
    }

    /// Check if this error came from the per-tick deadline
    pub fn is_deadline(&self) -> bool {
        matches!(self, Error::Deadline(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Decode(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

//! Per-tick alert collection
//!
//! Components record user-facing alerts and errors into an [`AlertLog`]
//! handed to them by the caller. Every record is also emitted through
//! `tracing`. At the end of a tick the caller turns the log into a single
//! digest; quiet ticks produce none.

use std::fmt::Write as _;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::Error;

#[derive(Debug, Default)]
struct Entries {
    alerts: Vec<String>,
    errors: Vec<String>,
    info: Vec<String>,
}

#[derive(Debug, Default)]
pub struct AlertLog {
    entries: Mutex<Entries>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Entries) -> R) -> R {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Something the user should hear about
    pub fn alert(&self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!(alert = true, "{}", msg);
        self.with(|e| e.alerts.push(msg));
    }

    pub fn info(&self, msg: impl Into<String>) {
        let msg = msg.into();
        info!("{}", msg);
        self.with(|e| e.info.push(msg));
    }

    pub fn error(&self, err: &Error) {
        error!("{}", err);
        self.with(|e| e.errors.push(err.to_string()));
    }

    /// Deadline hits only go to the debug channel
    pub fn debug_error(&self, err: &Error) {
        debug!("{}", err);
    }

    pub fn alerts(&self) -> Vec<String> {
        self.with(|e| e.alerts.clone())
    }

    pub fn errors(&self) -> Vec<String> {
        self.with(|e| e.errors.clone())
    }

    pub fn is_useful(&self) -> bool {
        self.with(|e| !e.alerts.is_empty() || !e.errors.is_empty())
    }

    /// Render the digest, or `None` if nothing worth notifying happened
    pub fn digest(&self) -> Option<String> {
        if !self.is_useful() {
            return None;
        }
        self.with(|e| {
            let mut out = String::new();
            if !e.alerts.is_empty() {
                let _ = writeln!(out, "{}\n", e.alerts.join("\n"));
            }
            if !e.errors.is_empty() {
                let _ = writeln!(out, "Errors:\n{}\n", e.errors.join("\n"));
            }
            if !e.info.is_empty() {
                let _ = writeln!(out, "Info:\n{}", e.info.join("\n"));
            }
            Some(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_log_has_no_digest() {
        let log = AlertLog::new();
        log.info("tick done");
        assert!(log.digest().is_none());
    }

    #[test]
    fn test_digest_contains_alerts_and_errors() {
        let log = AlertLog::new();
        log.alert("BTCUSDT crossed stop limit");
        log.error(&Error::Http("timeout".to_string()));

        let digest = log.digest().unwrap();
        assert!(digest.contains("BTCUSDT crossed stop limit"));
        assert!(digest.contains("Errors:"));
        assert!(digest.contains("timeout"));
        assert_eq!(log.alerts().len(), 1);
        assert_eq!(log.errors().len(), 1);
    }
}

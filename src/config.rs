use crate::domain::coins::Coin;
use crate::error::{EscrowError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;

/// Flat fees charged for payment operations.
///
/// Only the first coin of each list is charged; the lists mirror how fee
/// schedules are usually published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFeeParams {
    #[serde(default)]
    pub fee_create_payment_flat: Vec<Coin>,
    #[serde(default)]
    pub fee_accept_payment_flat: Vec<Coin>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub fees: PaymentFeeParams,
    /// One of `trace`, `debug`, `info`, `warn`, `error`. Defaults to `info`.
    #[serde(default)]
    pub log_level: Option<String>,
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_error = |reason: String| EscrowError::Config {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        Self::from_json(&content).map_err(|e| config_error(e.to_string()))
    }

    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// The configured level, or `INFO` when unset.
    pub fn log_level(&self) -> Result<Level> {
        match &self.log_level {
            None => Ok(Level::INFO),
            Some(level) => level.parse().map_err(|_| EscrowError::Config {
                path: "log_level".to_string(),
                reason: format!("unknown log level {level:?}"),
            }),
        }
    }
}

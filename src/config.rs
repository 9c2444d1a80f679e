//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on malformed values.

use chrono::TimeDelta;
use std::path::PathBuf;

use crate::engine::EngineConfig;
use crate::error::{Error, Result};

/// Default minimum dwell before a departure counts as service.
pub const DEFAULT_MIN_DWELL_SECONDS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file (`ZONETRACK_DB`).
    pub database_path: PathBuf,
    /// Minimum dwell threshold in seconds (`MIN_DWELL_SECONDS`).
    pub min_dwell_seconds: u64,
    /// Default log filter when `RUST_LOG` is unset (`LOG_LEVEL`).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let min_dwell_seconds = match std::env::var("MIN_DWELL_SECONDS") {
            Ok(raw) => raw.parse().map_err(|_| {
                Error::Config(format!(
                    "MIN_DWELL_SECONDS must be a whole number of seconds, got {raw:?}"
                ))
            })?,
            Err(_) => DEFAULT_MIN_DWELL_SECONDS,
        };

        Ok(Self {
            database_path: std::env::var("ZONETRACK_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./zonetrack.db")),
            min_dwell_seconds,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// The engine tunables derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            min_dwell: TimeDelta::seconds(self.min_dwell_seconds as i64),
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunable configuration for every component
//!
//! All sections deserialize from TOML with defaults for missing fields, and
//! durations use humantime syntax (`"300ms"`, `"5s"`, `"1h"`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarborConfig {
    pub election: ElectionConfig,
    pub wal: WalConfig,
    pub events: EventLogConfig,
    pub cache: CacheConfig,
}

impl HarborConfig {
    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.election.max_window < self.election.baseline_window {
            return Err(ConfigError::Invalid(
                "election.max_window must not be shorter than election.baseline_window".into(),
            ));
        }
        if self.election.max_missed_heartbeats == 0 {
            return Err(ConfigError::Invalid(
                "election.max_missed_heartbeats must be at least 1".into(),
            ));
        }
        if self.wal.batch_size == 0 {
            return Err(ConfigError::Invalid("wal.batch_size must be at least 1".into()));
        }
        if self.wal.max_attempts == 0 {
            return Err(ConfigError::Invalid("wal.max_attempts must be at least 1".into()));
        }
        if self.wal.retry_max_delay < self.wal.retry_base_delay {
            return Err(ConfigError::Invalid(
                "wal.retry_max_delay must not be shorter than wal.retry_base_delay".into(),
            ));
        }
        if self.events.max_events == 0 {
            return Err(ConfigError::Invalid("events.max_events must be at least 1".into()));
        }
        if self.events.max_connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "events.max_connect_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Leader election timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Candidacy collection window on a reference-speed machine
    #[serde(with = "humantime_serde")]
    pub baseline_window: Duration,
    /// Upper bound for the calibrated window
    #[serde(with = "humantime_serde")]
    pub max_window: Duration,
    /// Expected duration of the calibration workload on a reference machine
    #[serde(with = "humantime_serde")]
    pub calibration_reference: Duration,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Heartbeats a secondary may miss before starting a new election
    pub max_missed_heartbeats: u32,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            baseline_window: Duration::from_millis(300),
            max_window: Duration::from_millis(600),
            calibration_reference: Duration::from_millis(2),
            heartbeat_interval: Duration::from_secs(3),
            max_missed_heartbeats: 3,
        }
    }
}

impl ElectionConfig {
    /// Silence after which the primary is presumed gone
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_interval * self.max_missed_heartbeats
    }
}

/// Write-ahead log limits and timers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// Key prefix for persisted documents
    pub namespace: String,
    /// Maximum entries kept in the persisted log
    pub max_entries: usize,
    /// Pending entries older than this are expired during cleanup
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
    /// Ceiling on the serialized entry list
    pub max_size_bytes: usize,
    pub batch_size: usize,
    pub max_attempts: u32,
    /// Committed and terminally failed entries are evicted after this age
    #[serde(with = "humantime_serde")]
    pub cleanup_age: Duration,
    /// Operation results are kept this long for `wait_for_result`
    #[serde(with = "humantime_serde")]
    pub result_retention: Duration,
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Debounce before startup replay
    #[serde(with = "humantime_serde")]
    pub replay_delay: Duration,
    /// How long new writes wait for an in-flight replay before proceeding
    #[serde(with = "humantime_serde")]
    pub replay_wait_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub retry_max_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub result_poll_interval: Duration,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            namespace: "harbor:wal:v1".to_string(),
            max_entries: 1000,
            max_age: Duration::from_secs(24 * 60 * 60),
            max_size_bytes: 2 * 1024 * 1024,
            batch_size: 10,
            max_attempts: 3,
            cleanup_age: Duration::from_secs(60 * 60),
            result_retention: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(60),
            replay_delay: Duration::from_millis(500),
            replay_wait_timeout: Duration::from_secs(5),
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            result_poll_interval: Duration::from_millis(100),
        }
    }
}

/// Event log compaction and connection retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Compaction runs once the event count exceeds this
    pub max_events: u64,
    /// An automatic checkpoint is taken every this many events (0 disables)
    pub checkpoint_interval: u64,
    /// Events at or after a checkpoint that compaction always keeps
    pub min_events_after_checkpoint: u64,
    pub max_connect_attempts: u32,
    /// First retry delay for a blocked connection; doubles per attempt
    #[serde(with = "humantime_serde")]
    pub connect_backoff: Duration,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            max_events: 10_000,
            checkpoint_interval: 1000,
            min_events_after_checkpoint: 100,
            max_connect_attempts: 5,
            connect_backoff: Duration::from_millis(100),
        }
    }
}

/// In-memory cache bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size: 1000 }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

//! Notifier configuration.
//!
//! Defaults layered under an optional TOML file and `COURIER_*` environment
//! overrides, e.g. `COURIER_MAX_ATTEMPTS=3`.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunable knobs for the delivery subsystem.
///
/// The backoff curve and cooldowns are deployment tuning, not correctness
/// requirements; the defaults suit interactive sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// How often the retry worker wakes, in milliseconds.
    pub worker_interval_ms: u64,
    /// Delivery attempts per event before it is dropped.
    pub max_attempts: u32,
    /// Base delay of the exponential backoff between attempts, in milliseconds.
    pub backoff_base_ms: u64,
    /// Cap on the backoff delay, in milliseconds.
    pub backoff_max_ms: u64,
    /// Minimum gap between backlog notices per thread, in milliseconds.
    pub backlog_cooldown_ms: u64,
    /// How long shutdown waits for the worker to finish its tick.
    pub shutdown_timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            worker_interval_ms: 500,
            max_attempts: 5,
            backoff_base_ms: 250,
            backoff_max_ms: 5_000,
            backlog_cooldown_ms: 3_000,
            shutdown_timeout_ms: 3_000,
        }
    }
}

impl NotifierConfig {
    pub fn worker_interval(&self) -> Duration {
        Duration::from_millis(self.worker_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn backlog_cooldown(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.backlog_cooldown_ms as i64)
    }

    /// Backoff delay after `attempt` failed attempts: `base * 2^(attempt-1)`,
    /// capped at `backoff_max_ms`.
    pub fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        let exp = 2u64.saturating_pow(attempt.saturating_sub(1).min(16));
        self.backoff_base_ms
            .saturating_mul(exp)
            .min(self.backoff_max_ms)
    }
}

/// Load configuration from defaults, an optional TOML file, and the
/// environment.
pub fn load_config(path: Option<&Path>) -> Result<NotifierConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
    }

    let built = builder
        .add_source(Environment::with_prefix("COURIER").separator("__"))
        .build()
        .context("building notifier configuration")?;

    built
        .try_deserialize()
        .context("deserializing notifier configuration")
}

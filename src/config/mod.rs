use garde::Validate;
use serde::Deserialize;
use std::time::Duration;

use crate::services::poller::PollPolicy;
use crate::services::retry::RetryPolicy;

#[derive(Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Processing backend base URL (e.g., "https://api.example.com")
    #[garde(length(min = 1))]
    pub backend_url: String,

    /// Bearer token sent with every backend request
    #[serde(default)]
    #[garde(skip)]
    pub api_token: Option<String>,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_ms")]
    #[garde(range(min = 100))]
    pub request_timeout_ms: u64,

    /// Poll interval while a job is queued
    #[serde(default = "default_pending_interval_ms")]
    #[garde(range(min = 100))]
    pub pending_interval_ms: u64,

    /// Poll interval while a job is running
    #[serde(default = "default_running_interval_ms")]
    #[garde(range(min = 100))]
    pub running_interval_ms: u64,

    /// Continuous pending time before a job is declared stuck
    #[serde(default = "default_stuck_pending_ms")]
    #[garde(range(min = 100))]
    pub stuck_pending_ms: u64,

    /// Wall-clock polling budget per job
    #[serde(default = "default_max_poll_duration_ms")]
    #[garde(range(min = 100))]
    pub max_poll_duration_ms: u64,

    /// Status checks per job before giving up
    #[serde(default = "default_max_poll_ticks")]
    #[garde(range(min = 1))]
    pub max_poll_ticks: u32,

    /// First backoff delay after a transient failure
    #[serde(default = "default_retry_base_ms")]
    #[garde(range(min = 100))]
    pub retry_base_ms: u64,

    /// Upper bound for any single backoff delay
    #[serde(default = "default_retry_max_delay_ms")]
    #[garde(range(min = 100))]
    pub retry_max_delay_ms: u64,

    /// Consecutive transient failures tolerated
    #[serde(default = "default_max_retries")]
    #[garde(range(max = 10))]
    pub max_retries: u32,

    /// Prometheus listener address (e.g., "0.0.0.0:9100"). Disabled when unset.
    #[serde(default)]
    #[garde(skip)]
    pub metrics_addr: Option<String>,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_pending_interval_ms() -> u64 {
    2_000
}

fn default_running_interval_ms() -> u64 {
    3_000
}

fn default_stuck_pending_ms() -> u64 {
    30_000
}

fn default_max_poll_duration_ms() -> u64 {
    240_000
}

fn default_max_poll_ticks() -> u32 {
    120
}

fn default_retry_base_ms() -> u64 {
    2_000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            pending_interval: Duration::from_millis(self.pending_interval_ms),
            running_interval: Duration::from_millis(self.running_interval_ms),
            stuck_pending_after: Duration::from_millis(self.stuck_pending_ms),
            max_duration: Duration::from_millis(self.max_poll_duration_ms),
            max_ticks: self.max_poll_ticks,
            retry: RetryPolicy {
                base_delay: Duration::from_millis(self.retry_base_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
                max_retries: self.max_retries,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}

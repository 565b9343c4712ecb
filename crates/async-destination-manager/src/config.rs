//! Configuration for destination uploads.

use crate::{UploadError, UploadResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default upload timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 600;

/// Failure reason attached to jobs the destination did not accept on a
/// 200/400 submission. Destinations key off this exact text.
pub const DEFAULT_OVERFLOW_FAILED_REASON: &str =
    r#"{"error":"Jobs flowed over the prescribed limit"}"#;

/// Environment variable overriding the upload timeout (seconds).
pub const HTTP_TIMEOUT_ENV: &str = "ASYNC_DESTINATION_HTTP_TIMEOUT";

/// Retry policy for [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Maximum attempts, the first one included.
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: 60000,
            max_retries: 3,
        }
    }
}

/// Upload manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Timeout of a single upload call, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Reason attached to jobs the destination reports as unsuccessful.
    #[serde(default = "default_overflow_failed_reason")]
    pub overflow_failed_reason: String,
    /// Transport retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_overflow_failed_reason() -> String {
    DEFAULT_OVERFLOW_FAILED_REASON.to_string()
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            overflow_failed_reason: DEFAULT_OVERFLOW_FAILED_REASON.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Create a config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from a JSON file. Missing fields take defaults and
    /// the environment still wins over the file.
    pub fn load_from_file(path: &Path) -> UploadResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: ManagerConfig = serde_json::from_str(&content)?;
        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Upload timeout as a duration.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Reject values that would make every upload fail immediately.
    pub fn validate(&self) -> UploadResult<()> {
        if self.http_timeout_secs == 0 {
            return Err(UploadError::Config(
                "http_timeout_secs must be positive".to_string(),
            ));
        }
        if self.retry.max_retries == 0 {
            return Err(UploadError::Config(
                "retry.max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Some(secs) = std::env::var(HTTP_TIMEOUT_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            self.http_timeout_secs = secs;
        }
    }
}

//! Session manager configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for deadlines, retries and defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Deadline for reads and lists, in seconds.
    #[serde(default = "SessionConfig::default_read_timeout")]
    pub read_timeout_seconds: u64,

    /// Deadline for mutations and log streaming, in seconds.
    #[serde(default = "SessionConfig::default_write_timeout")]
    pub write_timeout_seconds: u64,

    /// Maximum attempts per remote call, including the first.
    #[serde(default = "SessionConfig::default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before each retry in milliseconds; the last entry repeats.
    #[serde(default = "SessionConfig::default_backoff")]
    pub backoff_millis: Vec<u64>,

    /// Namespace selected when the manager starts.
    #[serde(default = "SessionConfig::default_namespace")]
    pub default_namespace: String,
}

impl SessionConfig {
    const fn default_read_timeout() -> u64 {
        20
    }

    const fn default_write_timeout() -> u64 {
        30
    }

    const fn default_max_attempts() -> u32 {
        3
    }

    fn default_backoff() -> Vec<u64> {
        vec![200, 500, 1000]
    }

    fn default_namespace() -> String {
        "default".to_string()
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `KUBELINK_READ_TIMEOUT_SECONDS`: deadline for reads and lists
    /// - `KUBELINK_WRITE_TIMEOUT_SECONDS`: deadline for mutations and logs
    /// - `KUBELINK_MAX_ATTEMPTS`: attempts per remote call
    /// - `KUBELINK_BACKOFF_MILLIS`: comma-separated retry delays
    /// - `KUBELINK_DEFAULT_NAMESPACE`: initial namespace
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_parse("KUBELINK_READ_TIMEOUT_SECONDS") {
            config.read_timeout_seconds = n;
        }
        if let Some(n) = env_parse("KUBELINK_WRITE_TIMEOUT_SECONDS") {
            config.write_timeout_seconds = n;
        }
        if let Some(n) = env_parse("KUBELINK_MAX_ATTEMPTS") {
            config.max_attempts = n;
        }
        if let Ok(val) = std::env::var("KUBELINK_BACKOFF_MILLIS") {
            let parsed: Option<Vec<u64>> = val.split(',').map(|s| s.trim().parse().ok()).collect();
            if let Some(backoff) = parsed.filter(|b| !b.is_empty()) {
                config.backoff_millis = backoff;
            }
        }
        if let Ok(val) = std::env::var("KUBELINK_DEFAULT_NAMESPACE") {
            if !val.is_empty() {
                config.default_namespace = val;
            }
        }

        config
    }

    /// Deadlines derived from this configuration.
    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            read: Duration::from_secs(self.read_timeout_seconds),
            write: Duration::from_secs(self.write_timeout_seconds),
        }
    }

    /// Retry delays as durations.
    #[must_use]
    pub fn backoff(&self) -> Vec<Duration> {
        self.backoff_millis
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout_seconds: Self::default_read_timeout(),
            write_timeout_seconds: Self::default_write_timeout(),
            max_attempts: Self::default_max_attempts(),
            backoff_millis: Self::default_backoff(),
            default_namespace: Self::default_namespace(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Per-call deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Reads and lists.
    pub read: Duration,
    /// Mutations and log streaming.
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        SessionConfig::default().timeouts()
    }
}

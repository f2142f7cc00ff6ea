//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Controller-level configuration
///
/// All settings have defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciliations: u16,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Requeue interval when the backoff table cannot be used (seconds)
    pub reconciliation_error_requeue_secs: u64,
    /// Fibonacci backoff bounds for failed reconciliations (minutes)
    pub backoff_min_minutes: u64,
    pub backoff_max_minutes: u64,
    /// Delay before restarting the watch after the stream ends (seconds)
    pub watch_restart_delay_secs: u64,
    /// Only watch ServiceAccounts in this namespace. `None` watches all namespaces.
    pub watch_namespace: Option<String>,
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::{
            DEFAULT_BACKOFF_MAX_MINUTES, DEFAULT_BACKOFF_MIN_MINUTES,
            DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_METRICS_PORT,
            DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, DEFAULT_WATCH_RESTART_DELAY_SECS,
        };
        Self {
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            metrics_port: DEFAULT_METRICS_PORT,
            reconciliation_error_requeue_secs: DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            backoff_min_minutes: DEFAULT_BACKOFF_MIN_MINUTES,
            backoff_max_minutes: DEFAULT_BACKOFF_MAX_MINUTES,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_namespace: None,
            log_format: LogFormat::Text,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from `lookup`, falling back to defaults for
    /// missing or unparsable values
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            max_concurrent_reconciliations: var_or_default(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            metrics_port: var_or_default(&lookup, "METRICS_PORT", defaults.metrics_port),
            reconciliation_error_requeue_secs: var_or_default(
                &lookup,
                "RECONCILIATION_ERROR_REQUEUE_SECS",
                defaults.reconciliation_error_requeue_secs,
            ),
            backoff_min_minutes: var_or_default(
                &lookup,
                "BACKOFF_MIN_MINUTES",
                defaults.backoff_min_minutes,
            ),
            backoff_max_minutes: var_or_default(
                &lookup,
                "BACKOFF_MAX_MINUTES",
                defaults.backoff_max_minutes,
            ),
            watch_restart_delay_secs: var_or_default(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                defaults.watch_restart_delay_secs,
            ),
            watch_namespace: lookup("WATCH_NAMESPACE")
                .map(|ns| ns.trim().to_string())
                .filter(|ns| !ns.is_empty()),
            log_format: var_or_default(&lookup, "LOG_FORMAT", defaults.log_format),
        }
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Parse variable `key` or return `default`
fn var_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

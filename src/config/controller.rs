//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::controller::reconciler::RestartSettings;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from the operator Deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch for AccountIAM instances
    /// Empty means all namespaces
    pub watch_namespace: String,
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// How long to wait for the HTTP server to bind (seconds)
    pub server_startup_timeout_secs: u64,
    /// Poll interval while waiting for the HTTP server (milliseconds)
    pub server_poll_interval_ms: u64,
    /// Interval between readiness polls after a restart (seconds)
    pub restart_poll_interval_secs: u64,
    /// Deadline for a restarted component to report ready (seconds)
    pub restart_timeout_secs: u64,
    /// Delay between deleting a unit and the first readiness poll (seconds)
    pub restart_settle_secs: u64,
    /// Requeue delay for transient store failures, timeouts and cancelled cycles (seconds)
    pub transient_requeue_secs: u64,
    /// Fibonacci backoff floor for prerequisite and data integrity failures (minutes)
    pub backoff_min_minutes: u64,
    /// Fibonacci backoff ceiling (minutes)
    pub backoff_max_minutes: u64,
    /// Consecutive restart timeouts on one instance before escalating
    pub timeout_escalation_threshold: u32,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream backoff starting value (milliseconds)
    pub watch_backoff_start_ms: u64,
    /// Watch stream backoff ceiling (milliseconds)
    pub watch_backoff_max_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            watch_namespace: String::new(),
            metrics_port: DEFAULT_METRICS_PORT,
            server_startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            server_poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
            restart_poll_interval_secs: DEFAULT_RESTART_POLL_INTERVAL_SECS,
            restart_timeout_secs: DEFAULT_RESTART_TIMEOUT_SECS,
            restart_settle_secs: DEFAULT_RESTART_SETTLE_SECS,
            transient_requeue_secs: DEFAULT_TRANSIENT_REQUEUE_SECS,
            backoff_min_minutes: DEFAULT_BACKOFF_MIN_MINUTES,
            backoff_max_minutes: DEFAULT_BACKOFF_MAX_MINUTES,
            timeout_escalation_threshold: DEFAULT_TIMEOUT_ESCALATION_THRESHOLD,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_backoff_start_ms: DEFAULT_WATCH_BACKOFF_START_MS,
            watch_backoff_max_ms: DEFAULT_WATCH_BACKOFF_MAX_MS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            watch_namespace: env_var_or_default_str("WATCH_NAMESPACE", ""),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            server_startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            server_poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
            restart_poll_interval_secs: env_var_or_default(
                "RESTART_POLL_INTERVAL_SECS",
                DEFAULT_RESTART_POLL_INTERVAL_SECS,
            ),
            restart_timeout_secs: env_var_or_default(
                "RESTART_TIMEOUT_SECS",
                DEFAULT_RESTART_TIMEOUT_SECS,
            ),
            restart_settle_secs: env_var_or_default(
                "RESTART_SETTLE_SECS",
                DEFAULT_RESTART_SETTLE_SECS,
            ),
            transient_requeue_secs: env_var_or_default(
                "TRANSIENT_REQUEUE_SECS",
                DEFAULT_TRANSIENT_REQUEUE_SECS,
            ),
            backoff_min_minutes: env_var_or_default(
                "BACKOFF_MIN_MINUTES",
                DEFAULT_BACKOFF_MIN_MINUTES,
            ),
            backoff_max_minutes: env_var_or_default(
                "BACKOFF_MAX_MINUTES",
                DEFAULT_BACKOFF_MAX_MINUTES,
            ),
            timeout_escalation_threshold: env_var_or_default(
                "TIMEOUT_ESCALATION_THRESHOLD",
                DEFAULT_TIMEOUT_ESCALATION_THRESHOLD,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_backoff_start_ms: env_var_or_default(
                "WATCH_BACKOFF_START_MS",
                DEFAULT_WATCH_BACKOFF_START_MS,
            ),
            watch_backoff_max_ms: env_var_or_default(
                "WATCH_BACKOFF_MAX_MS",
                DEFAULT_WATCH_BACKOFF_MAX_MS,
            ),
        }
    }

    /// Watched namespace, or `None` for a cluster-wide watch
    pub fn watch_namespace(&self) -> Option<&str> {
        let namespace = self.watch_namespace.trim();
        (!namespace.is_empty()).then_some(namespace)
    }

    /// Get transient requeue duration
    pub fn transient_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.transient_requeue_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get server startup timeout duration
    pub fn server_startup_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.server_startup_timeout_secs)
    }

    /// Get server poll interval duration
    pub fn server_poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.server_poll_interval_ms)
    }

    /// Timing used by the restart coordinator
    pub fn restart_settings(&self) -> RestartSettings {
        RestartSettings {
            settle: Duration::from_secs(self.restart_settle_secs),
            poll_interval: Duration::from_secs(self.restart_poll_interval_secs),
            timeout: Duration::from_secs(self.restart_timeout_secs),
        }
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ControllerConfig::default();
        assert_eq!(config.metrics_port, 5000);
        assert_eq!(config.restart_poll_interval_secs, 20);
        assert_eq!(config.restart_timeout_secs, 120);
        assert_eq!(config.restart_settle_secs, 10);
        assert_eq!(config.transient_requeue_secs, 30);
        assert_eq!(config.backoff_min_minutes, 1);
        assert_eq!(config.backoff_max_minutes, 10);
        assert_eq!(config.timeout_escalation_threshold, 3);
    }

    #[test]
    fn test_empty_watch_namespace_means_all_namespaces() {
        let mut config = ControllerConfig::default();
        assert_eq!(config.watch_namespace(), None);

        config.watch_namespace = "  ".to_string();
        assert_eq!(config.watch_namespace(), None);

        config.watch_namespace = "user-management".to_string();
        assert_eq!(config.watch_namespace(), Some("user-management"));
    }

    #[test]
    fn test_restart_settings_from_config() {
        let config = ControllerConfig {
            restart_settle_secs: 1,
            restart_poll_interval_secs: 2,
            restart_timeout_secs: 3,
            ..ControllerConfig::default()
        };
        let settings = config.restart_settings();
        assert_eq!(settings.settle, Duration::from_secs(1));
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
        assert_eq!(settings.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_env_var_or_default_falls_back_on_unparseable_value() {
        // Unique key so parallel tests never observe it
        std::env::set_var("UMO_TEST_UNPARSEABLE_PORT", "not-a-number");
        let port: u16 = env_var_or_default("UMO_TEST_UNPARSEABLE_PORT", 5000);
        assert_eq!(port, 5000);
        std::env::remove_var("UMO_TEST_UNPARSEABLE_PORT");
    }
}

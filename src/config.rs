//! Client configuration.
//!
//! [`ClientConfig`] collects everything a [`PaymentSession`](crate::session::PaymentSession)
//! needs: the backend location, the reconnect policy, the teardown grace
//! period and the diagnostic trace settings.

use std::time::Duration;

use tracing::warn;

use crate::api::DEFAULT_BASE_URL;
use crate::connection::ReconnectPolicy;

pub const ENV_BASE_URL: &str = "PAYWATCH_BASE_URL";
pub const ENV_MAX_RECONNECTS: &str = "PAYWATCH_MAX_RECONNECTS";
pub const ENV_RETRY_DELAY_MS: &str = "PAYWATCH_RETRY_DELAY_MS";
pub const ENV_GRACE_MS: &str = "PAYWATCH_GRACE_MS";
pub const ENV_DEBUG_TRACE: &str = "PAYWATCH_DEBUG_TRACE";

/// Default delay between a terminal status and closing the stream.
pub const DEFAULT_TEARDOWN_GRACE: Duration = Duration::from_secs(1);

/// Default number of trace entries kept.
pub const DEFAULT_TRACE_CAPACITY: usize = 200;

/// Configuration for a payment session.
///
/// # Example
///
/// ```ignore
/// use paywatch::config::ClientConfig;
///
/// let config = ClientConfig::from_env()
///     .with_max_reconnect_attempts(3)
///     .with_trace_enabled(true);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backend base URL (default: http://localhost:8080)
    pub base_url: String,
    /// Consecutive reconnect attempts before giving up (default: 5)
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts (default: 3s)
    pub retry_delay: Duration,
    /// Delay between a terminal status and closing the stream (default: 1s)
    pub teardown_grace: Duration,
    /// Record every received event in the diagnostic trace
    pub trace_enabled: bool,
    /// Maximum number of trace entries kept
    pub trace_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_reconnect_attempts: policy.max_attempts,
            retry_delay: policy.retry_delay,
            teardown_grace: DEFAULT_TEARDOWN_GRACE,
            trace_enabled: false,
            trace_capacity: DEFAULT_TRACE_CAPACITY,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }

    pub fn with_trace_enabled(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }

    pub fn with_trace_capacity(mut self, capacity: usize) -> Self {
        self.trace_capacity = capacity;
        self
    }

    /// Reconnect policy for the stream manager.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.max_reconnect_attempts, self.retry_delay)
    }

    /// Defaults overridden by `PAYWATCH_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_BASE_URL).filter(|u| !u.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, ENV_MAX_RECONNECTS) {
            config.max_reconnect_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_RETRY_DELAY_MS) {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_GRACE_MS) {
            config.teardown_grace = Duration::from_millis(ms);
        }
        if let Some(value) = lookup(ENV_DEBUG_TRACE) {
            config.trace_enabled = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(3));
        assert_eq!(config.teardown_grace, Duration::from_secs(1));
        assert!(!config.trace_enabled);
        assert_eq!(config.trace_capacity, 200);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new()
            .with_base_url("http://pay.test")
            .with_max_reconnect_attempts(2)
            .with_retry_delay(Duration::from_millis(50))
            .with_teardown_grace(Duration::ZERO)
            .with_trace_enabled(true)
            .with_trace_capacity(10);

        assert_eq!(config.base_url, "http://pay.test");
        assert!(config.trace_enabled);
        assert_eq!(config.trace_capacity, 10);
        assert_eq!(
            config.reconnect_policy(),
            ReconnectPolicy::new(2, Duration::from_millis(50))
        );
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "http://pay.test:9000"),
            (ENV_MAX_RECONNECTS, "7"),
            (ENV_RETRY_DELAY_MS, "250"),
            (ENV_GRACE_MS, "0"),
            (ENV_DEBUG_TRACE, "true"),
        ]));

        assert_eq!(config.base_url, "http://pay.test:9000");
        assert_eq!(config.max_reconnect_attempts, 7);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.teardown_grace, Duration::ZERO);
        assert!(config.trace_enabled);
    }

    #[test]
    fn test_from_lookup_ignores_invalid_values() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "  "),
            (ENV_MAX_RECONNECTS, "many"),
            (ENV_RETRY_DELAY_MS, "-5"),
            (ENV_DEBUG_TRACE, "0"),
        ]));

        assert_eq!(config, ClientConfig::default());
    }
}

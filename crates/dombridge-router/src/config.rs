//! Broker configuration with environment overrides.

use std::env;
use std::time::Duration;

use tracing::warn;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:11808";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 250;
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
const DEFAULT_EVENT_BUFFER: usize = 256;
const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Runtime configuration for the router and its connection manager.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Address the executor listener binds to.
    pub listen_addr: String,
    /// Permit binding to non-loopback addresses.
    pub allow_remote: bool,
    /// Per-command timeout when the caller does not pass one.
    pub default_timeout: Duration,
    /// Interval between expiry sweeps over the correlation table.
    pub sweep_interval: Duration,
    /// How long an accepted socket may take to finish its handshake.
    pub handshake_timeout: Duration,
    /// First reconnect delay.
    pub backoff_base: Duration,
    /// Reconnect delay ceiling.
    pub backoff_max: Duration,
    /// Capacity of the manager-to-dispatcher event channel.
    pub event_buffer: usize,
    /// Capacity of the outbound send channel.
    pub outbound_buffer: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            allow_remote: false,
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            event_buffer: DEFAULT_EVENT_BUFFER,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl RouterConfig {
    /// Builds a config from `DOMBRIDGE_*` environment variables, falling back
    /// to defaults (and warning) on anything unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: env::var("DOMBRIDGE_LISTEN").unwrap_or(defaults.listen_addr),
            allow_remote: env::var("DOMBRIDGE_ALLOW_REMOTE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            default_timeout: parse_env_ms("DOMBRIDGE_DEFAULT_TIMEOUT_MS", DEFAULT_TIMEOUT_MS),
            sweep_interval: parse_env_ms("DOMBRIDGE_SWEEP_INTERVAL_MS", DEFAULT_SWEEP_INTERVAL_MS),
            handshake_timeout: parse_env_ms(
                "DOMBRIDGE_HANDSHAKE_TIMEOUT_MS",
                DEFAULT_HANDSHAKE_TIMEOUT_MS,
            ),
            backoff_base: parse_env_ms("DOMBRIDGE_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
            backoff_max: parse_env_ms("DOMBRIDGE_BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            event_buffer: defaults.event_buffer,
            outbound_buffer: defaults.outbound_buffer,
        }
    }

    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }
}

fn parse_env_ms(name: &str, default_ms: u64) -> Duration {
    let ms = match env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(0) => {
                warn!(var = name, "ignoring zero duration override");
                default_ms
            }
            Ok(ms) => ms,
            Err(_) => {
                warn!(var = name, value = %raw, "ignoring unparsable duration override");
                default_ms
            }
        },
        Err(_) => default_ms,
    };
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let previous = env::var(key).ok();
            // SAFETY: Test-only environment override.
            unsafe { env::set_var(key, value) };
            Self { key, previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                // SAFETY: Test-only environment override.
                Some(value) => unsafe { env::set_var(self.key, value) },
                // SAFETY: Test-only environment override.
                None => unsafe { env::remove_var(self.key) },
            }
        }
    }

    #[test]
    fn test_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.listen_addr, "127.0.0.1:11808");
        assert!(!config.allow_remote);
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert_eq!(config.sweep_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_env_override_timeout() {
        let _guard = EnvGuard::set("DOMBRIDGE_DEFAULT_TIMEOUT_MS", "5000");
        let config = RouterConfig::from_env();
        assert_eq!(config.default_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_env_invalid_value_falls_back() {
        let _guard = EnvGuard::set("DOMBRIDGE_BACKOFF_BASE_MS", "soon");
        let config = RouterConfig::from_env();
        assert_eq!(config.backoff_base, Duration::from_millis(500));
    }

    #[test]
    fn test_env_zero_duration_falls_back() {
        let _guard = EnvGuard::set("DOMBRIDGE_SWEEP_INTERVAL_MS", "0");
        let config = RouterConfig::from_env();
        assert_eq!(config.sweep_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_builders() {
        let config = RouterConfig::default()
            .with_listen_addr("127.0.0.1:0")
            .with_default_timeout(Duration::from_secs(1))
            .with_backoff(Duration::from_millis(10), Duration::from_millis(100));
        assert_eq!(config.listen_addr, "127.0.0.1:0");
        assert_eq!(config.backoff_max, Duration::from_millis(100));
    }
}

//! Environment-driven configuration for the gateway process.
//!
//! Every option is read with `env::var(...).ok().and_then(|v| v.parse().ok())
//! .unwrap_or(default)` so a missing or malformed variable falls back
//! silently to a sane default rather than failing startup.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// TCP bind address, e.g. `0.0.0.0:8080`.
    pub listen_addr: String,
    /// SQLite DSN (a file path, or `:memory:`).
    pub database_dsn: String,
    /// Period between Retry Worker sweeps.
    pub worker_interval: Duration,
    /// Dead-letter threshold for undelivered entries.
    pub retry_max_attempts: u32,
    /// Base backoff duration for `last_attempt_at + base * 2^attempts`.
    pub retry_interval: Duration,
    /// Drain deadline during graceful shutdown.
    pub shutdown_drain_timeout: Duration,
    /// Consumed by the external rate limiter; the core does not act on it.
    pub default_rate_limit: u32,
    /// Consumed by the external admin surface; the core does not act on it.
    pub master_api_key: Option<String>,
    /// `EnvFilter` directive string, e.g. `info` or `chatcore_gateway=debug`.
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            database_dsn: "chatcore.db".to_string(),
            worker_interval: Duration::from_secs(30),
            retry_max_attempts: 5,
            retry_interval: Duration::from_secs(30),
            shutdown_drain_timeout: Duration::from_secs(10),
            default_rate_limit: 100,
            master_api_key: None,
            log_level: "info".to_string(),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl GatewayConfig {
    /// Build configuration from the process environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_dsn: env::var("DATABASE_DSN").unwrap_or(defaults.database_dsn),
            worker_interval: Duration::from_secs(env_parsed(
                "WORKER_INTERVAL",
                defaults.worker_interval.as_secs(),
            )),
            retry_max_attempts: env_parsed("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_interval: Duration::from_secs(env_parsed(
                "RETRY_INTERVAL",
                defaults.retry_interval.as_secs(),
            )),
            shutdown_drain_timeout: Duration::from_secs(env_parsed(
                "SHUTDOWN_DRAIN_TIMEOUT",
                defaults.shutdown_drain_timeout.as_secs(),
            )),
            default_rate_limit: env_parsed("DEFAULT_RATE_LIMIT", defaults.default_rate_limit),
            master_api_key: env::var("MASTER_API_KEY").ok(),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    pub fn validate(&self) -> chatcore_core::Result<()> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(chatcore_core::CoreError::Invalid(format!(
                "LISTEN_ADDR is not a valid socket address: {}",
                self.listen_addr
            )));
        }
        if self.retry_max_attempts == 0 {
            return Err(chatcore_core::CoreError::Invalid(
                "RETRY_MAX_ATTEMPTS must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_listen_addr() {
        let mut cfg = GatewayConfig::default();
        cfg.listen_addr = "not-an-addr".to_string();
        assert!(cfg.validate().is_err());
    }
}

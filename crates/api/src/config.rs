//! Application configuration loaded from environment variables.

use std::time::Duration;

use dlq::DlqConfig;
use idempotency::IdempotencyConfig;
use outbox::OutboxConfig;
use resilience::{ResilienceConfig, ResilienceSettings};
use saga::{ListenerConfig, TimeoutConfig};

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env_parse(key, default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Server and component configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT` — bind address (default `0.0.0.0:3000`)
/// - `DATABASE_URL` — when set, the durable stores run on PostgreSQL;
///   otherwise everything runs in-memory
/// - `SERVICE_NAME` — recorded on DLQ entries captured by this process
/// - per-component knobs, see [`Config::from_env`]
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub resilience: ResilienceConfig,
    pub outbox: OutboxConfig,
    pub dlq: DlqConfig,
    pub idempotency: IdempotencyConfig,
    pub timeout: TimeoutConfig,
    pub listener: ListenerConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let resilience_defaults = ResilienceSettings::default();
        let outbox_defaults = OutboxConfig::default();
        let dlq_defaults = DlqConfig::default();
        let idempotency_defaults = IdempotencyConfig::default();
        let timeout_defaults = TimeoutConfig::default();
        let listener_defaults = ListenerConfig::default();

        let settings = ResilienceSettings {
            failure_rate_threshold: env_parse(
                "RESILIENCE_FAILURE_RATE_THRESHOLD",
                resilience_defaults.failure_rate_threshold,
            ),
            wait_duration_in_open_state: env_millis(
                "RESILIENCE_WAIT_IN_OPEN_STATE_MS",
                resilience_defaults.wait_duration_in_open_state,
            ),
            sliding_window_size: env_parse(
                "RESILIENCE_SLIDING_WINDOW_SIZE",
                resilience_defaults.sliding_window_size,
            ),
            minimum_number_of_calls: env_parse(
                "RESILIENCE_MINIMUM_CALLS",
                resilience_defaults.minimum_number_of_calls,
            ),
            half_open_permits: env_parse(
                "RESILIENCE_HALF_OPEN_PERMITS",
                resilience_defaults.half_open_permits,
            ),
            max_attempts: env_parse("RESILIENCE_MAX_ATTEMPTS", resilience_defaults.max_attempts),
            wait_duration: env_millis(
                "RESILIENCE_WAIT_DURATION_MS",
                resilience_defaults.wait_duration,
            ),
            exponential_backoff_multiplier: env_parse(
                "RESILIENCE_BACKOFF_MULTIPLIER",
                resilience_defaults.exponential_backoff_multiplier,
            ),
        };
        let resilience = if env_bool("RESILIENCE_ENABLED", true) {
            ResilienceConfig::new().with_defaults(settings)
        } else {
            ResilienceConfig::disabled()
        };

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            database_url: std::env::var("DATABASE_URL").ok(),
            resilience,
            outbox: OutboxConfig {
                enabled: env_bool("OUTBOX_ENABLED", outbox_defaults.enabled),
                poll_interval: env_millis("OUTBOX_POLL_INTERVAL_MS", outbox_defaults.poll_interval),
                max_batch_size: env_parse("OUTBOX_MAX_BATCH_SIZE", outbox_defaults.max_batch_size),
                max_retries: env_parse("OUTBOX_MAX_RETRIES", outbox_defaults.max_retries),
                entry_ttl: env_secs("OUTBOX_ENTRY_TTL_SECS", outbox_defaults.entry_ttl),
            },
            dlq: DlqConfig {
                enabled: env_bool("DLQ_ENABLED", dlq_defaults.enabled),
                max_replay_attempts: env_parse(
                    "DLQ_MAX_REPLAY_ATTEMPTS",
                    dlq_defaults.max_replay_attempts,
                ),
                entry_ttl: env_secs("DLQ_ENTRY_TTL_SECS", dlq_defaults.entry_ttl),
            },
            idempotency: IdempotencyConfig {
                enabled: env_bool("IDEMPOTENCY_ENABLED", idempotency_defaults.enabled),
                ttl: env_secs("IDEMPOTENCY_TTL_SECS", idempotency_defaults.ttl),
            },
            timeout: TimeoutConfig {
                scan_interval: env_millis(
                    "TIMEOUT_SCAN_INTERVAL_MS",
                    timeout_defaults.scan_interval,
                ),
                max_batch: env_parse("TIMEOUT_MAX_BATCH", timeout_defaults.max_batch),
                auto_compensate: env_bool(
                    "TIMEOUT_AUTO_COMPENSATE",
                    timeout_defaults.auto_compensate,
                ),
            },
            listener: ListenerConfig {
                service_name: std::env::var("SERVICE_NAME")
                    .unwrap_or(listener_defaults.service_name),
                saga_timeout: env_secs("SAGA_TIMEOUT_SECS", listener_defaults.saga_timeout),
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            resilience: ResilienceConfig::new(),
            outbox: OutboxConfig::default(),
            dlq: DlqConfig::default(),
            idempotency: IdempotencyConfig::default(),
            timeout: TimeoutConfig::default(),
            listener: ListenerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert!(config.database_url.is_none());
        assert!(config.resilience.is_enabled());
        assert_eq!(config.outbox.max_batch_size, 50);
        assert_eq!(config.dlq.max_replay_attempts, 3);
        assert!(config.timeout.auto_compensate);
    }
}

//! Resilience configuration with per-named-instance overrides.

use std::collections::HashMap;
use std::time::Duration;

/// Breaker and retry settings for one named invoker instance.
#[derive(Debug, Clone)]
pub struct ResilienceSettings {
    /// Failure rate (percent of recorded calls) at which the breaker opens.
    pub failure_rate_threshold: f64,
    /// How long an open breaker rejects before admitting probes.
    pub wait_duration_in_open_state: Duration,
    /// Number of call outcomes tracked in the sliding window.
    pub sliding_window_size: usize,
    /// Minimum recorded calls before the failure rate is evaluated.
    pub minimum_number_of_calls: usize,
    /// Probe calls admitted while half-open.
    pub half_open_permits: u32,
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Base wait between retry attempts.
    pub wait_duration: Duration,
    /// Backoff multiplier applied per attempt.
    pub exponential_backoff_multiplier: f64,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            wait_duration_in_open_state: Duration::from_secs(30),
            sliding_window_size: 10,
            minimum_number_of_calls: 10,
            half_open_permits: 1,
            max_attempts: 3,
            wait_duration: Duration::from_millis(100),
            exponential_backoff_multiplier: 2.0,
        }
    }
}

/// Invoker configuration: a global toggle, default settings, and per-name
/// overrides (one failing saga step can be tuned without touching the rest).
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    enabled: bool,
    defaults: ResilienceSettings,
    overrides: HashMap<String, ResilienceSettings>,
}

impl ResilienceConfig {
    /// Creates an enabled configuration with default settings.
    pub fn new() -> Self {
        Self {
            enabled: true,
            defaults: ResilienceSettings::default(),
            overrides: HashMap::new(),
        }
    }

    /// Creates a disabled configuration; calls pass through unwrapped.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            defaults: ResilienceSettings::default(),
            overrides: HashMap::new(),
        }
    }

    /// Replaces the default settings.
    pub fn with_defaults(mut self, defaults: ResilienceSettings) -> Self {
        self.defaults = defaults;
        self
    }

    /// Adds an override for one named instance.
    pub fn with_override(mut self, name: impl Into<String>, settings: ResilienceSettings) -> Self {
        self.overrides.insert(name.into(), settings);
        self
    }

    /// Returns true if resilience wrapping is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the settings for the given instance name.
    pub fn settings_for(&self, name: &str) -> &ResilienceSettings {
        self.overrides.get(name).unwrap_or(&self.defaults)
    }
}

//! Count-based sliding-window circuit breaker.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use crate::config::ResilienceSettings;

/// The state of a circuit breaker.
///
/// State transitions:
/// ```text
/// Closed ──(failure rate ≥ threshold)──► Open
/// Open ──(wait duration elapsed)──► HalfOpen
/// HalfOpen ──(probe success)──► Closed
/// HalfOpen ──(probe failure)──► Open
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; outcomes are tracked in the sliding window.
    Closed,
    /// Calls are rejected immediately; no load reaches the callee.
    Open,
    /// A bounded number of probe calls are admitted.
    HalfOpen,
}

impl CircuitState {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct BreakerInner {
    state: CircuitState,
    /// Recent call outcomes, `true` = failure. Bounded by the window size.
    outcomes: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
}

/// A single named circuit breaker instance.
///
/// Internal state lives behind a mutex with short, non-await critical
/// sections; the breaker itself is cheap to share across tasks.
pub struct CircuitBreaker {
    name: String,
    settings: ResilienceSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker with the given settings.
    pub fn new(name: impl Into<String>, settings: ResilienceSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                outcomes: VecDeque::new(),
                opened_at: None,
                half_open_in_flight: 0,
            }),
        }
    }

    /// Returns the breaker's instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Asks for permission to place one call.
    ///
    /// Open breakers reject until the configured wait duration elapses, then
    /// transition to half-open and admit up to `half_open_permits` probes.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let waited_out = inner
                    .opened_at
                    .is_some_and(|t| t.elapsed() >= self.settings.wait_duration_in_open_state);

                if waited_out {
                    tracing::info!(breaker = %self.name, "circuit half-open, admitting probe");
                    metrics::counter!("circuit_breaker_half_open_total").increment(1);
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_in_flight = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.settings.half_open_permits {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call outcome.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::Closed => {
                Self::push_outcome(&mut inner, self.settings.sliding_window_size, false);
            }
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.name, "probe succeeded, circuit closed");
                metrics::counter!("circuit_breaker_closed_total").increment(1);
                Self::reset(&mut inner, CircuitState::Closed);
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed call outcome. Non-retryable business failures count
    /// here the same as transient ones.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::Closed => {
                Self::push_outcome(&mut inner, self.settings.sliding_window_size, true);

                if inner.outcomes.len() >= self.settings.minimum_number_of_calls
                    && self.failure_rate(&inner) >= self.settings.failure_rate_threshold
                {
                    tracing::warn!(
                        breaker = %self.name,
                        failure_rate = self.failure_rate(&inner),
                        "failure rate over threshold, circuit opened"
                    );
                    metrics::counter!("circuit_breaker_opened_total").increment(1);
                    Self::reset(&mut inner, CircuitState::Open);
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(breaker = %self.name, "probe failed, circuit reopened");
                metrics::counter!("circuit_breaker_opened_total").increment(1);
                Self::reset(&mut inner, CircuitState::Open);
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    fn push_outcome(inner: &mut BreakerInner, window: usize, failed: bool) {
        if inner.outcomes.len() == window {
            inner.outcomes.pop_front();
        }
        inner.outcomes.push_back(failed);
    }

    fn failure_rate(&self, inner: &BreakerInner) -> f64 {
        if inner.outcomes.is_empty() {
            return 0.0;
        }
        let failures = inner.outcomes.iter().filter(|f| **f).count();
        failures as f64 / inner.outcomes.len() as f64 * 100.0
    }

    fn reset(inner: &mut BreakerInner, state: CircuitState) {
        inner.state = state;
        inner.outcomes.clear();
        inner.opened_at = None;
        inner.half_open_in_flight = 0;
    }
}

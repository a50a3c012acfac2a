//! The resilient invoker: retry + circuit breaker around a fallible
//! async operation, keyed by instance name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::breaker::{CircuitBreaker, CircuitState};
use crate::config::ResilienceConfig;
use crate::error::{InvokeError, OperationError};
use crate::retry::RetryPolicy;

struct InvokerInner {
    config: ResilienceConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

/// Wraps fallible async calls with retry and a named circuit breaker.
///
/// Each distinct `name` gets its own breaker and (possibly overridden)
/// settings. Cloning the invoker shares the breaker registry.
#[derive(Clone)]
pub struct ResilientInvoker {
    inner: Arc<InvokerInner>,
}

impl ResilientInvoker {
    /// Creates an invoker from the given configuration.
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            inner: Arc::new(InvokerInner {
                config,
                breakers: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Creates a pass-through invoker; calls run once, unwrapped.
    pub fn passthrough() -> Self {
        Self::new(ResilienceConfig::disabled())
    }

    /// Returns the breaker state for a named instance, if one exists yet.
    pub fn breaker_state(&self, name: &str) -> Option<CircuitState> {
        self.inner
            .breakers
            .read()
            .unwrap()
            .get(name)
            .map(|b| b.state())
    }

    fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.inner.breakers.read().unwrap().get(name) {
            return breaker.clone();
        }

        let mut breakers = self.inner.breakers.write().unwrap();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    name,
                    self.inner.config.settings_for(name).clone(),
                ))
            })
            .clone()
    }

    /// Executes `operation` under the named breaker and retry policy.
    ///
    /// Transient failures are retried with exponential backoff up to the
    /// configured attempt count; non-retryable business failures surface
    /// immediately but still count toward the breaker's failure rate. With
    /// resilience disabled the operation runs exactly once, unwrapped.
    #[tracing::instrument(skip(self, operation))]
    pub async fn execute<T, F, Fut>(&self, name: &str, mut operation: F) -> Result<T, InvokeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        if !self.inner.config.is_enabled() {
            return operation().await.map_err(|e| Self::surface(name, 1, e));
        }

        let breaker = self.breaker(name);
        let policy = RetryPolicy::from_settings(self.inner.config.settings_for(name));
        let started = std::time::Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if !breaker.try_acquire() {
                metrics::counter!("invoker_circuit_rejections_total").increment(1);
                return Err(InvokeError::CircuitOpen {
                    name: name.to_string(),
                });
            }

            match operation().await {
                Ok(value) => {
                    breaker.record_success();
                    metrics::histogram!("invoker_call_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    return Ok(value);
                }
                Err(e) => {
                    breaker.record_failure();

                    if !e.is_retryable() || attempt >= policy.max_attempts() {
                        metrics::counter!("invoker_failures_total").increment(1);
                        return Err(Self::surface(name, attempt, e));
                    }

                    let delay = policy.delay_after(attempt);
                    tracing::debug!(
                        instance = name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Fire-and-forget variant: runs the call on a background task and logs
    /// the outcome instead of returning it.
    pub fn execute_detached<T, F, Fut>(&self, name: impl Into<String>, operation: F)
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OperationError>> + Send,
    {
        let invoker = self.clone();
        let name = name.into();
        tokio::spawn(async move {
            if let Err(e) = invoker.execute(&name, operation).await {
                tracing::warn!(instance = %name, error = %e, "detached call failed");
            }
        });
    }

    fn surface(name: &str, attempts: u32, error: OperationError) -> InvokeError {
        if error.is_retryable() {
            InvokeError::RetriesExhausted {
                name: name.to_string(),
                attempts,
                last: error,
            }
        } else {
            InvokeError::Rejected {
                name: name.to_string(),
                source: error,
            }
        }
    }
}

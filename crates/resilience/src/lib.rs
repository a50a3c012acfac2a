//! Resilient invoker: bounded retry with exponential backoff behind a
//! per-name circuit breaker.
//!
//! Every cross-service call in the coordination layer goes through
//! [`ResilientInvoker::execute`]. The `name` argument selects an independent
//! breaker/retry instance per saga step, so one failing step cannot trip
//! another's breaker.

mod breaker;
mod config;
mod error;
mod invoker;
mod retry;

pub use breaker::{CircuitBreaker, CircuitState};
pub use config::{ResilienceConfig, ResilienceSettings};
pub use error::{InvokeError, OperationError};
pub use invoker::ResilientInvoker;
pub use retry::RetryPolicy;

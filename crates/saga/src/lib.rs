//! Saga coordination for choreographed, event-driven transactions.
//!
//! No central orchestrator: each service reacts to events through a
//! [`SagaListener`], and this crate tracks every saga's steps and status,
//! detects sagas stuck past their deadline, and unwinds them by publishing
//! compensating events looked up in the [`CompensationRegistry`].

mod compensator;
mod error;
mod instance;
mod listener;
mod memory;
mod postgres;
mod registry;
mod state;
mod store;
mod timeout;

pub use compensator::Compensator;
pub use error::{Result, SagaError};
pub use instance::{SagaInstance, SagaStepRecord};
pub use listener::{ListenerConfig, ProcessOutcome, SagaListener, StepAction, StepOutcome};
pub use memory::InMemorySagaStore;
pub use postgres::PostgresSagaStore;
pub use registry::{CompensationMapping, CompensationRegistry};
pub use state::{SagaStatus, StepStatus};
pub use store::SagaStore;
pub use timeout::{TimeoutConfig, TimeoutDetector};

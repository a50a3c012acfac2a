//! Shared identifier types and the business event envelope used by every
//! component of the saga coordination layer.

mod envelope;
mod types;

pub use envelope::{EventEnvelope, EventEnvelopeBuilder};
pub use types::{CorrelationId, EventId, SagaId};

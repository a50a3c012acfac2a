//! Pub/sub bus abstraction.
//!
//! The bus is the substrate beneath the outbox's at-least-once guarantee:
//! each physical `publish` is at-most-once, and redelivery is the outbox
//! publisher's job. Production deployments plug in a broker-backed
//! implementation; tests and local runs use [`InMemoryBus`].

mod error;
mod memory;

pub use error::{BusError, Result};
pub use memory::InMemoryBus;

use async_trait::async_trait;
use common::EventEnvelope;
use std::sync::Arc;

/// Handler invoked for each event delivered on a subscribed topic.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Processes one delivered event.
    async fn handle(&self, topic: &str, event: EventEnvelope) -> Result<()>;
}

/// A publish/subscribe message bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes an event to a topic. At-most-once per call.
    async fn publish(&self, topic: &str, event: &EventEnvelope) -> Result<()>;

    /// Registers a handler for a topic.
    async fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) -> Result<()>;
}

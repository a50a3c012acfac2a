//! Transactional outbox: a durable local buffer plus a background delivery
//! loop giving producers an at-least-once guarantee on top of the bus's
//! at-most-once publishes.
//!
//! A crash between a successful bus publish and `mark_delivered` causes
//! redelivery on the next poll; consumers deduplicate via the idempotency
//! guard.

mod entry;
mod error;
mod memory;
mod postgres;
mod publisher;
mod store;

pub use entry::{OutboxEntry, OutboxStatus};
pub use error::{OutboxError, Result};
pub use memory::InMemoryOutboxStore;
pub use postgres::PostgresOutboxStore;
pub use publisher::{OutboxConfig, OutboxPublisher};
pub use store::OutboxStore;

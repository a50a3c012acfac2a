//! Idempotency guard: an atomic claim-once-per-event-id mechanism.
//!
//! Listeners call [`IdempotencyGuard::try_process`] before any side effect.
//! The claim is a check-and-set against a shared store, so two nodes racing
//! on the same event id cannot both win. A missing or failing store degrades
//! to "process everything" — duplicates are preferable to dropped events.

mod error;
mod guard;
mod memory;
mod postgres;
mod store;

pub use error::{IdempotencyError, Result};
pub use guard::{IdempotencyConfig, IdempotencyGuard};
pub use memory::InMemoryIdempotencyStore;
pub use postgres::PostgresIdempotencyStore;
pub use store::IdempotencyStore;

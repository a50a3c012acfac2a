//! Dead letter queue: durable capture of events whose processing failed
//! permanently, with manual inspect/replay/discard.
//!
//! The DLQ is a best-effort net under the resilience layer: a failed write
//! to it logs the original failure rather than masking it, and never blocks
//! the caller's critical path.

mod entry;
mod error;
mod memory;
mod postgres;
mod service;
mod store;

pub use entry::{DeadLetterEntry, DlqEntryId, DlqStatus};
pub use error::{DlqError, Result};
pub use memory::InMemoryDlqStore;
pub use postgres::PostgresDlqStore;
pub use service::{DeadLetterService, DlqConfig};
pub use store::DlqStore;

pub mod dlq;
pub mod health;
pub mod metrics;
pub mod sagas;

use std::sync::Arc;

use ::dlq::{DeadLetterService, DlqStore};
use bus::MessageBus;
use saga::SagaStore;

/// Shared application state accessible from all handlers.
pub struct AppState<D: DlqStore, B: MessageBus, S: SagaStore> {
    pub dlq: Arc<DeadLetterService<D, B>>,
    pub saga_store: S,
}

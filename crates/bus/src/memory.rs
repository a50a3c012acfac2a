use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::EventEnvelope;

use crate::{BusError, EventHandler, MessageBus, Result};

#[derive(Default)]
struct InMemoryBusState {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    published: Vec<(String, EventEnvelope)>,
    fail_on_publish: bool,
    unavailable: bool,
}

/// In-memory message bus for testing and local runs.
///
/// Delivers each published event synchronously to all handlers subscribed
/// to the topic, and keeps a log of everything published so tests can
/// assert on delivery order and content.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<RwLock<InMemoryBusState>>,
}

impl InMemoryBus {
    /// Creates a new empty in-memory bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the bus to reject all publishes.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_on_publish = fail;
    }

    /// Configures the bus to report itself unreachable, simulating an
    /// outage rather than a per-publish rejection.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// Returns the number of events published so far.
    pub fn published_count(&self) -> usize {
        self.state.read().unwrap().published.len()
    }

    /// Returns a copy of the publish log, in publish order.
    pub fn published(&self) -> Vec<(String, EventEnvelope)> {
        self.state.read().unwrap().published.clone()
    }

    /// Returns the event types published to the given topic, in order.
    pub fn published_event_types(&self, topic: &str) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, e)| e.event_type.clone())
            .collect()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, event: &EventEnvelope) -> Result<()> {
        let handlers = {
            let mut state = self.state.write().unwrap();

            if state.unavailable {
                return Err(BusError::Unavailable {
                    reason: "bus unreachable".to_string(),
                });
            }

            if state.fail_on_publish {
                return Err(BusError::PublishFailed {
                    topic: topic.to_string(),
                    reason: "bus unavailable".to_string(),
                });
            }

            state.published.push((topic.to_string(), event.clone()));
            state.handlers.get(topic).cloned().unwrap_or_default()
        };

        for handler in handlers {
            if let Err(e) = handler.handle(topic, event.clone()).await {
                tracing::warn!(topic, error = %e, "subscriber handler failed");
            }
        }

        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) -> Result<()> {
        self.state
            .write()
            .unwrap()
            .handlers
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }
}

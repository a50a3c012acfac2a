use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CorrelationId, EventId, SagaId};

/// A business event as it travels between services.
///
/// Every event produced by the upstream pipeline carries the saga metadata
/// the coordination layer needs: which saga it belongs to, which step it
/// represents, and whether it is a forward or a compensating event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event, stable across redeliveries.
    pub event_id: EventId,

    /// The type of the event (e.g., "OrderCreated", "StockReserved").
    pub event_type: String,

    /// The saga instance this event belongs to.
    pub saga_id: SagaId,

    /// The saga type (e.g., "order-fulfillment").
    pub saga_type: String,

    /// Links back to the originating request.
    pub correlation_id: CorrelationId,

    /// Position of this event's step within the saga.
    pub step_number: u32,

    /// True when this event undoes a previously completed step.
    pub is_compensating: bool,

    /// When the event was created.
    pub occurred_at: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Creates a new event envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    saga_id: Option<SagaId>,
    saga_type: Option<String>,
    correlation_id: Option<CorrelationId>,
    step_number: u32,
    is_compensating: bool,
    occurred_at: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
}

impl EventEnvelopeBuilder {
    /// Sets the event ID (defaults to a new random ID).
    pub fn event_id(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the saga this event belongs to.
    pub fn saga_id(mut self, saga_id: SagaId) -> Self {
        self.saga_id = Some(saga_id);
        self
    }

    /// Sets the saga type.
    pub fn saga_type(mut self, saga_type: impl Into<String>) -> Self {
        self.saga_type = Some(saga_type.into());
        self
    }

    /// Sets the correlation ID (defaults to a new random ID).
    pub fn correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Sets the step number (defaults to 0).
    pub fn step_number(mut self, step_number: u32) -> Self {
        self.step_number = step_number;
        self
    }

    /// Marks this envelope as a compensating event.
    pub fn compensating(mut self, is_compensating: bool) -> Self {
        self.is_compensating = is_compensating;
        self
    }

    /// Sets the event timestamp (defaults to now).
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Sets the JSON payload (defaults to null).
    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the envelope, filling unset fields with defaults.
    pub fn build(self) -> EventEnvelope {
        EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type.unwrap_or_default(),
            saga_id: self.saga_id.unwrap_or_default(),
            saga_type: self.saga_type.unwrap_or_default(),
            correlation_id: self.correlation_id.unwrap_or_default(),
            step_number: self.step_number,
            is_compensating: self.is_compensating,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            payload: self.payload.unwrap_or(serde_json::Value::Null),
        }
    }
}

//! The compensation registry.
//!
//! Choreographed sagas have no central orchestrator, so the mapping from
//! forward events to their compensations lives in this one table: the single
//! source of truth for which steps are reversible and how.

use std::collections::HashMap;

/// How one forward event type is undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationMapping {
    /// The event type that reverses the forward event's business effect.
    pub compensating_event_type: String,

    /// The service that handles the compensating event; also the topic the
    /// compensating publish is addressed to.
    pub owning_service: String,
}

/// Immutable lookup table from forward event types to their compensations.
///
/// Built once at startup and injected by constructor; never mutated after.
/// Forward events without a mapping are terminal or non-reversible steps
/// and are skipped during compensation.
#[derive(Debug, Clone, Default)]
pub struct CompensationRegistry {
    mappings: HashMap<String, CompensationMapping>,
}

impl CompensationRegistry {
    /// Creates a builder for assembling the registry at startup.
    pub fn builder() -> CompensationRegistryBuilder {
        CompensationRegistryBuilder::default()
    }

    /// Looks up the compensation for a forward event type.
    pub fn lookup(&self, forward_event_type: &str) -> Option<&CompensationMapping> {
        self.mappings.get(forward_event_type)
    }

    /// Number of registered mappings.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns true if no mappings are registered.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Builder for [`CompensationRegistry`].
#[derive(Debug, Default)]
pub struct CompensationRegistryBuilder {
    mappings: HashMap<String, CompensationMapping>,
}

impl CompensationRegistryBuilder {
    /// Registers a compensation: `forward` is undone by `compensating`,
    /// handled by `owning_service`. Registering the same forward type twice
    /// keeps the latest mapping.
    pub fn map(
        mut self,
        forward: impl Into<String>,
        compensating: impl Into<String>,
        owning_service: impl Into<String>,
    ) -> Self {
        self.mappings.insert(
            forward.into(),
            CompensationMapping {
                compensating_event_type: compensating.into(),
                owning_service: owning_service.into(),
            },
        );
        self
    }

    /// Finalizes the registry.
    pub fn build(self) -> CompensationRegistry {
        CompensationRegistry {
            mappings: self.mappings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_registered_mapping() {
        let registry = CompensationRegistry::builder()
            .map("StockReserved", "StockReleased", "inventory-service")
            .map("OrderCreated", "OrderCancelled", "order-service")
            .build();

        let mapping = registry.lookup("StockReserved").unwrap();
        assert_eq!(mapping.compensating_event_type, "StockReleased");
        assert_eq!(mapping.owning_service, "inventory-service");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unregistered_type_has_no_compensation() {
        let registry = CompensationRegistry::builder()
            .map("OrderCreated", "OrderCancelled", "order-service")
            .build();

        assert!(registry.lookup("ShipmentCreated").is_none());
    }

    #[test]
    fn latest_registration_wins() {
        let registry = CompensationRegistry::builder()
            .map("OrderCreated", "OrderCancelled", "order-service")
            .map("OrderCreated", "OrderVoided", "order-service")
            .build();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.lookup("OrderCreated").unwrap().compensating_event_type,
            "OrderVoided"
        );
    }
}

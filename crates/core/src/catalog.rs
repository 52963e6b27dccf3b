//! Operation catalog contract
//!
//! The catalog of named data operations is maintained elsewhere (it ships
//! with the add-in); the pipeline only looks definitions up by id. A missing
//! operation is a fail-fast error, never a retry condition.

use crate::types::{OperationDefinition, OperationId};
use std::collections::HashMap;

/// Read-only lookup of registered data operations.
pub trait OperationCatalog: Send + Sync {
    fn operation_by_id(&self, id: &OperationId) -> Option<OperationDefinition>;
}

/// In-memory catalog, for tests and embedded defaults.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    operations: HashMap<OperationId, OperationDefinition>,
}

impl StaticCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_operation(mut self, definition: OperationDefinition) -> Self {
        self.operations.insert(definition.id.clone(), definition);
        self
    }

    pub fn insert(&mut self, definition: OperationDefinition) {
        self.operations.insert(definition.id.clone(), definition);
    }
}

impl OperationCatalog for StaticCatalog {
    fn operation_by_id(&self, id: &OperationId) -> Option<OperationDefinition> {
        self.operations.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_registered_definition() {
        let catalog = StaticCatalog::new()
            .with_operation(OperationDefinition::new("sales-summary", "Sales summary", "SELECT 1"));

        let found = catalog.operation_by_id(&OperationId::from("sales-summary"));
        assert_eq!(found.map(|op| op.name), Some("Sales summary".to_string()));
        assert!(catalog.operation_by_id(&OperationId::from("missing")).is_none());
    }
}

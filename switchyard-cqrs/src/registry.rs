//! Execution registry: one handler per message type name

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Maps a command or query type name to exactly one handler.
///
/// Registering a type twice replaces the earlier handler, which keeps
/// re-wiring in tests and hot reload simple.
pub struct ExecutionRegistry<H: ?Sized> {
    handlers: DashMap<String, Arc<H>>,
}

impl<H: ?Sized + Send + Sync> ExecutionRegistry<H> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register a handler, returning the one it replaced.
    pub fn register(&self, message_type: impl Into<String>, handler: Arc<H>) -> Option<Arc<H>> {
        let message_type = message_type.into();
        let previous = self.handlers.insert(message_type.clone(), handler);
        if previous.is_some() {
            debug!(message_type = %message_type, "Replaced existing handler registration");
        } else {
            debug!(message_type = %message_type, "Registered handler");
        }
        previous
    }

    /// Look up the handler for a type name.
    pub fn resolve(&self, message_type: &str) -> Option<Arc<H>> {
        self.handlers.get(message_type).map(|entry| entry.value().clone())
    }

    pub fn unregister(&self, message_type: &str) -> Option<Arc<H>> {
        self.handlers.remove(message_type).map(|(_, handler)| handler)
    }

    pub fn contains(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered type names, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }
}

impl<H: ?Sized + Send + Sync> Default for ExecutionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Named(&'static str);

    impl Greeter for Named {
        fn greet(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_handler_registry_empty() {
        let registry: ExecutionRegistry<dyn Greeter> = ExecutionRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.resolve("Missing").is_none());
    }

    #[test]
    fn test_last_registration_wins() {
        let registry: ExecutionRegistry<dyn Greeter> = ExecutionRegistry::new();

        assert!(registry.register("Greet", Arc::new(Named("first"))).is_none());
        let replaced = registry.register("Greet", Arc::new(Named("second")));

        assert_eq!(replaced.unwrap().greet(), "first");
        assert_eq!(registry.resolve("Greet").unwrap().greet(), "second");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_and_types() {
        let registry: ExecutionRegistry<dyn Greeter> = ExecutionRegistry::new();
        registry.register("B", Arc::new(Named("b")));
        registry.register("A", Arc::new(Named("a")));

        assert_eq!(registry.registered_types(), vec!["A", "B"]);
        assert!(registry.unregister("A").is_some());
        assert!(!registry.contains("A"));
    }
}

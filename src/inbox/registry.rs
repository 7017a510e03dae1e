use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::message::Message;

/// Consumer-side processing of one inbound message.
///
/// Handlers run inside the inbox pump's drain loop. Returning an error marks
/// the record `failed`, which is terminal, so a handler that wants another
/// chance must succeed and track its own retry elsewhere.
#[async_trait]
pub trait InboxHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> anyhow::Result<()>;
}

/// Dispatch table mapping `(topic, event name)` to a handler.
///
/// Built once at startup and handed to the pump, so every routable event is
/// known before the first message arrives. Registration is first-wins: a
/// second handler for an already-claimed key is dropped with a warning.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HashMap<String, Arc<dyn InboxHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, topic: &str, event_name: &str, handler: Arc<dyn InboxHandler>) {
        let topic_handlers = self.handlers.entry(topic.to_string()).or_default();
        if topic_handlers.contains_key(event_name) {
            warn!(topic, event = event_name, "handler already registered, keeping the first");
            return;
        }
        topic_handlers.insert(event_name.to_string(), handler);
        debug!(topic, event = event_name, "registered inbox handler");
    }

    pub fn get(&self, topic: &str, event_name: &str) -> Option<&Arc<dyn InboxHandler>> {
        self.handlers.get(topic)?.get(event_name)
    }

    /// Total number of registered `(topic, event name)` routes.
    pub fn len(&self) -> usize {
        self.handlers.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingHandler {
        calls: AtomicUsize,
    }

    impl CountingHandler {
        fn new() -> Arc<Self> {
            Arc::new(CountingHandler {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl InboxHandler for CountingHandler {
        async fn handle(&self, _message: &Message) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn lookup_finds_the_registered_handler() {
        let mut registry = HandlerRegistry::new();
        let handler = CountingHandler::new();
        registry.register("users", "user.created", handler.clone());

        assert!(registry.get("users", "user.created").is_some());
        assert!(registry.get("users", "user.deleted").is_none());
        assert!(registry.get("orders", "user.created").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_registration_keeps_the_first_handler() {
        let mut registry = HandlerRegistry::new();
        let first: Arc<dyn InboxHandler> = CountingHandler::new();
        let second: Arc<dyn InboxHandler> = CountingHandler::new();

        registry.register("users", "user.created", first.clone());
        registry.register("users", "user.created", second);

        let registered = registry.get("users", "user.created").unwrap();
        assert!(Arc::ptr_eq(registered, &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn one_topic_can_route_many_events() {
        let mut registry = HandlerRegistry::new();
        registry.register("users", "user.created", CountingHandler::new());
        registry.register("users", "user.deleted", CountingHandler::new());
        registry.register("orders", "order.placed", CountingHandler::new());

        assert_eq!(registry.len(), 3);
        assert!(!registry.is_empty());
    }
}

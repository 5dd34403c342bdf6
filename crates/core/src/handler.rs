//! CapabilityHandler trait: the abstraction over domain specialists.
//!
//! Each handler (nutrition, recipe, support, personalization, insights)
//! answers the slice of the request routed to it. Handlers are registered in
//! the [`HandlerRegistry`] and looked up by capability id during fan-out.

use crate::context::RequestContext;
use crate::error::HandlerError;
use crate::response::HandlerReply;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The core CapabilityHandler trait.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// The capability id the router uses (e.g., "nutrition_agent").
    fn id(&self) -> &str;

    /// Answer the context's query.
    ///
    /// The context is this task's own fork; writes to its data bag are
    /// invisible to sibling tasks.
    async fn respond(
        &self,
        ctx: &mut RequestContext,
    ) -> std::result::Result<HandlerReply, HandlerError>;
}

/// A registry of capability handlers, keyed by capability id.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Replaces any existing handler with the same id.
    pub fn register(&mut self, handler: Arc<dyn CapabilityHandler>) {
        let id = handler.id().to_string();
        debug!(capability = %id, "Registering capability handler");
        self.handlers.insert(id, handler);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Get a handler by capability id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(id).cloned()
    }

    /// List all registered capability ids.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::HandlerResponse;

    /// A simple handler for unit tests.
    struct EchoHandler;

    #[async_trait]
    impl CapabilityHandler for EchoHandler {
        fn id(&self) -> &str {
            "echo_agent"
        }

        async fn respond(
            &self,
            ctx: &mut RequestContext,
        ) -> std::result::Result<HandlerReply, HandlerError> {
            Ok(HandlerResponse::completed(ctx.query.clone()).into())
        }
    }

    #[tokio::test]
    async fn registry_register_and_respond() {
        let registry = HandlerRegistry::new().with(Arc::new(EchoHandler));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.ids(), vec!["echo_agent"]);

        let handler = registry.get("echo_agent").unwrap();
        let mut ctx = RequestContext::new("hello");
        let reply = handler.respond(&mut ctx).await.unwrap();
        assert_eq!(reply, HandlerReply::Response(HandlerResponse::completed("hello")));
    }

    #[test]
    fn registry_missing_handler() {
        let registry = HandlerRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(registry.is_empty());
    }
}

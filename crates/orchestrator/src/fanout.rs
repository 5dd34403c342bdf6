//! Fan-out coordinator: one concurrent task per routed action.
//!
//! Every task works on its own fork of the request context, so data-bag
//! writes never cross tasks. Failures stay local to their action: a missing
//! handler becomes a `rejected` result, and a handler error or panic becomes
//! an `error` result. Results come back in action order.

use askwise_core::action::Action;
use askwise_core::context::RequestContext;
use askwise_core::handler::HandlerRegistry;
use askwise_core::response::{HandlerReply, HandlerResponse};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

/// A routed action paired with what its handler replied.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub action: Action,
    pub reply: HandlerReply,
}

pub struct FanOut {
    registry: HandlerRegistry,
}

impl FanOut {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run every action concurrently against `base` and wait for all of them.
    pub async fn execute(&self, actions: &[Action], base: &RequestContext) -> Vec<ActionResult> {
        info!(actions = actions.len(), "Dispatching actions");

        let handles: Vec<_> = actions
            .iter()
            .map(|action| {
                let mut ctx = base.fork(action.revised_query.as_deref());
                if let Some(filters) = &action.file_filters {
                    ctx.data.insert("file_filters".into(), Value::Object(filters.clone()));
                }
                let handler = self.registry.get(&action.capability_id);
                let capability = action.capability_id.clone();

                tokio::spawn(async move {
                    let Some(handler) = handler else {
                        warn!(capability = %capability, "No handler registered");
                        return HandlerReply::from(HandlerResponse::rejected(format!(
                            "Error: Agent '{capability}' not found."
                        )));
                    };
                    debug!(capability = %capability, query = %ctx.query, "Handler started");
                    match handler.respond(&mut ctx).await {
                        Ok(reply) => reply,
                        Err(e) => {
                            warn!(capability = %capability, error = %e, "Handler failed");
                            HandlerResponse::error(format!("Unhandled error: {e}")).into()
                        }
                    }
                })
            })
            .collect();

        let joined = join_all(handles).await;

        actions
            .iter()
            .zip(joined)
            .map(|(action, result)| {
                let reply = result.unwrap_or_else(|e| {
                    warn!(capability = %action.capability_id, error = %e, "Handler task aborted");
                    HandlerResponse::error(format!("Unhandled error: {e}")).into()
                });
                ActionResult {
                    action: action.clone(),
                    reply,
                }
            })
            .collect()
    }
}

//! Intent router: classifies the raw query into routed actions.

use crate::error::OrchestratorError;
use askwise_core::action::RoutingDecision;
use askwise_core::context::RequestContext;
use askwise_core::invoker::InvocationRequest;
use askwise_core::message::{Message, format_transcript};
use askwise_core::response::HandlerResponse;
use askwise_handlers::CapabilityRuntime;
use std::sync::Arc;
use tracing::{error, info};

pub const NO_ACTIONS_MESSAGE: &str = "No actions provided in the response.";

/// What the router decided for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Routing {
    /// Answer now; no handler runs
    Verdict(HandlerResponse),
    /// Fan out to the decision's actions
    Delegate(RoutingDecision),
}

pub struct IntentRouter {
    runtime: Arc<CapabilityRuntime>,
    capability_id: String,
    history_limit: usize,
}

impl IntentRouter {
    pub fn new(runtime: Arc<CapabilityRuntime>, capability_id: impl Into<String>) -> Self {
        Self {
            runtime,
            capability_id: capability_id.into(),
            history_limit: 10,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// The `history_limit` most recent messages as a transcript, oldest first.
    pub fn recent_history(&self, history: &[Message]) -> String {
        let mut ordered: Vec<Message> = history.to_vec();
        ordered.sort_by_key(|m| m.timestamp);
        let skip = ordered.len().saturating_sub(self.history_limit);
        format_transcript(&ordered[skip..])
    }

    /// Classify the context's query.
    ///
    /// An invocation failure is fatal for the request.
    pub async fn classify(&self, ctx: &RequestContext) -> Result<Routing, OrchestratorError> {
        let request = InvocationRequest::structured(&self.capability_id)
            .with_variable("conversation_history", self.recent_history(&ctx.conversation_history))
            .with_messages(vec![Message::user(ctx.query.clone())]);

        let output = self.runtime.invoke(ctx, request).await.map_err(|e| {
            error!(capability = %self.capability_id, error = %e, "Routing failed");
            OrchestratorError::Routing(e)
        })?;

        let decision: RoutingDecision = serde_json::from_value(output.output.into_value())
            .map_err(|e| OrchestratorError::MalformedRouting(e.to_string()))?;

        if decision.actions.is_empty() {
            info!("Router returned no actions");
            return Ok(Routing::Verdict(HandlerResponse::error(NO_ACTIONS_MESSAGE)));
        }

        if let Some(verdict) = decision.early_verdict() {
            info!(verb = %verdict.verb, "Router answered without delegation");
            return Ok(Routing::Verdict(HandlerResponse::new(
                verdict.verb.as_str(),
                verdict.message.trim(),
            )));
        }

        info!(
            actions = decision.actions.len(),
            capabilities = ?decision.actions.iter().map(|a| a.capability_id.as_str()).collect::<Vec<_>>(),
            "Routed request"
        );
        Ok(Routing::Delegate(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedInvoker, runtime};
    use askwise_core::action::ActionVerb;
    use askwise_core::error::InvocationError;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn at_minute(message: Message, minute: u32) -> Message {
        message.at(Utc.with_ymd_and_hms(2024, 1, 1, 9, minute, 0).unwrap())
    }

    const ROUTER: &str = "ASK_DIGBI_INTENT_CLASSIFIER_AGENT";

    fn router(invoker: Arc<ScriptedInvoker>) -> IntentRouter {
        IntentRouter::new(runtime(invoker), ROUTER)
    }

    #[tokio::test]
    async fn early_verdict_uses_verb_and_trimmed_message() {
        let invoker = Arc::new(ScriptedInvoker::new().with_structured(
            ROUTER,
            json!({"actions": [{"action": "clarify", "message": " Which meal? "}]}),
        ));
        let routing = router(invoker).classify(&RequestContext::new("food")).await.unwrap();
        assert_eq!(
            routing,
            Routing::Verdict(HandlerResponse::new("request_clarification", "Which meal?"))
        );
    }

    #[tokio::test]
    async fn empty_actions_yield_error_verdict() {
        let invoker = Arc::new(ScriptedInvoker::new().with_structured(ROUTER, json!({"actions": []})));
        let routing = router(invoker).classify(&RequestContext::new("?")).await.unwrap();
        assert_eq!(routing, Routing::Verdict(HandlerResponse::error(NO_ACTIONS_MESSAGE)));
    }

    #[tokio::test]
    async fn delegation_keeps_details_and_language() {
        let invoker = Arc::new(ScriptedInvoker::new().with_structured(
            ROUTER,
            json!({
                "actions": [
                    {"action": "delegate", "agent": "nutrition_agent", "revised_query": "fiber in oats"},
                    {"action": "reject", "agent": "support_agent"}
                ],
                "details": {"topic": "breakfast"},
                "language": "es"
            }),
        ));
        let Routing::Delegate(decision) = router(invoker).classify(&RequestContext::new("q")).await.unwrap()
        else {
            panic!("expected delegation");
        };
        assert_eq!(decision.actions.len(), 2);
        assert_eq!(decision.actions[1].verb, ActionVerb::Reject);
        assert_eq!(decision.details, json!({"topic": "breakfast"}));
        assert_eq!(decision.language.as_deref(), Some("es"));
    }

    #[tokio::test]
    async fn invocation_failure_is_fatal() {
        let invoker = Arc::new(
            ScriptedInvoker::new().with_error(ROUTER, InvocationError::Network("reset".into())),
        );
        let err = router(invoker).classify(&RequestContext::new("q")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Routing(InvocationError::Network(_))));
    }

    #[tokio::test]
    async fn non_object_output_is_malformed() {
        let invoker = Arc::new(ScriptedInvoker::new().with_text(ROUTER, "nutrition_agent"));
        let err = router(invoker).classify(&RequestContext::new("q")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::MalformedRouting(_)));
    }

    #[tokio::test]
    async fn history_is_limited_to_most_recent() {
        let invoker = Arc::new(ScriptedInvoker::new().with_structured(
            ROUTER,
            json!({"actions": [{"action": "acknowledge", "message": "ok"}]}),
        ));
        let history = vec![
            at_minute(Message::user("third"), 2),
            at_minute(Message::user("first"), 0),
            at_minute(Message::assistant("second"), 1),
        ];
        let ctx = RequestContext::new("q").with_history(history);

        router(invoker.clone())
            .with_history_limit(2)
            .classify(&ctx)
            .await
            .unwrap();

        let request = &invoker.requests_for(ROUTER)[0];
        assert_eq!(
            request.variables["conversation_history"],
            json!("Assistant: second\nUser: third\n")
        );
    }
}

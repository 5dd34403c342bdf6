//! Top-level request pipeline: route, fan out, aggregate.

use crate::aggregator::Aggregator;
use crate::error::OrchestratorError;
use crate::fanout::FanOut;
use crate::router::{IntentRouter, Routing};
use askwise_config::OrchestratorConfig;
use askwise_core::context::RequestContext;
use askwise_core::handler::HandlerRegistry;
use askwise_core::response::FinalResponse;
use askwise_handlers::{CapabilityRuntime, Summarizer, default_registry};
use std::sync::Arc;
use tracing::{error, info};

/// Returned to the caller instead of the text of a fatal failure.
pub const GENERIC_ERROR_MESSAGE: &str =
    "Sorry, something went wrong while handling your request. Please try again.";

pub struct Orchestrator {
    router: IntentRouter,
    fanout: FanOut,
    aggregator: Aggregator,
}

impl Orchestrator {
    pub fn new(runtime: Arc<CapabilityRuntime>, registry: HandlerRegistry, config: &OrchestratorConfig) -> Self {
        let router = IntentRouter::new(Arc::clone(&runtime), &config.router_capability)
            .with_history_limit(config.history_limit);
        let summarizer = Summarizer::new(runtime, &config.summarizer_capability);
        Self {
            router,
            fanout: FanOut::new(registry),
            aggregator: Aggregator::new(summarizer, config.terminal_capabilities.iter().cloned()),
        }
    }

    /// Pipeline over the built-in handlers.
    pub fn with_default_handlers(runtime: Arc<CapabilityRuntime>, config: &OrchestratorConfig) -> Self {
        let registry = default_registry(Arc::clone(&runtime));
        Self::new(runtime, registry, config)
    }

    /// Answer one request.
    ///
    /// Handler failures are folded into the response; only routing and
    /// summarization failures surface as errors.
    pub async fn ask(&self, mut ctx: RequestContext) -> Result<FinalResponse, OrchestratorError> {
        info!(context_id = %ctx.context_id, query_id = %ctx.query_id, "Handling request");

        let decision = match self.router.classify(&ctx).await? {
            Routing::Verdict(verdict) => {
                return Ok(FinalResponse::new(verdict.status, verdict.message)
                    .with_agent_statuses(ctx.agent_statuses.snapshot()));
            }
            Routing::Delegate(decision) => decision,
        };

        if let Some(language) = decision.language.as_deref().filter(|l| !l.trim().is_empty()) {
            ctx.language = Some(language.to_string());
        }

        let results = self.fanout.execute(&decision.actions, &ctx).await;
        let response = self.aggregator.aggregate(&results, &ctx, &decision.details).await?;
        info!(
            context_id = %ctx.context_id,
            status = %response.status,
            invocations = response.agent_statuses.len(),
            "Request answered"
        );
        Ok(response)
    }

    /// [`ask`](Self::ask) for end users: a fatal failure becomes a generic
    /// error response instead of an `Err`.
    pub async fn respond(&self, ctx: RequestContext) -> FinalResponse {
        let statuses = ctx.agent_statuses.clone();
        let context_id = ctx.context_id.clone();
        match self.ask(ctx).await {
            Ok(response) => response,
            Err(e) => {
                error!(context_id = %context_id, error = %e, "Request failed");
                FinalResponse::new("error", GENERIC_ERROR_MESSAGE).with_agent_statuses(statuses.snapshot())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedInvoker, StubHandler, runtime};
    use askwise_core::error::InvocationError;
    use askwise_core::response::HandlerResponse;
    use serde_json::json;

    const ROUTER: &str = "ASK_DIGBI_INTENT_CLASSIFIER_AGENT";
    const SUMMARIZER: &str = "ASK_DIGBI_SUMMARIZER_AGENT";

    fn orchestrator(invoker: Arc<ScriptedInvoker>, registry: HandlerRegistry) -> Orchestrator {
        Orchestrator::new(runtime(invoker), registry, &OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn verdict_runs_no_handler() {
        let invoker = Arc::new(ScriptedInvoker::new().with_structured(
            ROUTER,
            json!({"actions": [{"action": "respond_directly", "message": "Hello!"}]}),
        ));
        let handler = Arc::new(StubHandler::echo("nutrition_agent"));
        let orch = orchestrator(invoker.clone(), HandlerRegistry::new().with(handler.clone()));

        let response = orch.ask(RequestContext::new("hi")).await.unwrap();

        assert_eq!(response.status, "respond_directly");
        assert_eq!(response.message, "Hello!");
        assert_eq!(handler.calls(), 0);
        assert_eq!(invoker.calls(SUMMARIZER), 0);
    }

    #[tokio::test]
    async fn delegation_is_summarized_with_language() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .with_structured(
                    ROUTER,
                    json!({
                        "actions": [
                            {"action": "delegate", "agent": "nutrition_agent", "revised_query": "oats?"},
                            {"action": "delegate", "agent": "personalization_agent", "revised_query": "my logs?"}
                        ],
                        "details": {"intent": "breakfast"},
                        "language": "es"
                    }),
                )
                .with_structured(SUMMARIZER, json!({"status": "completed", "message": "Todo junto"})),
        );
        let registry = HandlerRegistry::new()
            .with(Arc::new(StubHandler::echo("nutrition_agent")))
            .with(Arc::new(StubHandler::language_reader("personalization_agent")));
        let orch = orchestrator(invoker.clone(), registry);

        let response = orch.ask(RequestContext::new("breakfast and logs")).await.unwrap();

        assert_eq!(response.message, "Todo junto");
        assert_eq!(response.agent_statuses.len(), 2);

        let request = &invoker.requests_for(SUMMARIZER)[0];
        assert_eq!(request.variables["details"], json!({"intent": "breakfast"}));
        assert_eq!(request.variables["language"], json!("es"));
        assert_eq!(
            request.variables["formatted_responses"],
            json!([
                {"status": "completed", "message": "oats?", "agent": "nutrition_agent"},
                {"status": "completed", "message": "es", "agent": "personalization_agent"}
            ])
        );
    }

    #[tokio::test]
    async fn terminal_answer_is_verbatim() {
        let invoker = Arc::new(ScriptedInvoker::new().with_structured(
            ROUTER,
            json!({"actions": [
                {"action": "delegate", "agent": "nutrition_agent"},
                {"action": "delegate", "agent": "nora_recipe_agent"}
            ]}),
        ));
        let registry = HandlerRegistry::new()
            .with(Arc::new(StubHandler::echo("nutrition_agent")))
            .with(Arc::new(StubHandler::fixed(
                "nora_recipe_agent",
                HandlerResponse::completed("M"),
            )));
        let orch = orchestrator(invoker.clone(), registry);

        let response = orch.ask(RequestContext::new("recipes")).await.unwrap();

        assert_eq!(response.message, "M");
        assert_eq!(invoker.calls(SUMMARIZER), 0);
    }

    #[tokio::test]
    async fn routing_failure_is_fatal_but_respond_apologises() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .with_error(ROUTER, InvocationError::Timeout("120s".into()))
                .with_error(ROUTER, InvocationError::Timeout("120s".into())),
        );
        let handler = Arc::new(StubHandler::echo("nutrition_agent"));
        let orch = orchestrator(invoker, HandlerRegistry::new().with(handler.clone()));

        let err = orch.ask(RequestContext::new("q")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Routing(_)));

        let response = orch.respond(RequestContext::new("q")).await;
        assert_eq!(response.status, "error");
        assert_eq!(response.message, GENERIC_ERROR_MESSAGE);
        assert_eq!(response.agent_statuses.len(), 1);
        assert_eq!(handler.calls(), 0);
    }
}

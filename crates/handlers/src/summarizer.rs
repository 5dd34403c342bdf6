//! Summarizer: merges the handler results of one request into one answer.
//!
//! Not routed to; the aggregator calls [`Summarizer::summarize`] when no
//! terminal capability answered. For preview users with a support answer in
//! the mix, the summarizer must recommend videos. Every summary is guarded
//! against phantom video references and links repeated from its action cards.

use crate::runtime::{CapabilityRuntime, Guarded, flagged};
use askwise_core::context::RequestContext;
use askwise_core::error::HandlerError;
use askwise_core::invoker::{InvocationOutput, InvocationRequest, ModelOutput};
use askwise_core::message::Message;
use askwise_core::response::HandlerReply;
use askwise_guardrails::{
    DuplicateLinkGuardrail, GuardrailRetry, GuardrailSet, ReferencedVideoGuardrail,
    DUPLICATE_LINK_GUIDANCE, VIDEO_GUIDANCE,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub const RECOMMEND_VIDEOS_TOOL: &str = "recommend_videos";

pub struct Summarizer {
    runtime: Arc<CapabilityRuntime>,
    capability_id: String,
    retry: GuardrailRetry,
}

impl Summarizer {
    pub fn new(runtime: Arc<CapabilityRuntime>, capability_id: impl Into<String>) -> Self {
        let guardrails = GuardrailSet::new()
            .with(Arc::new(ReferencedVideoGuardrail))
            .with(Arc::new(DuplicateLinkGuardrail));
        let retry = GuardrailRetry::new(guardrails, VIDEO_GUIDANCE)
            .with_guidance("summarizer_no_duplicate_links", DUPLICATE_LINK_GUIDANCE);
        Self {
            runtime,
            capability_id: capability_id.into(),
            retry,
        }
    }

    pub fn capability_id(&self) -> &str {
        &self.capability_id
    }

    /// Whether this request gets video recommendations.
    pub fn wants_videos(ctx: &RequestContext, formatted_responses: &[Value]) -> bool {
        ctx.is_alpha_user()
            && formatted_responses.iter().any(|r| {
                r.get("agent").and_then(Value::as_str) == Some("support_agent")
                    && r.get("status").and_then(Value::as_str) != Some("rejected")
            })
    }

    /// Summarize `formatted_responses` (each tagged with its `agent`) for
    /// the context's query.
    pub async fn summarize(
        &self,
        ctx: &RequestContext,
        formatted_responses: Vec<Value>,
        details: &Value,
    ) -> Result<HandlerReply, HandlerError> {
        let with_videos = Self::wants_videos(ctx, &formatted_responses);
        info!(
            responses = formatted_responses.len(),
            videos = with_videos,
            "Summarizing handler responses"
        );

        let request = if with_videos {
            InvocationRequest::structured(&self.capability_id).with_tool_choice(RECOMMEND_VIDEOS_TOOL)
        } else {
            InvocationRequest::new(&self.capability_id, self.runtime.output_shape(&self.capability_id))
        };
        let request = request
            .with_variable("formatted_responses", Value::Array(formatted_responses))
            .with_variable("details", details.clone())
            .with_messages(vec![Message::user(ctx.query.clone())]);

        match self
            .runtime
            .invoke_guarded(ctx, request, &self.retry, None)
            .await?
        {
            Guarded::Output(output) => self.reply(output),
            Guarded::Exhausted(payload) => Ok(payload.into()),
        }
    }

    fn reply(&self, output: InvocationOutput) -> Result<HandlerReply, HandlerError> {
        if let ModelOutput::Text(text) = output.output {
            return Ok(HandlerReply::Text(text));
        }
        Ok(flagged(&self.capability_id, &output)?.into_response().into())
    }
}

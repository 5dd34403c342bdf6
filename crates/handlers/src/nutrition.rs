//! Nutrition handler: knowledge-base answers that must not promise videos
//! the response does not carry.

use crate::runtime::{CapabilityRuntime, Guarded, flagged};
use askwise_core::context::RequestContext;
use askwise_core::error::HandlerError;
use askwise_core::handler::CapabilityHandler;
use askwise_core::invoker::InvocationRequest;
use askwise_core::message::Message;
use askwise_core::response::HandlerReply;
use askwise_guardrails::{
    GuardrailRetry, GuardrailSet, KnowledgeBaseRetry, ReferencedVideoGuardrail, VIDEO_GUIDANCE,
};
use async_trait::async_trait;
use std::sync::Arc;

const NUTRITION_CAPABILITY: &str = "ASK_DIGBI_NUTRITION_AGENT";

pub struct NutritionHandler {
    runtime: Arc<CapabilityRuntime>,
    retry: GuardrailRetry,
    kb: KnowledgeBaseRetry,
}

impl NutritionHandler {
    pub fn new(runtime: Arc<CapabilityRuntime>) -> Self {
        Self {
            runtime,
            retry: GuardrailRetry::new(
                GuardrailSet::new().with(Arc::new(ReferencedVideoGuardrail)),
                VIDEO_GUIDANCE,
            ),
            kb: KnowledgeBaseRetry::default(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for NutritionHandler {
    fn id(&self) -> &str {
        "nutrition_agent"
    }

    async fn respond(&self, ctx: &mut RequestContext) -> Result<HandlerReply, HandlerError> {
        let request = InvocationRequest::structured(NUTRITION_CAPABILITY)
            .with_messages(vec![Message::user(ctx.query.clone())]);

        match self
            .runtime
            .invoke_guarded(ctx, request, &self.retry, Some(&self.kb))
            .await?
        {
            Guarded::Output(output) => Ok(flagged(NUTRITION_CAPABILITY, &output)?.into_response().into()),
            Guarded::Exhausted(payload) => Ok(payload.into()),
        }
    }
}

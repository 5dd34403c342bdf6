//! Health insights handler.
//!
//! Report-backed answers come first; when the report capability cannot
//! answer (`status != "success"`) the general knowledge capability takes
//! over. Users without a token have no reports, so the handler skips.

use crate::runtime::{CapabilityRuntime, flagged};
use askwise_core::context::RequestContext;
use askwise_core::error::HandlerError;
use askwise_core::handler::CapabilityHandler;
use askwise_core::invoker::InvocationRequest;
use askwise_core::message::Message;
use askwise_core::response::{FlaggedResponse, HandlerReply, HandlerResponse};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

const INSIGHTS_CAPABILITY: &str = "ASK_DIGBI_HEALTH_INSIGHTS_AGENT";
const FALLBACK_CAPABILITY: &str = "ASK_DIGBI_HEALTH_INSIGHTS_GPT_AGENT";

pub struct InsightsHandler {
    runtime: Arc<CapabilityRuntime>,
}

impl InsightsHandler {
    pub fn new(runtime: Arc<CapabilityRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl CapabilityHandler for InsightsHandler {
    fn id(&self) -> &str {
        "health_insights_agent"
    }

    async fn respond(&self, ctx: &mut RequestContext) -> Result<HandlerReply, HandlerError> {
        if ctx.user_token.is_none() {
            debug!("No user token, skipping health insights");
            return Ok(HandlerResponse::new("skipped", "").into());
        }

        let messages = vec![Message::user(ctx.query.clone())];
        let output = self
            .runtime
            .invoke(
                ctx,
                InvocationRequest::structured(INSIGHTS_CAPABILITY).with_messages(messages.clone()),
            )
            .await?;
        let report = output
            .output
            .as_structured()
            .and_then(FlaggedResponse::from_value)
            .ok_or_else(|| HandlerError::UnexpectedOutput {
                capability: INSIGHTS_CAPABILITY.to_string(),
                reason: "expected a JSON object".into(),
            })?;

        if report.response.status.eq_ignore_ascii_case("success") {
            return Ok(report.into_response().into());
        }

        info!(status = %report.response.status, "Insights report could not answer, using fallback");
        let request = InvocationRequest::new(FALLBACK_CAPABILITY, self.runtime.output_shape(FALLBACK_CAPABILITY))
            .with_messages(messages);
        let fallback = self.runtime.invoke(ctx, request).await?;
        Ok(flagged(FALLBACK_CAPABILITY, &fallback)?.into_response().into())
    }
}

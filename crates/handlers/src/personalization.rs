//! Personalization handler: free-text answers about the user's own logs.

use crate::runtime::CapabilityRuntime;
use askwise_core::context::RequestContext;
use askwise_core::error::HandlerError;
use askwise_core::handler::CapabilityHandler;
use askwise_core::invoker::InvocationRequest;
use askwise_core::message::Message;
use askwise_core::response::{HandlerReply, HandlerResponse};
use async_trait::async_trait;
use std::sync::Arc;

const USER_DATA_CAPABILITY: &str = "USER_DATA_AGENT";

pub struct PersonalizationHandler {
    runtime: Arc<CapabilityRuntime>,
}

impl PersonalizationHandler {
    pub fn new(runtime: Arc<CapabilityRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl CapabilityHandler for PersonalizationHandler {
    fn id(&self) -> &str {
        "personalization_agent"
    }

    async fn respond(&self, ctx: &mut RequestContext) -> Result<HandlerReply, HandlerError> {
        let request = InvocationRequest::text(USER_DATA_CAPABILITY)
            .with_messages(vec![Message::user(ctx.query.clone())]);
        let output = self.runtime.invoke(ctx, request).await?;

        let message = match output.output.message() {
            Some(text) => text.to_string(),
            None => output.output.into_value().to_string(),
        };
        Ok(HandlerResponse::new("accepted", message).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedInvoker, engine_with, runtime_with};
    use serde_json::json;

    #[tokio::test]
    async fn text_answer_is_accepted() {
        let invoker = Arc::new(
            ScriptedInvoker::new().with_text(USER_DATA_CAPABILITY, "You logged 3 meals yesterday."),
        );
        let engine = engine_with(json!({"meal_logs": [7, 8, 6], "gender": "female"}));
        let handler = PersonalizationHandler::new(Arc::new(runtime_with(invoker.clone(), Some(engine), None)));
        let mut ctx = RequestContext::new("how many meals did I log?").with_user_token("tok");

        let reply = handler.respond(&mut ctx).await.unwrap();
        assert_eq!(
            reply,
            HandlerReply::Response(HandlerResponse::new("accepted", "You logged 3 meals yesterday."))
        );

        let request = &invoker.requests_for(USER_DATA_CAPABILITY)[0];
        assert_eq!(request.variables["meal_logs"], json!([7, 8, 6]));
        assert_eq!(request.variables["gender"], json!("female"));
        assert!(!request.variables.contains_key("weight_logs"));
    }
}

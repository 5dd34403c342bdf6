//! Support handler.
//!
//! A classifier capability first decides whether the support question can
//! be answered directly or which specialised support capability should take
//! it. The delegated call is guarded against kit-registration advice and
//! must consult the knowledge base.

use crate::runtime::{CapabilityRuntime, Guarded, flagged};
use askwise_core::action::Action;
use askwise_core::context::RequestContext;
use askwise_core::error::HandlerError;
use askwise_core::handler::CapabilityHandler;
use askwise_core::invoker::InvocationRequest;
use askwise_core::message::Message;
use askwise_core::response::{
    ComponentKind, HandlerReply, HandlerResponse, InteractiveComponent, Meta, ScreenName,
};
use askwise_guardrails::{
    GuardrailRetry, GuardrailSet, KitRegistrationGuardrail, KnowledgeBaseRetry,
    KIT_REGISTRATION_GUIDANCE,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

const CLASSIFIER_CAPABILITY: &str = "SUPPORT_AGENT";
const DEFAULT_SUPPORT_CAPABILITY: &str = "ASK_DIGBI_SUPPORT_AGENT";

pub const INVITE_DEPENDENT_TEXT: &str = "Share Digbi for free!";

#[derive(Debug, Default, Deserialize)]
struct SupportPlan {
    #[serde(default)]
    actions: Vec<Action>,
    /// Values the classifier already looked up, forwarded to the delegate
    #[serde(default)]
    data_to_use: Map<String, Value>,
}

pub struct SupportHandler {
    runtime: Arc<CapabilityRuntime>,
    retry: GuardrailRetry,
    kb: KnowledgeBaseRetry,
}

impl SupportHandler {
    pub fn new(runtime: Arc<CapabilityRuntime>) -> Self {
        Self {
            runtime,
            retry: GuardrailRetry::new(
                GuardrailSet::new().with(Arc::new(KitRegistrationGuardrail)),
                KIT_REGISTRATION_GUIDANCE,
            ),
            kb: KnowledgeBaseRetry::default(),
        }
    }

    async fn plan(&self, ctx: &RequestContext) -> Result<SupportPlan, HandlerError> {
        let request = InvocationRequest::structured(CLASSIFIER_CAPABILITY)
            .with_messages(vec![Message::user(ctx.query.clone())]);
        let output = self.runtime.invoke(ctx, request).await?;
        let value = output.output.into_value();
        serde_json::from_value(value).map_err(|e| HandlerError::UnexpectedOutput {
            capability: CLASSIFIER_CAPABILITY.to_string(),
            reason: e.to_string(),
        })
    }
}

fn invite_dependent_component() -> InteractiveComponent {
    InteractiveComponent::new(ScreenName::InviteDependent, ComponentKind::Slideup, INVITE_DEPENDENT_TEXT)
        .with_icon("ask-digbi-invite-family")
        .with_color("blue")
}

#[async_trait]
impl CapabilityHandler for SupportHandler {
    fn id(&self) -> &str {
        "support_agent"
    }

    async fn respond(&self, ctx: &mut RequestContext) -> Result<HandlerReply, HandlerError> {
        let plan = self.plan(ctx).await?;
        let Some(action) = plan.actions.first() else {
            return Ok(HandlerResponse::error("No actions provided").into());
        };

        if !plan.data_to_use.is_empty() {
            debug!(keys = ?plan.data_to_use.keys().collect::<Vec<_>>(), "Support classifier supplied data");
        }
        ctx.data.extend(plan.data_to_use);

        if action.verb.is_non_delegating() {
            info!(verb = %action.verb, "Support classifier answered directly");
            return Ok(HandlerResponse::new(action.verb.as_str(), action.message.trim())
                .with_meta(Meta::new())
                .into());
        }

        let capability = match action.capability_id.trim() {
            "" => DEFAULT_SUPPORT_CAPABILITY,
            id => id,
        };
        let request = InvocationRequest::structured(capability)
            .with_messages(vec![Message::user(ctx.query.clone())]);

        let output = match self
            .runtime
            .invoke_guarded(ctx, request, &self.retry, Some(&self.kb))
            .await?
        {
            Guarded::Output(output) => output,
            Guarded::Exhausted(payload) => return Ok(payload.into()),
        };

        let answer = flagged(capability, &output)?;
        let mut meta = answer
            .response
            .meta
            .clone()
            .and_then(|m| serde_json::from_value::<Meta>(m).ok())
            .unwrap_or_default();
        if answer.flag("invite_dependent_intent") {
            meta = meta.with_action(invite_dependent_component());
        }

        let HandlerResponse { status, message, .. } = answer.into_response();
        Ok(HandlerResponse::new(status, message)
            .with_meta(Value::String(meta.to_json_string()))
            .into())
    }
}

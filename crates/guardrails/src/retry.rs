//! Guardrail-driven retry-once policy.
//!
//! `Normal → (trip) → Retrying → (pass) Passed | (trip) Exhausted`. There is
//! never a third invocation.

use crate::guardrail::{GuardrailSet, GuardrailTrip};
use askwise_core::error::InvocationError;
use askwise_core::invoker::{InvocationOutput, ModelOutput};
use askwise_core::message::Message;
use askwise_core::response::HandlerResponse;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use tracing::{info, warn};

/// Which invocation of the policy is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retry,
}

/// Outcome of a guarded invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// An attempt passed every guardrail.
    Passed {
        output: InvocationOutput,
        attempts: u8,
    },
    /// The retry tripped again.
    Exhausted { trip: GuardrailTrip },
}

impl RetryOutcome {
    /// The passing output, or the fixed `{status:"error", message, meta:{}}`
    /// payload of the guardrail that tripped last.
    pub fn into_result(self) -> Result<InvocationOutput, HandlerResponse> {
        match self {
            RetryOutcome::Passed { output, .. } => Ok(output),
            RetryOutcome::Exhausted { trip } => Err(HandlerResponse::error_with_empty_meta(trip.message)),
        }
    }
}

/// Run an invocation, and on a guardrail trip re-run it exactly once with
/// corrective guidance appended to the original messages.
#[derive(Debug, Clone)]
pub struct GuardrailRetry {
    guardrails: GuardrailSet,
    guidance: HashMap<String, String>,
    default_guidance: String,
}

impl GuardrailRetry {
    pub fn new(guardrails: GuardrailSet, default_guidance: impl Into<String>) -> Self {
        Self {
            guardrails,
            guidance: HashMap::new(),
            default_guidance: default_guidance.into(),
        }
    }

    /// Map a guardrail name (or a trip message) to its guidance text.
    pub fn with_guidance(mut self, key: impl Into<String>, guidance: impl Into<String>) -> Self {
        self.guidance.insert(key.into(), guidance.into());
        self
    }

    pub fn guardrails(&self) -> &GuardrailSet {
        &self.guardrails
    }

    /// Guidance for a trip: by guardrail name, then by trip info or
    /// message, then the default.
    pub fn guidance_for(&self, trip: &GuardrailTrip) -> &str {
        let by_info = trip.info.as_str().and_then(|info| self.guidance.get(info));
        self.guidance
            .get(&trip.guardrail)
            .or(by_info)
            .or_else(|| self.guidance.get(&trip.message))
            .map(String::as_str)
            .unwrap_or(&self.default_guidance)
    }

    /// Messages for the retry: `original + [assistant(prior), system(guidance)]`.
    pub fn retry_messages(
        &self,
        original: &[Message],
        prior: &ModelOutput,
        trip: &GuardrailTrip,
    ) -> Vec<Message> {
        let mut messages = original.to_vec();
        messages.push(Message::assistant(prior_text(prior)));
        messages.push(Message::system(self.guidance_for(trip)));
        messages
    }

    /// Run the guarded invocation.
    ///
    /// `invoke` receives the attempt and the message list to send. Invocation
    /// errors propagate unchanged; only guardrail trips are retried.
    pub async fn run<F, Fut>(
        &self,
        messages: Vec<Message>,
        mut invoke: F,
    ) -> Result<RetryOutcome, InvocationError>
    where
        F: FnMut(Attempt, Vec<Message>) -> Fut,
        Fut: Future<Output = Result<InvocationOutput, InvocationError>>,
    {
        let first = invoke(Attempt::First, messages.clone()).await?;
        let trip = match self.guardrails.evaluate(&first.output) {
            Ok(()) => {
                return Ok(RetryOutcome::Passed {
                    output: first,
                    attempts: 1,
                });
            }
            Err(trip) => trip,
        };

        info!(guardrail = %trip.guardrail, "Retrying once with corrective guidance");
        let retry_messages = self.retry_messages(&messages, &first.output, &trip);
        let second = invoke(Attempt::Retry, retry_messages).await?;

        match self.guardrails.evaluate(&second.output) {
            Ok(()) => Ok(RetryOutcome::Passed {
                output: second,
                attempts: 2,
            }),
            Err(trip) => {
                warn!(guardrail = %trip.guardrail, "Guardrail tripped on retry, giving up");
                Ok(RetryOutcome::Exhausted { trip })
            }
        }
    }
}

/// Text of the tripped output to replay as the assistant turn.
///
/// First non-empty of: the output's message, any `actions[].message`;
/// otherwise the JSON form of the output.
fn prior_text(output: &ModelOutput) -> String {
    if let Some(message) = output.message().filter(|m| !m.trim().is_empty()) {
        return message.to_string();
    }
    if let Some(Value::Array(actions)) = output.as_structured().and_then(|v| v.get("actions")) {
        let candidate = actions
            .iter()
            .filter_map(|a| a.get("message").and_then(Value::as_str))
            .find(|m| !m.trim().is_empty());
        if let Some(message) = candidate {
            return message.to_string();
        }
    }
    match output {
        ModelOutput::Text(text) => text.clone(),
        ModelOutput::Structured(value) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{DuplicateLinkGuardrail, ReferencedVideoGuardrail, DUPLICATE_LINK_MESSAGE, REFERENCED_VIDEO_MESSAGE};
    use askwise_core::message::Role;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const VIDEO_GUIDANCE: &str = "Video guidance: remove video references.";
    const LINK_GUIDANCE: &str = "Hyperlink guidance: remove duplicate links.";

    fn policy() -> GuardrailRetry {
        GuardrailRetry::new(
            GuardrailSet::new()
                .with(Arc::new(ReferencedVideoGuardrail))
                .with(Arc::new(DuplicateLinkGuardrail)),
            VIDEO_GUIDANCE,
        )
        .with_guidance("summarizer_no_duplicate_links", LINK_GUIDANCE)
    }

    fn tripping() -> InvocationOutput {
        InvocationOutput::new(ModelOutput::Structured(json!({
            "status": "completed",
            "message": "Watch the video!",
            "message_references_a_video": true
        })))
    }

    fn clean() -> InvocationOutput {
        InvocationOutput::new(ModelOutput::Structured(json!({
            "status": "completed",
            "message": "Here is your answer."
        })))
    }

    /// Returns queued outputs and records every message list it was sent.
    struct Script {
        outputs: Mutex<Vec<InvocationOutput>>,
        calls: Mutex<Vec<(Attempt, Vec<Message>)>>,
    }

    impl Script {
        fn new(outputs: Vec<InvocationOutput>) -> Self {
            Self {
                outputs: Mutex::new(outputs),
                calls: Mutex::new(Vec::new()),
            }
        }

        async fn invoke(&self, attempt: Attempt, messages: Vec<Message>) -> Result<InvocationOutput, InvocationError> {
            self.calls.lock().unwrap().push((attempt, messages));
            Ok(self.outputs.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn passing_first_attempt_invokes_once() {
        let script = Script::new(vec![clean()]);
        let outcome = policy()
            .run(vec![Message::user("q")], |a, m| script.invoke(a, m))
            .await
            .unwrap();

        assert!(matches!(outcome, RetryOutcome::Passed { attempts: 1, .. }));
        assert_eq!(script.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn trip_then_pass_appends_assistant_and_guidance() {
        let script = Script::new(vec![tripping(), clean()]);
        let original = vec![Message::system("prompt"), Message::user("q")];

        let outcome = policy()
            .run(original.clone(), |a, m| script.invoke(a, m))
            .await
            .unwrap();

        let RetryOutcome::Passed { output, attempts } = outcome else {
            panic!("expected pass");
        };
        assert_eq!(attempts, 2);
        assert_eq!(output.output.message(), Some("Here is your answer."));

        let calls = script.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, Attempt::Retry);
        let retry = &calls[1].1;
        assert_eq!(retry.len(), 4);
        assert_eq!(&retry[..2], &original[..]);
        assert_eq!(retry[2].role, Role::Assistant);
        assert_eq!(retry[2].content, "Watch the video!");
        assert_eq!(retry[3].role, Role::System);
        assert_eq!(retry[3].content, VIDEO_GUIDANCE);
    }

    #[tokio::test]
    async fn two_trips_exhaust_with_fixed_message() {
        let script = Script::new(vec![tripping(), tripping()]);
        let outcome = policy()
            .run(vec![Message::user("q")], |a, m| script.invoke(a, m))
            .await
            .unwrap();

        assert_eq!(script.calls.lock().unwrap().len(), 2);
        let payload = outcome.into_result().unwrap_err();
        assert_eq!(
            serde_json::to_value(payload).unwrap(),
            json!({"status": "error", "message": REFERENCED_VIDEO_MESSAGE, "meta": {}})
        );
    }

    #[tokio::test]
    async fn invocation_error_propagates() {
        let outcome = policy()
            .run(vec![Message::user("q")], |_, _| async {
                Err(InvocationError::Timeout("30s".into()))
            })
            .await;
        assert!(matches!(outcome, Err(InvocationError::Timeout(_))));
    }

    #[test]
    fn guidance_lookup_order() {
        let p = policy().with_guidance(DUPLICATE_LINK_MESSAGE, "by message");
        let by_name = GuardrailTrip {
            guardrail: "summarizer_no_duplicate_links".into(),
            message: DUPLICATE_LINK_MESSAGE.into(),
            info: Value::Null,
        };
        assert_eq!(p.guidance_for(&by_name), LINK_GUIDANCE);

        let by_info = GuardrailTrip {
            guardrail: "custom".into(),
            message: "other".into(),
            info: json!(DUPLICATE_LINK_MESSAGE),
        };
        assert_eq!(p.guidance_for(&by_info), "by message");

        let fallback = GuardrailTrip {
            guardrail: "custom".into(),
            message: "other".into(),
            info: Value::Null,
        };
        assert_eq!(p.guidance_for(&fallback), VIDEO_GUIDANCE);
    }

    #[test]
    fn prior_text_falls_back_to_actions_then_json() {
        let from_actions = ModelOutput::Structured(json!({
            "actions": [{"message": ""}, {"message": "Please register your kit."}]
        }));
        assert_eq!(prior_text(&from_actions), "Please register your kit.");

        let bare = ModelOutput::Structured(json!({"status": "completed"}));
        assert_eq!(prior_text(&bare), r#"{"status":"completed"}"#);
    }
}

//! Routing actions produced by the intent router.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the router wants done with one slice of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionVerb {
    /// Answer with the action's message, no handler involved
    RespondDirectly,
    /// Ask the user a follow-up question
    Clarify,
    /// Decline the request
    Reject,
    /// Acknowledge without further work
    Acknowledge,
    /// Hand the request to a capability handler
    #[default]
    Delegate,
}

impl ActionVerb {
    /// Wire name, also used as the response status of an early return.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionVerb::RespondDirectly => "respond_directly",
            ActionVerb::Clarify => "request_clarification",
            ActionVerb::Reject => "reject",
            ActionVerb::Acknowledge => "acknowledge",
            ActionVerb::Delegate => "delegate",
        }
    }

    /// Verbs that end the request without running any handler.
    pub fn is_non_delegating(&self) -> bool {
        !matches!(self, ActionVerb::Delegate)
    }
}

impl From<&str> for ActionVerb {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "respond_directly" => ActionVerb::RespondDirectly,
            "request_clarification" | "clarify" => ActionVerb::Clarify,
            "reject" => ActionVerb::Reject,
            "acknowledge" => ActionVerb::Acknowledge,
            _ => ActionVerb::Delegate,
        }
    }
}

impl From<String> for ActionVerb {
    fn from(s: String) -> Self {
        ActionVerb::from(s.as_str())
    }
}

impl From<ActionVerb> for String {
    fn from(verb: ActionVerb) -> Self {
        verb.as_str().to_string()
    }
}

impl std::fmt::Display for ActionVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One routed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Target capability (ignored for non-delegating verbs)
    #[serde(rename = "agent", default)]
    pub capability_id: String,

    #[serde(rename = "action", default)]
    pub verb: ActionVerb,

    /// Message for the user, or routing rationale when delegating
    #[serde(default)]
    pub message: String,

    /// Sub-query the capability should answer instead of the raw query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_query: Option<String>,

    /// Knowledge-base file filters forwarded to the capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_filters: Option<serde_json::Map<String, Value>>,
}

impl Action {
    /// Delegate to a capability.
    pub fn delegate(capability_id: impl Into<String>) -> Self {
        Self {
            capability_id: capability_id.into(),
            verb: ActionVerb::Delegate,
            message: String::new(),
            revised_query: None,
            file_filters: None,
        }
    }

    /// A non-delegating verdict carrying a user-facing message.
    pub fn verdict(verb: ActionVerb, message: impl Into<String>) -> Self {
        Self {
            capability_id: String::new(),
            verb,
            message: message.into(),
            revised_query: None,
            file_filters: None,
        }
    }

    pub fn with_revised_query(mut self, query: impl Into<String>) -> Self {
        self.revised_query = Some(query.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Structured output of the intent router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Extra routing context forwarded to the summarizer
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,

    /// Detected response language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl RoutingDecision {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            actions,
            ..Self::default()
        }
    }

    /// The first action when it ends the request without delegation.
    pub fn early_verdict(&self) -> Option<&Action> {
        self.actions.first().filter(|a| a.verb.is_non_delegating())
    }
}

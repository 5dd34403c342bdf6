//! Handler responses, interactive components, and the final response.

use crate::context::AgentStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// What every capability handler returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse {
    pub status: String,

    #[serde(default)]
    pub message: String,

    /// Structured metadata, either an object or a JSON-encoded string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl HandlerResponse {
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
            meta: None,
        }
    }

    pub fn completed(message: impl Into<String>) -> Self {
        Self::new("completed", message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new("rejected", message)
    }

    /// Attach metadata.
    pub fn with_meta(mut self, meta: impl Into<Value>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    /// `{status:"error", message, meta:{}}`, the payload of an exhausted retry.
    pub fn error_with_empty_meta(message: impl Into<String>) -> Self {
        Self::error(message).with_meta(Value::Object(Map::new()))
    }

    pub fn is_rejected(&self) -> bool {
        self.status.eq_ignore_ascii_case("rejected")
    }
}

/// The raw reply of a handler before aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerReply {
    Response(HandlerResponse),
    /// A bare string; aggregation wraps it under a `response` key
    Text(String),
}

impl From<HandlerResponse> for HandlerReply {
    fn from(response: HandlerResponse) -> Self {
        HandlerReply::Response(response)
    }
}

impl From<String> for HandlerReply {
    fn from(text: String) -> Self {
        HandlerReply::Text(text)
    }
}

/// Kind of client screen an interactive component opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenName {
    VideoPopUpScreen,
    Recipe,
    InviteDependent,
}

/// How the client presents an interactive component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentKind {
    Route,
    Slideup,
}

/// A resource referenced by an interactive component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub title: String,
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Value>,
}

/// A client-side action attached to a response (`meta.actions[]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveComponent {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    pub display_text: String,
    pub screen_name: ScreenName,

    #[serde(rename = "type")]
    pub kind: ComponentKind,

    #[serde(default)]
    pub data: Vec<Resource>,
}

impl InteractiveComponent {
    pub fn new(screen_name: ScreenName, kind: ComponentKind, display_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            icon: None,
            color: None,
            display_text: display_text.into(),
            screen_name,
            kind,
            data: Vec::new(),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.data.push(resource);
        self
    }
}

/// Typed response metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<InteractiveComponent>,

    /// Any other metadata keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: InteractiveComponent) -> Self {
        self.actions.push(action);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.extra.is_empty()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// JSON-encoded form, as some handlers emit it.
    pub fn to_json_string(&self) -> String {
        self.to_value().to_string()
    }
}

impl From<Meta> for Value {
    fn from(meta: Meta) -> Self {
        meta.to_value()
    }
}

/// A typed response plus the boolean/threshold flags a model adds next to it.
///
/// Structured model outputs mix `status`/`message`/`meta` with arbitrary
/// extra fields (`kit_registration_intent`, `message_references_a_video`, ...).
/// The extras live in `flags` and are merged back only when serializing.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedResponse {
    pub response: HandlerResponse,
    pub flags: Map<String, Value>,
}

impl FlaggedResponse {
    /// Split a structured output into the typed core and its flags.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let mut flags = object.clone();
        let status = flags
            .remove("status")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "completed".to_string());
        let message = flags
            .remove("message")
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .unwrap_or_default();
        let meta = flags.remove("meta").filter(|m| !m.is_null());
        Some(Self {
            response: HandlerResponse {
                status,
                message,
                meta,
            },
            flags,
        })
    }

    /// Recombine core and flags into one object.
    pub fn to_value(&self) -> Value {
        let mut object = self.flags.clone();
        object.insert("status".into(), Value::String(self.response.status.clone()));
        object.insert("message".into(), Value::String(self.response.message.clone()));
        if let Some(meta) = &self.response.meta {
            object.insert("meta".into(), meta.clone());
        }
        Value::Object(object)
    }

    /// Read a flag as a boolean; accepts `true` and the strings `"true"`/`"TRUE"`.
    pub fn flag(&self, name: &str) -> bool {
        match self.flags.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Read a flag as a string.
    pub fn flag_str(&self, name: &str) -> Option<&str> {
        self.flags.get(name).and_then(Value::as_str)
    }

    pub fn into_response(self) -> HandlerResponse {
        self.response
    }
}

/// The answer returned to the caller for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub status: String,
    pub message: String,

    #[serde(default)]
    pub meta: Map<String, Value>,

    #[serde(default)]
    pub agent_statuses: Vec<AgentStatus>,
}

impl FinalResponse {
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
            meta: Map::new(),
            agent_statuses: Vec::new(),
        }
    }

    pub fn with_agent_statuses(mut self, statuses: Vec<AgentStatus>) -> Self {
        self.agent_statuses = statuses;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn component_serializes_wire_shape() {
        let component = InteractiveComponent::new(
            ScreenName::InviteDependent,
            ComponentKind::Slideup,
            "Share Digbi for free!",
        )
        .with_icon("ask-digbi-invite-family")
        .with_color("blue");

        let value = serde_json::to_value(&component).unwrap();
        assert_eq!(value["screen_name"], json!("InviteDependent"));
        assert_eq!(value["type"], json!("SLIDEUP"));
        assert_eq!(value["data"], json!([]));
    }

    #[test]
    fn meta_flattens_extra_keys() {
        let mut meta = Meta::new();
        meta.extra.insert("source".into(), json!("kb"));
        let value = meta.to_value();
        assert_eq!(value, json!({"source": "kb"}));
        assert!(Meta::new().is_empty());
    }

    #[test]
    fn flagged_response_splits_and_recombines() {
        let raw = json!({
            "status": "completed",
            "message": "Register your kit at ...",
            "kit_registration_intent": "REGISTER",
            "message_references_a_video": true
        });
        let flagged = FlaggedResponse::from_value(&raw).unwrap();

        assert_eq!(flagged.response.status, "completed");
        assert_eq!(flagged.flag_str("kit_registration_intent"), Some("REGISTER"));
        assert!(flagged.flag("message_references_a_video"));
        assert!(!flagged.flag("missing"));
        assert_eq!(flagged.to_value(), raw);
    }

    #[test]
    fn flagged_response_rejects_non_objects() {
        assert!(FlaggedResponse::from_value(&json!("text")).is_none());
    }

    #[test]
    fn error_with_empty_meta_shape() {
        let value = serde_json::to_value(HandlerResponse::error_with_empty_meta("nope")).unwrap();
        assert_eq!(value, json!({"status": "error", "message": "nope", "meta": {}}));
    }
}

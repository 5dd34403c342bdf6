//! Per-request context.
//!
//! One [`RequestContext`] is created per inbound request. The fan-out
//! coordinator forks it once per delegated action: each fork owns its own
//! query and data bag, while the agent status log stays shared so every
//! capability run shows up in the final response.

use crate::message::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Free-form per-request data written and read by handlers.
pub type DataBag = serde_json::Map<String, Value>;

/// One capability run recorded on the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Capability identifier
    pub agent: String,

    /// Wall-clock duration in seconds, two decimals
    pub duration: String,

    /// Status reported by the capability, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl AgentStatus {
    pub fn new(agent: impl Into<String>, elapsed: Duration, status: Option<String>) -> Self {
        Self {
            agent: agent.into(),
            duration: format!("{:.2}", elapsed.as_secs_f64()),
            status,
        }
    }
}

/// Append-only status log shared by every fork of a request context.
#[derive(Debug, Clone, Default)]
pub struct AgentStatusLog(Arc<Mutex<Vec<AgentStatus>>>);

impl AgentStatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn record(&self, status: AgentStatus) {
        let mut entries = self.0.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(status);
    }

    /// Copy of all entries recorded so far, in recording order.
    pub fn snapshot(&self) -> Vec<AgentStatus> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything a capability handler knows about the request it serves.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Conversation/session identifier
    pub context_id: String,

    /// Identifier of this particular query
    pub query_id: String,

    /// The query this context answers (a fork holds its revised sub-query)
    pub query: String,

    /// Token used to fetch user-specific data
    pub user_token: Option<String>,

    /// Account tier (`alpha` enables preview features)
    pub user_type: Option<String>,

    /// Response language detected by the router
    pub language: Option<String>,

    /// Image attached to the request
    pub image_url: Option<String>,

    /// Screen or feature the request was sent from
    pub feature_context: Option<String>,

    /// Recent messages, any order
    pub conversation_history: Vec<Message>,

    /// Task-local data; deep-copied on every fork
    pub data: DataBag,

    /// Shared across forks
    pub agent_statuses: AgentStatusLog,
}

impl RequestContext {
    /// Create a context for a fresh query with generated identifiers.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            context_id: Uuid::new_v4().to_string(),
            query_id: Uuid::new_v4().to_string(),
            query: query.into(),
            user_token: None,
            user_type: None,
            language: None,
            image_url: None,
            feature_context: None,
            conversation_history: Vec::new(),
            data: DataBag::new(),
            agent_statuses: AgentStatusLog::new(),
        }
    }

    pub fn with_context_id(mut self, id: impl Into<String>) -> Self {
        self.context_id = id.into();
        self
    }

    pub fn with_user_token(mut self, token: impl Into<String>) -> Self {
        self.user_token = Some(token.into());
        self
    }

    pub fn with_user_type(mut self, user_type: impl Into<String>) -> Self {
        self.user_type = Some(user_type.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Fork this context for one concurrent task.
    ///
    /// The fork gets its own copy of the data bag and its own query
    /// (`revised_query` when given); `data["user_query"]` is set to that query.
    pub fn fork(&self, revised_query: Option<&str>) -> Self {
        let mut forked = self.clone();
        if let Some(query) = revised_query.filter(|q| !q.trim().is_empty()) {
            forked.query = query.to_string();
        }
        forked
            .data
            .insert("user_query".into(), Value::String(forked.query.clone()));
        forked
    }

    /// Look up a named value in the data bag first, then among context fields.
    pub fn field(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.data.get(name) {
            return Some(value.clone());
        }
        let text = match name {
            "query" | "user_query" => Some(self.query.clone()),
            "context_id" => Some(self.context_id.clone()),
            "query_id" => Some(self.query_id.clone()),
            "user_token" => self.user_token.clone(),
            "user_type" => self.user_type.clone(),
            "language" => self.language.clone(),
            "image_url" => self.image_url.clone(),
            "feature_context" => self.feature_context.clone(),
            _ => None,
        };
        text.map(Value::String)
    }

    /// True for accounts enrolled in preview features.
    pub fn is_alpha_user(&self) -> bool {
        self.user_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("alpha"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fork_isolates_data_bag() {
        let base = RequestContext::new("original").with_data("x", json!(1));
        let mut a = base.fork(Some("sub query a"));
        let b = base.fork(None);

        a.data.insert("x".into(), json!(2));

        assert_eq!(a.data["x"], json!(2));
        assert_eq!(b.data["x"], json!(1));
        assert_eq!(base.data["x"], json!(1));
    }

    #[test]
    fn fork_substitutes_query() {
        let base = RequestContext::new("original");
        let forked = base.fork(Some("revised"));
        assert_eq!(forked.query, "revised");
        assert_eq!(forked.data["user_query"], json!("revised"));

        let blank = base.fork(Some("  "));
        assert_eq!(blank.query, "original");
        assert_eq!(base.query, "original");
    }

    #[test]
    fn forks_share_status_log() {
        let base = RequestContext::new("q");
        let a = base.fork(None);
        let b = base.fork(None);

        a.agent_statuses
            .record(AgentStatus::new("a", Duration::from_millis(1250), None));
        b.agent_statuses.record(AgentStatus::new(
            "b",
            Duration::from_millis(10),
            Some("success".into()),
        ));

        let entries = base.agent_statuses.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].duration, "1.25");
        assert_eq!(entries[1].status.as_deref(), Some("success"));
    }

    #[test]
    fn field_prefers_data_bag() {
        let ctx = RequestContext::new("q")
            .with_language("es")
            .with_data("language", json!("fr"));
        assert_eq!(ctx.field("language"), Some(json!("fr")));
        assert_eq!(ctx.field("query"), Some(json!("q")));
        assert_eq!(ctx.field("user_token"), None);
    }

    #[test]
    fn alpha_detection_is_case_insensitive() {
        assert!(RequestContext::new("q").with_user_type("ALPHA").is_alpha_user());
        assert!(!RequestContext::new("q").is_alpha_user());
    }
}

//! ModelInvoker trait: the abstraction over model inference.
//!
//! An invoker takes a capability identifier, the capability's prompt
//! variables and any extra messages, and returns either free text or a
//! structured JSON value together with a trace of what the model did.
//!
//! Implementations: OpenAI-compatible HTTP endpoints, scripted test doubles.

use crate::error::InvocationError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tool a knowledge-base capability calls to search its vector store.
pub const FILE_SEARCH_TOOL: &str = "file_search";

/// The output shape a capability is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    /// Free-form text
    #[default]
    Text,
    /// A JSON object
    Structured,
}

/// A single request to the model invocation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Which capability's instructions to run
    pub capability_id: String,

    /// Prompt variables, already hydrated
    #[serde(default)]
    pub variables: Map<String, Value>,

    /// Messages appended after the capability's own prompt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub output: OutputShape,

    /// Tool the model is required to call, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,

    /// Attribute filters applied to knowledge-base searches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_filters: Option<Map<String, Value>>,

    /// Context the invocation belongs to (for tracing)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl InvocationRequest {
    pub fn new(capability_id: impl Into<String>, output: OutputShape) -> Self {
        Self {
            capability_id: capability_id.into(),
            variables: Map::new(),
            messages: Vec::new(),
            output,
            tool_choice: None,
            file_filters: None,
            context_id: None,
        }
    }

    pub fn text(capability_id: impl Into<String>) -> Self {
        Self::new(capability_id, OutputShape::Text)
    }

    pub fn structured(capability_id: impl Into<String>) -> Self {
        Self::new(capability_id, OutputShape::Structured)
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_tool_choice(mut self, tool: impl Into<String>) -> Self {
        self.tool_choice = Some(tool.into());
        self
    }

    pub fn with_file_filters(mut self, filters: Map<String, Value>) -> Self {
        self.file_filters = Some(filters);
        self
    }

    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }
}

/// What the model produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Text(String),
    Structured(Value),
}

impl ModelOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ModelOutput::Text(text) => Some(text),
            ModelOutput::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            ModelOutput::Structured(value) => Some(value),
            ModelOutput::Text(_) => None,
        }
    }

    /// The user-facing message: the text itself, or the structured `message` field.
    pub fn message(&self) -> Option<&str> {
        match self {
            ModelOutput::Text(text) => Some(text),
            ModelOutput::Structured(value) => value.get("message").and_then(Value::as_str),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            ModelOutput::Text(text) => Value::String(text),
            ModelOutput::Structured(value) => value,
        }
    }
}

/// What happened during an invocation, beyond its output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationTrace {
    /// Names of tools the model called
    pub tools_used: Vec<String>,

    /// The full message list sent to the model
    pub input_messages: Vec<Message>,
}

impl InvocationTrace {
    pub fn used_tool(&self, name: &str) -> bool {
        self.tools_used.iter().any(|t| t == name)
    }
}

/// Output plus trace.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutput {
    pub output: ModelOutput,
    pub trace: InvocationTrace,
}

impl InvocationOutput {
    pub fn new(output: ModelOutput) -> Self {
        Self {
            output,
            trace: InvocationTrace::default(),
        }
    }

    pub fn with_trace(mut self, trace: InvocationTrace) -> Self {
        self.trace = trace;
        self
    }
}

/// The core ModelInvoker trait.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Human-readable invoker name (e.g., "openai_compat").
    fn name(&self) -> &str;

    /// Run one capability invocation.
    async fn invoke(
        &self,
        request: InvocationRequest,
    ) -> std::result::Result<InvocationOutput, InvocationError>;
}

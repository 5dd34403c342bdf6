//! OpenAI-compatible invoker implementation.
//!
//! Works with: OpenAI, OpenRouter, Azure OpenAI (via proxy), Ollama, vLLM,
//! and any endpoint exposing `/v1/chat/completions`.
//!
//! Each invocation sends the capability's instructions as the first system
//! message, the hydrated variables as a second one, then the request's own
//! messages (or the `query` variable as a user message when there are none).
//! Structured capabilities ask for a JSON object and the reply is parsed;
//! a forced tool call's arguments stand in for the reply when the message
//! itself is empty.
//!
//! Capabilities marked `file_search` are offered a `file_search` function.
//! When the model calls it, the query runs against the configured vector
//! store (`/vector_stores/{id}/search`, narrowed by the request's file
//! filters), the hits go back as tool messages, and the completion is
//! requested again. The trace then reports `file_search` as used.

use askwise_config::{AppConfig, CapabilityConfig};
use askwise_core::error::InvocationError;
use askwise_core::invoker::{
    FILE_SEARCH_TOOL, InvocationOutput, InvocationRequest, InvocationTrace, ModelInvoker,
    ModelOutput, OutputShape,
};
use askwise_core::message::{Message, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;
/// Search rounds before the model must answer without the tool.
const MAX_SEARCH_ROUNDS: usize = 2;

/// An OpenAI-compatible model invoker.
pub struct OpenAiCompatInvoker {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    default_model: String,
    default_temperature: f32,
    max_tokens: u32,
    capabilities: BTreeMap<String, CapabilityConfig>,
    vector_store_id: Option<String>,
    max_search_results: u32,
}

impl OpenAiCompatInvoker {
    /// Create an invoker with no capabilities registered.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, InvocationError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InvocationError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: "openai_compat".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            default_model: "gpt-4o-mini".into(),
            default_temperature: 0.2,
            max_tokens: 2048,
            capabilities: BTreeMap::new(),
            vector_store_id: None,
            max_search_results: 5,
        })
    }

    /// Build from configuration: endpoint, key, model defaults, capability table.
    pub fn from_config(config: &AppConfig) -> Result<Self, InvocationError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            InvocationError::NotConfigured(
                "no API key; set ASKWISE_API_KEY or OPENAI_API_KEY".into(),
            )
        })?;

        let mut invoker = Self::new(&config.api_url, api_key)?
            .with_model(&config.default_model)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens);
        invoker.capabilities = config.capabilities.clone();
        invoker.vector_store_id = config.knowledge_base.vector_store_id.clone();
        invoker.max_search_results = config.knowledge_base.max_results;
        Ok(invoker)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Vector store searched by `file_search` capabilities.
    pub fn with_knowledge_base(mut self, vector_store_id: impl Into<String>) -> Self {
        self.vector_store_id = Some(vector_store_id.into());
        self
    }

    /// Register (or replace) one capability prompt.
    pub fn with_capability(mut self, id: impl Into<String>, capability: CapabilityConfig) -> Self {
        self.capabilities.insert(id.into(), capability);
        self
    }

    fn capability(&self, id: &str) -> Result<&CapabilityConfig, InvocationError> {
        self.capabilities
            .get(id)
            .ok_or_else(|| InvocationError::NotConfigured(format!("unknown capability '{id}'")))
    }

    /// The vector store a capability may search, if any.
    fn knowledge_base(&self, capability: &CapabilityConfig) -> Option<&str> {
        self.vector_store_id
            .as_deref()
            .filter(|_| capability.file_search)
    }

    /// The capability prompt: instructions with `{{name}}` placeholders
    /// filled in, followed by the variables as JSON.
    fn prompt_messages(capability: &CapabilityConfig, variables: &Map<String, Value>) -> Vec<Message> {
        let mut instructions = capability.instructions.clone();
        for (name, value) in variables {
            let placeholder = format!("{{{{{name}}}}}");
            if instructions.contains(&placeholder) {
                instructions = instructions.replace(&placeholder, &render_value(value));
            }
        }

        let mut messages = vec![Message::system(instructions)];
        if !variables.is_empty() {
            let rendered = serde_json::to_string_pretty(variables).unwrap_or_default();
            messages.push(Message::system(format!("Context variables:\n{rendered}")));
        }
        messages
    }

    /// The conversation part of the request, as recorded in the trace.
    fn conversation(request: &InvocationRequest) -> Vec<Message> {
        if !request.messages.is_empty() {
            return request.messages.clone();
        }
        match request.variables.get("query") {
            Some(query) => vec![Message::user(render_value(query))],
            None => Vec::new(),
        }
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            })
            .collect()
    }

    fn build_body(
        &self,
        capability: &CapabilityConfig,
        request: &InvocationRequest,
        messages: &[ApiMessage],
        offer_search: bool,
    ) -> Value {
        let mut body = json!({
            "model": capability.model.as_deref().unwrap_or(&self.default_model),
            "messages": messages,
            "temperature": capability.temperature.unwrap_or(self.default_temperature),
            "max_tokens": self.max_tokens,
            "stream": false,
        });

        if request.output == OutputShape::Structured {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let mut tools = Vec::new();
        if offer_search {
            tools.push(ApiToolDefinition::file_search());
        }
        if let Some(tool) = &request.tool_choice {
            tools.push(ApiToolDefinition::forced(tool));
            body["tool_choice"] = json!({ "type": "function", "function": { "name": tool } });
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        body
    }

    /// POST one completion request and return the first choice's message.
    async fn complete(&self, body: &Value, capability_id: &str) -> Result<ApiMessage, InvocationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self.post(&url, body).await?;
        let response = Self::check_status(response, capability_id).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| InvocationError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| InvocationError::InvalidResponse("No choices in response".into()))
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response, InvocationError> {
        self.client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InvocationError::Timeout(e.to_string())
                } else {
                    InvocationError::Network(e.to_string())
                }
            })
    }

    async fn check_status(
        response: reqwest::Response,
        capability_id: &str,
    ) -> Result<reqwest::Response, InvocationError> {
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(InvocationError::RateLimited { retry_after_secs });
        }

        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, capability = %capability_id, body = %error_body, "Model endpoint returned error");
            return Err(InvocationError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }

    /// Run one knowledge-base search and render the hits for the model.
    async fn search(
        &self,
        vector_store_id: &str,
        query: &str,
        filters: Option<&Map<String, Value>>,
        capability_id: &str,
    ) -> Result<String, InvocationError> {
        let url = format!("{}/vector_stores/{vector_store_id}/search", self.base_url);
        let mut body = json!({
            "query": query,
            "max_num_results": self.max_search_results,
        });
        if let Some(filters) = filters.and_then(search_filters) {
            body["filters"] = filters;
        }

        let response = self.post(&url, &body).await?;
        let response = Self::check_status(response, capability_id).await?;
        let page: ApiSearchPage = response
            .json()
            .await
            .map_err(|e| InvocationError::InvalidResponse(format!("Failed to parse search results: {e}")))?;

        Ok(render_search_hits(&page))
    }

    /// Turn the first choice into a model output plus the names of tools called.
    fn parse_choice(
        shape: OutputShape,
        message: ApiMessage,
    ) -> Result<(ModelOutput, Vec<String>), InvocationError> {
        let tool_calls = message.tool_calls.unwrap_or_default();
        let tools_used: Vec<String> = tool_calls.iter().map(|tc| tc.function.name.clone()).collect();
        let content = message.content.unwrap_or_default();

        let output = match shape {
            OutputShape::Text => ModelOutput::Text(content),
            OutputShape::Structured if !content.trim().is_empty() => {
                ModelOutput::Structured(parse_json_content(&content)?)
            }
            OutputShape::Structured => {
                let arguments = tool_calls
                    .first()
                    .map(|tc| tc.function.arguments.as_str())
                    .ok_or_else(|| {
                        InvocationError::InvalidResponse("empty structured response".into())
                    })?;
                ModelOutput::Structured(parse_json_content(arguments)?)
            }
        };

        Ok((output, tools_used))
    }
}

#[async_trait]
impl ModelInvoker for OpenAiCompatInvoker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        request: InvocationRequest,
    ) -> std::result::Result<InvocationOutput, InvocationError> {
        let capability = self.capability(&request.capability_id)?;
        let conversation = Self::conversation(&request);

        let mut prompt = Self::prompt_messages(capability, &request.variables);
        prompt.extend(conversation.iter().cloned());
        let mut messages = Self::to_api_messages(&prompt);

        let vector_store = self.knowledge_base(capability);
        let mut searches = 0;

        loop {
            let offer_search = vector_store.is_some() && searches < MAX_SEARCH_ROUNDS;
            let body = self.build_body(capability, &request, &messages, offer_search);

            debug!(
                invoker = %self.name,
                capability = %request.capability_id,
                context_id = request.context_id.as_deref().unwrap_or(""),
                messages = messages.len(),
                offer_search,
                "Sending completion request"
            );

            let message = self.complete(&body, &request.capability_id).await?;

            let store = match vector_store {
                Some(store) if offer_search && message.calls_tool(FILE_SEARCH_TOOL) => store,
                _ => {
                    let (output, mut tools_used) = Self::parse_choice(request.output, message)?;
                    if searches > 0 && !tools_used.iter().any(|t| t == FILE_SEARCH_TOOL) {
                        tools_used.insert(0, FILE_SEARCH_TOOL.to_string());
                    }
                    return Ok(InvocationOutput::new(output).with_trace(InvocationTrace {
                        tools_used,
                        input_messages: conversation,
                    }));
                }
            };

            searches += 1;
            let calls = message.tool_calls.clone().unwrap_or_default();
            messages.push(message);
            for call in calls {
                let content = if call.function.name == FILE_SEARCH_TOOL {
                    let query = search_query(&call.function.arguments);
                    debug!(capability = %request.capability_id, query = %query, "Searching knowledge base");
                    match self
                        .search(store, &query, request.file_filters.as_ref(), &request.capability_id)
                        .await
                    {
                        Ok(hits) => hits,
                        Err(e) => {
                            warn!(capability = %request.capability_id, error = %e, "Knowledge-base search failed");
                            json!({ "error": e.to_string() }).to_string()
                        }
                    }
                } else {
                    json!({ "error": format!("tool '{}' is not available", call.function.name) }).to_string()
                };
                messages.push(ApiMessage::tool_result(call.id, content));
            }
        }
    }
}

/// Strings go in verbatim, everything else as compact JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a JSON reply, tolerating a surrounding Markdown code fence.
fn parse_json_content(content: &str) -> Result<Value, InvocationError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced.trim())
        .map_err(|e| InvocationError::InvalidResponse(format!("reply is not valid JSON: {e}")))
}

/// The `query` argument of a `file_search` call (the raw arguments when
/// they are not a JSON object).
fn search_query(arguments: &str) -> String {
    serde_json::from_str::<Value>(arguments)
        .ok()
        .and_then(|v| v.get("query").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| arguments.trim().to_string())
}

/// File filters as a vector-store attribute filter: `eq` for scalars, `in`
/// for arrays, combined with `and` when there is more than one key.
fn search_filters(filters: &Map<String, Value>) -> Option<Value> {
    let mut comparisons: Vec<Value> = filters
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let op = if value.is_array() { "in" } else { "eq" };
            json!({ "type": op, "key": key, "value": value })
        })
        .collect();

    match comparisons.len() {
        0 => None,
        1 => comparisons.pop(),
        _ => Some(json!({ "type": "and", "filters": comparisons })),
    }
}

fn render_search_hits(page: &ApiSearchPage) -> String {
    let hits: Vec<Value> = page
        .data
        .iter()
        .map(|hit| {
            let text: Vec<&str> = hit.content.iter().map(|c| c.text.as_str()).collect();
            json!({
                "filename": hit.filename,
                "score": hit.score,
                "text": text.join("\n"),
            })
        })
        .collect();
    json!({ "results": hits }).to_string()
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn tool_result(tool_call_id: String, content: String) -> Self {
        Self {
            role: "tool".into(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: Some(tool_call_id),
        }
    }

    fn calls_tool(&self, name: &str) -> bool {
        self.tool_calls
            .as_ref()
            .is_some_and(|calls| calls.iter().any(|tc| tc.function.name == name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: &'static str,
    function: ApiToolFunction,
}

impl ApiToolDefinition {
    /// A free-form function the model is forced to call.
    fn forced(name: &str) -> Self {
        Self {
            r#type: "function",
            function: ApiToolFunction {
                name: name.to_string(),
                description: format!("Return the response through {name}."),
                parameters: json!({ "type": "object", "additionalProperties": true }),
            },
        }
    }

    fn file_search() -> Self {
        Self {
            r#type: "function",
            function: ApiToolFunction {
                name: FILE_SEARCH_TOOL.to_string(),
                description: "Search the knowledge base for passages relevant to the question.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "What to look up" }
                    },
                    "required": ["query"]
                }),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiSearchPage {
    #[serde(default)]
    data: Vec<ApiSearchHit>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchHit {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    content: Vec<ApiSearchContent>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchContent {
    #[serde(default)]
    text: String,
}

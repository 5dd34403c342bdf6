//! Shared test doubles for orchestrator tests.

use askwise_config::AppConfig;
use askwise_core::context::RequestContext;
use askwise_core::error::{HandlerError, InvocationError};
use askwise_core::handler::CapabilityHandler;
use askwise_core::invoker::{InvocationOutput, InvocationRequest, ModelInvoker, ModelOutput};
use askwise_core::response::{HandlerReply, HandlerResponse};
use askwise_handlers::CapabilityRuntime;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Reply = Result<InvocationOutput, InvocationError>;

/// Replays queued replies per capability and records every request.
#[derive(Default)]
pub struct ScriptedInvoker {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<InvocationRequest>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, capability: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(capability.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn with_structured(self, capability: &str, value: Value) -> Self {
        self.push(capability, Ok(InvocationOutput::new(ModelOutput::Structured(value))))
    }

    pub fn with_text(self, capability: &str, text: &str) -> Self {
        self.push(capability, Ok(InvocationOutput::new(ModelOutput::Text(text.into()))))
    }

    pub fn with_error(self, capability: &str, error: InvocationError) -> Self {
        self.push(capability, Err(error))
    }

    pub fn requests_for(&self, capability: &str) -> Vec<InvocationRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.capability_id == capability)
            .cloned()
            .collect()
    }

    pub fn calls(&self, capability: &str) -> usize {
        self.requests_for(capability).len()
    }
}

#[async_trait]
impl ModelInvoker for ScriptedInvoker {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationOutput, InvocationError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .get_mut(&request.capability_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(InvocationError::NotConfigured(format!(
                    "no scripted reply for {}",
                    request.capability_id
                )))
            })
    }
}

pub fn runtime(invoker: Arc<ScriptedInvoker>) -> Arc<CapabilityRuntime> {
    Arc::new(CapabilityRuntime::new(invoker).with_capabilities(AppConfig::default().capabilities))
}

enum Behavior {
    /// Reply with the task-local query
    Echo,
    /// Write `data["x"]`, yield, then reply with what it reads back
    DataWriter,
    /// Reply with the task's `file_filters` as JSON
    FilterReader,
    /// Reply with the task's language
    LanguageReader,
    Fixed(HandlerResponse),
    Fail,
    Panic,
}

/// Handler with canned behavior that counts its calls.
pub struct StubHandler {
    id: String,
    behavior: Behavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubHandler {
    fn new(id: &str, behavior: Behavior) -> Self {
        Self {
            id: id.to_string(),
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn echo(id: &str) -> Self {
        Self::new(id, Behavior::Echo)
    }

    pub fn data_writer(id: &str) -> Self {
        Self::new(id, Behavior::DataWriter)
    }

    pub fn filter_reader(id: &str) -> Self {
        Self::new(id, Behavior::FilterReader)
    }

    pub fn language_reader(id: &str) -> Self {
        Self::new(id, Behavior::LanguageReader)
    }

    pub fn fixed(id: &str, response: HandlerResponse) -> Self {
        Self::new(id, Behavior::Fixed(response))
    }

    pub fn failing(id: &str) -> Self {
        Self::new(id, Behavior::Fail)
    }

    pub fn panicking(id: &str) -> Self {
        Self::new(id, Behavior::Panic)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityHandler for StubHandler {
    fn id(&self) -> &str {
        &self.id
    }

    async fn respond(&self, ctx: &mut RequestContext) -> Result<HandlerReply, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let message = match &self.behavior {
            Behavior::Echo => ctx.query.clone(),
            Behavior::DataWriter => {
                ctx.data.insert("x".into(), json!(self.id));
                tokio::task::yield_now().await;
                ctx.data["x"].as_str().unwrap_or_default().to_string()
            }
            Behavior::FilterReader => ctx.data.get("file_filters").map(Value::to_string).unwrap_or_default(),
            Behavior::LanguageReader => ctx.language.clone().unwrap_or_default(),
            Behavior::Fixed(response) => return Ok(response.clone().into()),
            Behavior::Fail => return Err(HandlerError::Internal("boom".into())),
            Behavior::Panic => panic!("stub handler panicked"),
        };
        Ok(HandlerResponse::completed(message).into())
    }
}

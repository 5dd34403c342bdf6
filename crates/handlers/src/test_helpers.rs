//! Shared test doubles for handler tests.

use crate::runtime::CapabilityRuntime;
use askwise_cache::InMemoryCache;
use askwise_config::AppConfig;
use askwise_core::audit::{AuditRecord, AuditSink};
use askwise_core::error::InvocationError;
use askwise_core::invoker::{
    InvocationOutput, InvocationRequest, InvocationTrace, ModelInvoker, ModelOutput,
};
use askwise_guardrails::FILE_SEARCH_TOOL;
use askwise_hydration::{FnFetcher, HydrationEngine, VariableRegistry, VariableSpec};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

type Reply = Result<InvocationOutput, InvocationError>;

/// Replays queued replies per capability and records every request.
///
/// An empty queue answers `NotConfigured`. Replies without traced input
/// messages get the request's messages, as a real invoker would report.
#[derive(Default)]
pub struct ScriptedInvoker {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<InvocationRequest>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(self, capability: &str, output: InvocationOutput) -> Self {
        self.push(capability, Ok(output));
        self
    }

    pub fn with_structured(self, capability: &str, value: Value) -> Self {
        self.with_output(capability, InvocationOutput::new(ModelOutput::Structured(value)))
    }

    pub fn with_text(self, capability: &str, text: &str) -> Self {
        self.with_output(capability, InvocationOutput::new(ModelOutput::Text(text.into())))
    }

    pub fn with_error(self, capability: &str, error: InvocationError) -> Self {
        self.push(capability, Err(error));
        self
    }

    fn push(&self, capability: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(capability.to_string())
            .or_default()
            .push_back(reply);
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
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&request.capability_id)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(Ok(mut output)) => {
                if output.trace.input_messages.is_empty() {
                    output.trace.input_messages = request.messages.clone();
                }
                Ok(output)
            }
            Some(Err(e)) => Err(e),
            None => Err(InvocationError::NotConfigured(format!(
                "no scripted reply for {}",
                request.capability_id
            ))),
        }
    }
}

/// Audit sink that keeps every record.
#[derive(Default)]
pub struct RecordingAudit {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAudit {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, record: &AuditRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// Structured output whose trace shows the knowledge-base tool was used.
pub fn kb_output(value: Value) -> InvocationOutput {
    InvocationOutput::new(ModelOutput::Structured(value)).with_trace(InvocationTrace {
        tools_used: vec![FILE_SEARCH_TOOL.to_string()],
        input_messages: Vec::new(),
    })
}

/// Engine whose variables are the top-level keys of `payload`, all served
/// by one fetcher.
pub fn engine_with(payload: Value) -> HydrationEngine {
    let names: Vec<String> = payload
        .as_object()
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default();
    let fetcher = Arc::new(FnFetcher::new("user/test-snapshot", move |_, _| {
        Ok(Some(payload.clone()))
    }));
    let registry = names.into_iter().fold(VariableRegistry::new(), |registry, name| {
        registry.with(VariableSpec::new(name, fetcher.clone()))
    });
    HydrationEngine::new(Arc::new(registry), Arc::new(InMemoryCache::new()))
}

/// Runtime over the default capability table.
pub fn runtime_with(
    invoker: Arc<ScriptedInvoker>,
    engine: Option<HydrationEngine>,
    audit: Option<Arc<RecordingAudit>>,
) -> CapabilityRuntime {
    let mut rt = CapabilityRuntime::new(invoker).with_capabilities(AppConfig::default().capabilities);
    if let Some(engine) = engine {
        rt = rt.with_engine(engine);
    }
    if let Some(audit) = audit {
        rt = rt.with_audit(audit);
    }
    rt
}

pub fn runtime(invoker: Arc<ScriptedInvoker>) -> Arc<CapabilityRuntime> {
    Arc::new(runtime_with(invoker, None, None))
}

//! Capability runtime: the single path from a handler to the model.
//!
//! A capability invocation goes through three steps:
//!
//! 1. **Prepare**: every prompt variable the capability declares is taken
//!    from the task's data bag or context fields when present; the rest are
//!    resolved in one call to the [`HydrationEngine`]. File filters set on
//!    the task ride along for knowledge-base searches.
//! 2. **Dispatch**: the request goes to the [`ModelInvoker`].
//! 3. **Record**: an [`AgentStatus`] entry lands on the shared status log and
//!    one [`AuditRecord`] goes to the audit sink, on success and on failure.

use askwise_config::CapabilityConfig;
use askwise_core::audit::{AuditOutcome, AuditRecord, AuditSink};
use askwise_core::context::{AgentStatus, RequestContext};
use askwise_core::error::{HandlerError, InvocationError};
use askwise_core::invoker::{
    InvocationOutput, InvocationRequest, ModelInvoker, ModelOutput, OutputShape,
};
use askwise_core::message::format_transcript;
use askwise_core::response::{FlaggedResponse, HandlerResponse};
use askwise_guardrails::{Attempt, GuardrailRetry, KnowledgeBaseRetry};
use askwise_hydration::HydrationEngine;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of a guardrail-wrapped invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded {
    /// An attempt passed every guardrail
    Output(InvocationOutput),
    /// Both attempts tripped; this is the fixed error payload
    Exhausted(HandlerResponse),
}

/// Shared by every handler; holds the invoker, hydration engine, capability
/// table, and audit sink.
pub struct CapabilityRuntime {
    invoker: Arc<dyn ModelInvoker>,
    engine: Option<HydrationEngine>,
    capabilities: BTreeMap<String, CapabilityConfig>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl CapabilityRuntime {
    pub fn new(invoker: Arc<dyn ModelInvoker>) -> Self {
        Self {
            invoker,
            engine: None,
            capabilities: BTreeMap::new(),
            audit: None,
        }
    }

    pub fn with_engine(mut self, engine: HydrationEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_capabilities(mut self, capabilities: BTreeMap<String, CapabilityConfig>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn engine(&self) -> Option<&HydrationEngine> {
        self.engine.as_ref()
    }

    /// Output shape a capability is configured with (text when unknown).
    pub fn output_shape(&self, capability_id: &str) -> OutputShape {
        match self.capabilities.get(capability_id) {
            Some(c) if c.structured => OutputShape::Structured,
            _ => OutputShape::Text,
        }
    }

    /// Whether a capability searches the knowledge base.
    pub fn searches_knowledge_base(&self, capability_id: &str) -> bool {
        self.capabilities
            .get(capability_id)
            .is_some_and(|c| c.file_search)
    }

    /// Resolve named values for a context.
    ///
    /// `conversation_history` renders the transcript; other names come from
    /// the data bag or context fields, and whatever remains is hydrated for
    /// the context's user. Without a token or an engine, remaining names are
    /// left out.
    pub async fn hydrate<S: AsRef<str>>(&self, ctx: &RequestContext, names: &[S]) -> Map<String, Value> {
        let mut values = Map::new();
        let mut pending: Vec<&str> = Vec::new();

        for name in names {
            let name = name.as_ref();
            if name == "conversation_history" {
                values.insert(
                    name.to_string(),
                    Value::String(format_transcript(&ctx.conversation_history)),
                );
                continue;
            }
            match ctx.field(name) {
                Some(value) => {
                    values.insert(name.to_string(), value);
                }
                None => pending.push(name),
            }
        }

        if pending.is_empty() {
            return values;
        }

        match (&self.engine, ctx.user_token.as_deref()) {
            (Some(engine), Some(token)) => {
                values.extend(engine.resolve(token, &pending, None, true).await);
            }
            (None, _) => debug!(variables = ?pending, "No hydration engine, leaving variables unset"),
            (_, None) => debug!(variables = ?pending, "No user token, leaving variables unset"),
        }
        values
    }

    /// Fill in the capability's declared prompt variables and the context id,
    /// and carry the task's file filters onto the request.
    ///
    /// Variables already set on the request win.
    pub async fn prepare(&self, ctx: &RequestContext, mut request: InvocationRequest) -> InvocationRequest {
        let wanted: Vec<String> = self
            .capabilities
            .get(&request.capability_id)
            .map(|c| {
                c.variables
                    .iter()
                    .filter(|v| !request.variables.contains_key(v.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !wanted.is_empty() {
            for (name, value) in self.hydrate(ctx, &wanted).await {
                request.variables.entry(name).or_insert(value);
            }
        }
        if request.file_filters.is_none()
            && let Some(Value::Object(filters)) = ctx.data.get("file_filters")
            && !filters.is_empty()
        {
            request.file_filters = Some(filters.clone());
        }
        if request.context_id.is_none() {
            request.context_id = Some(ctx.context_id.clone());
        }
        request
    }

    /// Send a prepared request and record its status and audit entry.
    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        request: InvocationRequest,
    ) -> Result<InvocationOutput, InvocationError> {
        let capability_id = request.capability_id.clone();
        let started = Instant::now();
        let result = self.invoker.invoke(request).await;
        let elapsed = started.elapsed();
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        let outcome = match &result {
            Ok(output) => {
                let status = output_status(&output.output);
                info!(capability = %capability_id, duration_ms, status = %status, "Capability invoked");
                AuditOutcome::Status(status)
            }
            Err(e) => {
                warn!(capability = %capability_id, duration_ms, error = %e, "Capability invocation failed");
                AuditOutcome::Error(e.to_string())
            }
        };

        let status = match &outcome {
            AuditOutcome::Status(s) => s.clone(),
            AuditOutcome::Error(_) => "error".to_string(),
        };
        ctx.agent_statuses
            .record(AgentStatus::new(&capability_id, elapsed, Some(status)));

        if let Some(audit) = &self.audit {
            audit.record(&AuditRecord::new(&ctx.context_id, &capability_id, duration_ms, outcome));
        }

        result
    }

    /// [`prepare`](Self::prepare) then [`dispatch`](Self::dispatch).
    pub async fn invoke(
        &self,
        ctx: &RequestContext,
        request: InvocationRequest,
    ) -> Result<InvocationOutput, InvocationError> {
        let request = self.prepare(ctx, request).await;
        self.dispatch(ctx, request).await
    }

    /// Guardrail-wrapped invocation, optionally followed by the
    /// knowledge-base retry.
    ///
    /// The retry attempt drops any forced tool choice. Variables are
    /// hydrated once and reused for every attempt. The knowledge-base retry
    /// only applies to capabilities that search the knowledge base.
    pub async fn invoke_guarded(
        &self,
        ctx: &RequestContext,
        request: InvocationRequest,
        retry: &GuardrailRetry,
        kb: Option<&KnowledgeBaseRetry>,
    ) -> Result<Guarded, InvocationError> {
        let request = self.prepare(ctx, request).await;
        let kb = kb.filter(|_| self.searches_knowledge_base(&request.capability_id));

        let outcome = retry
            .run(request.messages.clone(), |attempt, messages| {
                let mut attempt_request = request.clone().with_messages(messages);
                if attempt == Attempt::Retry {
                    attempt_request.tool_choice = None;
                }
                self.dispatch(ctx, attempt_request)
            })
            .await?;

        let output = match outcome.into_result() {
            Ok(output) => output,
            Err(payload) => return Ok(Guarded::Exhausted(payload)),
        };

        match kb {
            Some(kb) => {
                let output = kb
                    .run(output, |messages| {
                        self.dispatch(ctx, request.clone().with_messages(messages))
                    })
                    .await?;
                Ok(Guarded::Output(output))
            }
            None => Ok(Guarded::Output(output)),
        }
    }
}

impl std::fmt::Debug for CapabilityRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRuntime")
            .field("invoker", &self.invoker.name())
            .field("engine", &self.engine.is_some())
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

/// Status reported by an output: the structured `status` field, else "completed".
pub fn output_status(output: &ModelOutput) -> String {
    output
        .as_structured()
        .and_then(|v| v.get("status"))
        .and_then(Value::as_str)
        .unwrap_or("completed")
        .to_string()
}

/// Read an output as a typed response plus flags.
///
/// Text becomes `{status:"completed", message:<text>}`; a structured output
/// that is not an object is an error.
pub fn flagged(capability_id: &str, output: &InvocationOutput) -> Result<FlaggedResponse, HandlerError> {
    match &output.output {
        ModelOutput::Text(text) => Ok(FlaggedResponse {
            response: HandlerResponse::completed(text.clone()),
            flags: Map::new(),
        }),
        ModelOutput::Structured(value) => {
            FlaggedResponse::from_value(value).ok_or_else(|| HandlerError::UnexpectedOutput {
                capability: capability_id.to_string(),
                reason: format!("expected a JSON object, got {value}"),
            })
        }
    }
}

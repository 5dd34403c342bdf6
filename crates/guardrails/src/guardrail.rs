//! The guardrail abstraction.

use askwise_core::invoker::ModelOutput;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one guardrail check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailCheck {
    pub tripped: bool,
    /// Free text or structured detail about the trip
    #[serde(default)]
    pub info: Value,
}

impl GuardrailCheck {
    pub fn pass() -> Self {
        Self {
            tripped: false,
            info: Value::Null,
        }
    }

    pub fn trip(info: impl Into<Value>) -> Self {
        Self {
            tripped: true,
            info: info.into(),
        }
    }
}

/// A validator run against a model output.
pub trait Guardrail: Send + Sync {
    /// Stable identifier (e.g., "summarizer_no_duplicate_links").
    fn name(&self) -> &str;

    /// User-facing message returned when a retry also trips.
    fn message(&self) -> &str;

    /// Inspect an output. Guardrails fail open: anything they cannot
    /// interpret passes.
    fn check(&self, output: &ModelOutput) -> GuardrailCheck;
}

/// A tripped guardrail.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailTrip {
    pub guardrail: String,
    pub message: String,
    pub info: Value,
}

impl std::fmt::Display for GuardrailTrip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "guardrail '{}' tripped: {}", self.guardrail, self.message)
    }
}

/// An ordered set of guardrails; the first trip wins.
#[derive(Clone, Default)]
pub struct GuardrailSet {
    guardrails: Vec<Arc<dyn Guardrail>>,
}

impl GuardrailSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, guardrail: Arc<dyn Guardrail>) -> Self {
        self.guardrails.push(guardrail);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.guardrails.iter().map(|g| g.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.guardrails.is_empty()
    }

    /// Run every guardrail in order; `Err` carries the first trip.
    pub fn evaluate(&self, output: &ModelOutput) -> Result<(), GuardrailTrip> {
        for guardrail in &self.guardrails {
            let check = guardrail.check(output);
            if check.tripped {
                warn!(guardrail = %guardrail.name(), "Guardrail tripped");
                return Err(GuardrailTrip {
                    guardrail: guardrail.name().to_string(),
                    message: guardrail.message().to_string(),
                    info: check.info,
                });
            }
            debug!(guardrail = %guardrail.name(), "Guardrail passed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for GuardrailSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

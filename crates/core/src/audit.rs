//! Audit sink: fire-and-forget records of capability invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a capability invocation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Completed with this status
    Status(String),
    /// Failed with this error
    Error(String),
}

/// One audited capability invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub context_id: String,
    pub capability_id: String,
    pub duration_ms: u64,
    pub outcome: AuditOutcome,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        context_id: impl Into<String>,
        capability_id: impl Into<String>,
        duration_ms: u64,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            context_id: context_id.into(),
            capability_id: capability_id.into(),
            duration_ms,
            outcome,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for audit records.
///
/// Recording must never fail the request, so the method returns nothing;
/// sinks swallow and log their own failures.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

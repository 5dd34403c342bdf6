//! Audit sinks: where capability invocation records go.
//!
//! The capability runtime fires one [`AuditRecord`] per invocation. Sinks
//! never fail the request; a sink that cannot write logs and moves on.

use askwise_core::audit::{AuditOutcome, AuditRecord, AuditSink};
use std::sync::Mutex;
use tracing::info;

/// In-memory audit log that keeps every record and forwards it to any
/// number of downstream sinks.
#[derive(Default)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditRecord>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("entry_count", &self.count())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log that also forwards to `sinks`.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks,
        }
    }

    /// All recorded entries, oldest first.
    pub fn entries(&self) -> Vec<AuditRecord> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Entries whose invocation failed.
    pub fn failures(&self) -> Vec<AuditRecord> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| matches!(r.outcome, AuditOutcome::Error(_)))
            .cloned()
            .collect()
    }

    /// Entries for one capability.
    pub fn for_capability(&self, capability_id: &str) -> Vec<AuditRecord> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.capability_id == capability_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn count(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl AuditSink for AuditLog {
    fn record(&self, record: &AuditRecord) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());

        for sink in &self.sinks {
            sink.record(record);
        }
    }
}

/// Emits each record as an `info` event with target `askwise::audit`.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        match &record.outcome {
            AuditOutcome::Status(status) => info!(
                target: "askwise::audit",
                context_id = %record.context_id,
                capability = %record.capability_id,
                duration_ms = record.duration_ms,
                status = %status,
                "AUDIT"
            ),
            AuditOutcome::Error(error) => info!(
                target: "askwise::audit",
                context_id = %record.context_id,
                capability = %record.capability_id,
                duration_ms = record.duration_ms,
                error = %error,
                "AUDIT"
            ),
        }
    }
}

//! Request orchestration for askwise.
//!
//! ```text
//! query ──▶ IntentRouter ──(verdict)──────────────────────────▶ FinalResponse
//!                │ delegate
//!                ▼
//!            FanOut ── one task per action, own context fork ──┐
//!                                                              ▼
//!                          Aggregator ── terminal? ── verbatim ──▶ FinalResponse
//!                                  └──── otherwise ── Summarizer ──▶ FinalResponse
//! ```

pub mod error;
pub mod router;
pub mod fanout;
pub mod aggregator;
pub mod orchestrator;
pub mod audit;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::OrchestratorError;
pub use router::{IntentRouter, Routing};
pub use fanout::{ActionResult, FanOut};
pub use aggregator::Aggregator;
pub use orchestrator::{Orchestrator, GENERIC_ERROR_MESSAGE};
pub use audit::{AuditLog, TracingAuditSink};

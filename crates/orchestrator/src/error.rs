use askwise_core::error::{HandlerError, InvocationError};
use thiserror::Error;

/// Failures that abort a whole request.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Routing failed: {0}")]
    Routing(#[source] InvocationError),

    #[error("Malformed routing output: {0}")]
    MalformedRouting(String),

    #[error("Summarization failed: {0}")]
    Summarization(#[from] HandlerError),
}

//! Error types for the askwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all askwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model invocation errors ---
    #[error("Invocation error: {0}")]
    Invocation(#[from] InvocationError),

    // --- Cache errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // --- Fetch errors ---
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    // --- Handler errors ---
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the model invocation collaborator.
#[derive(Debug, Clone, Error)]
pub enum InvocationError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Invoker not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures of a remote fetch function.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Fetch {fetcher} failed: {reason}")]
    Request { fetcher: String, reason: String },

    #[error("Fetch {fetcher} returned status {status_code}")]
    Status { fetcher: String, status_code: u16 },

    #[error("Fetch {fetcher} returned an undecodable payload: {reason}")]
    Decode { fetcher: String, reason: String },

    #[error("Fetch task failed: {0}")]
    Task(String),
}

/// Failures raised by a capability handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Unexpected output from {capability}: {reason}")]
    UnexpectedOutput { capability: String, reason: String },

    #[error("Internal handler error: {0}")]
    Internal(String),
}

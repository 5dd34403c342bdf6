//! # askwise Core
//!
//! Domain types, traits, and error definitions for the askwise request
//! orchestrator. This crate has **zero framework dependencies**: it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod context;
pub mod action;
pub mod response;
pub mod invoker;
pub mod handler;
pub mod cache;
pub mod audit;

// Re-export key types at crate root for ergonomics
pub use error::{CacheError, Error, FetchError, HandlerError, InvocationError, Result};
pub use message::{Message, Role};
pub use context::{AgentStatus, AgentStatusLog, DataBag, RequestContext};
pub use action::{Action, ActionVerb, RoutingDecision};
pub use response::{
    ComponentKind, FinalResponse, FlaggedResponse, HandlerReply, HandlerResponse,
    InteractiveComponent, Meta, Resource, ScreenName,
};
pub use invoker::{
    InvocationOutput, InvocationRequest, InvocationTrace, ModelInvoker, ModelOutput, OutputShape,
};
pub use handler::{CapabilityHandler, HandlerRegistry};
pub use cache::CacheStore;
pub use audit::{AuditOutcome, AuditRecord, AuditSink};

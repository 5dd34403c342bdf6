//! Output guardrails: post-hoc validators for model outputs, and the
//! retry-once policies built on them.
//!
//! A guardrail inspects one model output and either passes it or *trips*.
//! [`GuardrailRetry`] turns a trip into exactly one corrective re-invocation;
//! [`KnowledgeBaseRetry`] does the same when the invocation trace shows an
//! expected lookup tool was never used.
//!
//! # Flow
//!
//! ```text
//! ┌────────────┐   output   ┌──────────────┐  pass   ┌──────────┐
//! │  invoke()  │──────────▶│ GuardrailSet │───────▶│  Passed  │
//! └────────────┘            └──────────────┘         └──────────┘
//!       ▲                         │ trip
//!       │  original + assistant   ▼
//!       │  + system(guidance)  ┌──────────┐  trip   ┌───────────┐
//!       └──────────────────────│  retry   │───────▶│ Exhausted │
//!                              └──────────┘         └───────────┘
//! ```

mod guardrail;
mod builtin;
mod retry;
mod kb_retry;

pub use guardrail::{Guardrail, GuardrailCheck, GuardrailSet, GuardrailTrip};
pub use builtin::{
    DuplicateLinkGuardrail, KitRegistrationGuardrail, ReferencedVideoGuardrail,
    DUPLICATE_LINK_GUIDANCE, DUPLICATE_LINK_MESSAGE, KIT_REGISTRATION_GUIDANCE,
    KIT_REGISTRATION_MESSAGE, REFERENCED_VIDEO_MESSAGE, VIDEO_GUIDANCE,
};
pub use retry::{Attempt, GuardrailRetry, RetryOutcome};
pub use kb_retry::{KnowledgeBaseRetry, FILE_SEARCH_TOOL, KB_GUIDANCE};

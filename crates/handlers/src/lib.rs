//! Capability handlers for askwise.
//!
//! Every handler answers the slice of a request routed to it through the
//! uniform [`CapabilityHandler`](askwise_core::CapabilityHandler) contract.
//! Handlers never talk to the model directly: they go through the
//! [`CapabilityRuntime`], which hydrates prompt variables, records agent
//! statuses, and fires audit records for every invocation.
//!
//! | Handler | Capability id | Wrapping |
//! |---|---|---|
//! | [`SupportHandler`] | `support_agent` | kit-registration guardrail + KB retry |
//! | [`NutritionHandler`] | `nutrition_agent` | referenced-video guardrail + KB retry |
//! | [`RecipeHandler`] | `nora_recipe_agent` | exclusion filtering |
//! | [`PersonalizationHandler`] | `personalization_agent` | none |
//! | [`InsightsHandler`] | `health_insights_agent` | fallback capability |
//!
//! The [`Summarizer`] is not routed to; the aggregator calls it directly.

pub mod runtime;
pub mod support;
pub mod nutrition;
pub mod recipe;
pub mod personalization;
pub mod insights;
pub mod summarizer;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use runtime::{CapabilityRuntime, Guarded};
pub use support::SupportHandler;
pub use nutrition::NutritionHandler;
pub use recipe::RecipeHandler;
pub use personalization::PersonalizationHandler;
pub use insights::InsightsHandler;
pub use summarizer::Summarizer;

use askwise_core::handler::HandlerRegistry;
use std::sync::Arc;

/// Register every built-in capability handler.
pub fn default_registry(runtime: Arc<CapabilityRuntime>) -> HandlerRegistry {
    HandlerRegistry::new()
        .with(Arc::new(SupportHandler::new(Arc::clone(&runtime))))
        .with(Arc::new(NutritionHandler::new(Arc::clone(&runtime))))
        .with(Arc::new(RecipeHandler::new(Arc::clone(&runtime))))
        .with(Arc::new(PersonalizationHandler::new(Arc::clone(&runtime))))
        .with(Arc::new(InsightsHandler::new(runtime)))
}

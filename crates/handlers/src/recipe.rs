//! Recipe handler.
//!
//! Suggestions are checked against the user's dietary profile after the
//! model answers: anything naming an excluded ingredient, or looking like an
//! alcoholic drink, is dropped before it becomes a recipe card.

use crate::runtime::{CapabilityRuntime, flagged};
use askwise_core::context::RequestContext;
use askwise_core::error::HandlerError;
use askwise_core::handler::CapabilityHandler;
use askwise_core::invoker::InvocationRequest;
use askwise_core::message::Message;
use askwise_core::response::{
    ComponentKind, HandlerReply, HandlerResponse, InteractiveComponent, Meta, Resource, ScreenName,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

const RECIPE_CAPABILITY: &str = "NORA_RECIPE_AGENT";

/// Profile variables that list ingredients the user must avoid.
const EXCLUSION_VARIABLES: [&str; 4] = [
    "ingredients_to_avoid",
    "coach_added_exclusions",
    "allergies_and_intolerances",
    "dietary_restrictions",
];

const ALCOHOL_KEYWORDS: [&str; 7] = ["cocktail", "alcohol", "beer", "wine", "vodka", "rum", "whiskey"];

pub const SHOPPING_LIST_DIRECTION_MESSAGE: &str = "For shopping list or ingredients list visit the corresponding recipe details page by clicking on the buttons shown previously";
pub const NO_RECIPE_AVAILABLE_MESSAGE: &str = "Sorry, we could not find any recipes that match your request and dietary needs. Try rephrasing your query, using different ingredients, or simplifying dietary restrictions if possible.";

#[derive(Debug, Clone, Deserialize)]
struct RecipeSuggestion {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: Option<String>,
}

impl RecipeSuggestion {
    fn conflicts_with(&self, excluded: &BTreeSet<String>) -> bool {
        let text = format!(
            "{} {}",
            self.title.to_lowercase(),
            self.description.as_deref().unwrap_or_default().to_lowercase()
        );
        let alcoholic = text
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| ALCOHOL_KEYWORDS.contains(&word));
        alcoholic || excluded.iter().any(|ingredient| text.contains(ingredient.as_str()))
    }

    fn into_component(self) -> InteractiveComponent {
        let id = match self.id {
            Value::String(s) if !s.is_empty() => s,
            Value::Number(n) => n.to_string(),
            _ => self.title.clone(),
        };
        InteractiveComponent::new(ScreenName::Recipe, ComponentKind::Route, self.title.clone()).with_resource(
            Resource {
                id,
                title: self.title,
                url: self.url,
                description: self.description,
                additional_data: None,
            },
        )
    }
}

/// Lowercased exclusion set from the profile values; always contains alcohol.
///
/// Values may be lists or comma-separated strings.
pub fn exclusion_set(profile: &Map<String, Value>) -> BTreeSet<String> {
    let mut excluded = BTreeSet::from(["alcohol".to_string()]);
    for name in EXCLUSION_VARIABLES {
        let items: Vec<&str> = match profile.get(name) {
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(s)) => s.split(',').collect(),
            _ => continue,
        };
        excluded.extend(
            items
                .into_iter()
                .map(|item| item.trim().to_lowercase())
                .filter(|item| !item.is_empty()),
        );
    }
    excluded
}

pub struct RecipeHandler {
    runtime: Arc<CapabilityRuntime>,
}

impl RecipeHandler {
    pub fn new(runtime: Arc<CapabilityRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl CapabilityHandler for RecipeHandler {
    fn id(&self) -> &str {
        "nora_recipe_agent"
    }

    async fn respond(&self, ctx: &mut RequestContext) -> Result<HandlerReply, HandlerError> {
        let profile = self.runtime.hydrate(ctx, &EXCLUSION_VARIABLES).await;
        let excluded = exclusion_set(&profile);
        let excluded_list = excluded.iter().cloned().collect::<Vec<_>>().join(", ");
        debug!(excluded = %excluded_list, "Recipe exclusions");

        let request = InvocationRequest::structured(RECIPE_CAPABILITY)
            .with_variable("excluded_ingredients", excluded_list)
            .with_messages(vec![Message::user(ctx.query.clone())]);
        let output = self.runtime.invoke(ctx, request).await?;
        let answer = flagged(RECIPE_CAPABILITY, &output)?;

        if answer.flag("shopping_list_request") {
            return Ok(HandlerResponse::new("success", SHOPPING_LIST_DIRECTION_MESSAGE)
                .with_meta(Meta::new())
                .into());
        }

        let status = answer.response.status.to_ascii_lowercase();
        if status != "success" && status != "completed" {
            return Ok(answer.into_response().with_meta(Meta::new()).into());
        }

        let suggestions: Vec<RecipeSuggestion> = answer
            .flags
            .get("recipes")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| HandlerError::UnexpectedOutput {
                capability: RECIPE_CAPABILITY.to_string(),
                reason: format!("recipes: {e}"),
            })?
            .unwrap_or_default();

        let total = suggestions.len();
        let kept: Vec<RecipeSuggestion> = suggestions
            .into_iter()
            .filter(|r| !r.conflicts_with(&excluded))
            .collect();
        info!(suggested = total, kept = kept.len(), "Filtered recipe suggestions");

        if kept.is_empty() {
            return Ok(HandlerResponse::completed(NO_RECIPE_AVAILABLE_MESSAGE)
                .with_meta(Meta::new())
                .into());
        }

        let meta = kept
            .into_iter()
            .fold(Meta::new(), |meta, recipe| meta.with_action(recipe.into_component()));
        let HandlerResponse { status, message, .. } = answer.into_response();
        Ok(HandlerResponse::new(status, message).with_meta(meta).into())
    }
}

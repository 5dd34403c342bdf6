//! Response aggregator: merges handler results into the final response.
//!
//! Meta normalisation happens here and nowhere else. A result's meta may be
//! an object or a JSON-encoded string; `actions` lists are concatenated in
//! action order and every other key is shallow-merged, later results
//! overwriting earlier ones.

use crate::error::OrchestratorError;
use crate::fanout::ActionResult;
use askwise_core::context::RequestContext;
use askwise_core::response::{FinalResponse, HandlerReply, HandlerResponse};
use askwise_handlers::Summarizer;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{info, warn};

pub struct Aggregator {
    summarizer: Summarizer,
    terminal: HashSet<String>,
}

impl Aggregator {
    pub fn new<I, S>(summarizer: Summarizer, terminal_capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            summarizer,
            terminal: terminal_capabilities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_terminal(&self, capability_id: &str) -> bool {
        self.terminal.contains(capability_id)
    }

    /// Merge `results` into one answer for `ctx`.
    ///
    /// The first result of a terminal capability is returned verbatim;
    /// otherwise the summarizer answers over all results and `details`.
    pub async fn aggregate(
        &self,
        results: &[ActionResult],
        ctx: &RequestContext,
        details: &Value,
    ) -> Result<FinalResponse, OrchestratorError> {
        let mut meta = Map::new();
        for result in results {
            merge_meta(&mut meta, normalize_meta(reply_meta(&result.reply)));
        }

        let terminal = results
            .iter()
            .find(|r| self.is_terminal(&r.action.capability_id));

        let (status, message) = match terminal {
            Some(result) => {
                info!(capability = %result.action.capability_id, "Terminal capability answered, skipping summarizer");
                let response = coerce(&result.reply);
                (response.status, response.message)
            }
            None => {
                let formatted = results.iter().map(formatted_response).collect();
                let reply = self.summarizer.summarize(ctx, formatted, details).await?;
                let response = coerce(&reply);
                merge_meta(&mut meta, normalize_meta(response.meta.as_ref()));
                (response.status, response.message)
            }
        };

        let mut response = FinalResponse::new(status, message)
            .with_agent_statuses(ctx.agent_statuses.snapshot());
        response.meta = meta;
        Ok(response)
    }
}

fn reply_meta(reply: &HandlerReply) -> Option<&Value> {
    match reply {
        HandlerReply::Response(r) => r.meta.as_ref(),
        HandlerReply::Text(_) => None,
    }
}

/// A bare string becomes `{status:"completed", message, meta:{}}`.
fn coerce(reply: &HandlerReply) -> HandlerResponse {
    match reply {
        HandlerReply::Response(r) => r.clone(),
        HandlerReply::Text(text) => HandlerResponse::completed(text.clone()).with_meta(Map::new()),
    }
}

/// Decode a meta value into an object; anything else is empty.
pub fn normalize_meta(meta: Option<&Value>) -> Map<String, Value> {
    match meta {
        Some(Value::Object(object)) => object.clone(),
        Some(Value::String(encoded)) if encoded.trim().is_empty() => Map::new(),
        Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Object(object)) => object,
            _ => {
                warn!("Discarding meta that does not decode to an object");
                Map::new()
            }
        },
        _ => Map::new(),
    }
}

/// Fold `meta` into `combined`.
pub fn merge_meta(combined: &mut Map<String, Value>, meta: Map<String, Value>) {
    for (key, value) in meta {
        if key != "actions" {
            combined.insert(key, value);
            continue;
        }
        let items = match value {
            Value::Array(items) => items,
            Value::Null => continue,
            single => vec![single],
        };
        match combined.entry("actions").or_insert_with(|| Value::Array(Vec::new())) {
            Value::Array(existing) => existing.extend(items),
            other => *other = Value::Array(items),
        }
    }
}

/// The result as the summarizer sees it: tagged with its capability and
/// without meta. Bare text goes under `response`.
pub fn formatted_response(result: &ActionResult) -> Value {
    let mut object = match &result.reply {
        HandlerReply::Response(r) => match serde_json::to_value(r) {
            Ok(Value::Object(object)) => object,
            _ => Map::new(),
        },
        HandlerReply::Text(text) => {
            let mut object = Map::new();
            object.insert("response".into(), Value::String(text.clone()));
            object
        }
    };
    object.remove("meta");
    object.insert("agent".into(), Value::String(result.action.capability_id.clone()));
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedInvoker, runtime};
    use askwise_core::action::Action;
    use askwise_core::response::{ComponentKind, InteractiveComponent, Meta, ScreenName};
    use serde_json::json;
    use std::sync::Arc;

    const SUMMARIZER: &str = "ASK_DIGBI_SUMMARIZER_AGENT";

    fn aggregator(invoker: Arc<ScriptedInvoker>) -> Aggregator {
        Aggregator::new(Summarizer::new(runtime(invoker), SUMMARIZER), ["nora_recipe_agent"])
    }

    fn result(capability: &str, response: HandlerResponse) -> ActionResult {
        ActionResult {
            action: Action::delegate(capability),
            reply: response.into(),
        }
    }

    #[test]
    fn meta_decodes_strings_and_objects() {
        assert_eq!(normalize_meta(Some(&json!({"a": 1}))), json!({"a": 1}).as_object().cloned().unwrap());
        assert_eq!(
            normalize_meta(Some(&json!(r#"{"b": 2}"#))),
            json!({"b": 2}).as_object().cloned().unwrap()
        );
        assert!(normalize_meta(Some(&json!("not json"))).is_empty());
        assert!(normalize_meta(Some(&json!("[1]"))).is_empty());
        assert!(normalize_meta(None).is_empty());
    }

    #[test]
    fn actions_concatenate_and_keys_overwrite() {
        let mut combined = Map::new();
        merge_meta(&mut combined, json!({"actions": [{"id": "X"}], "source": "a"}).as_object().cloned().unwrap());
        merge_meta(&mut combined, json!({"actions": [{"id": "Y"}], "source": "b"}).as_object().cloned().unwrap());
        assert_eq!(
            Value::Object(combined),
            json!({"actions": [{"id": "X"}, {"id": "Y"}], "source": "b"})
        );
    }

    #[test]
    fn formatted_response_tags_agent_and_drops_meta() {
        let formatted = formatted_response(&result(
            "nutrition_agent",
            HandlerResponse::completed("eat fiber").with_meta(json!({"k": 1})),
        ));
        assert_eq!(
            formatted,
            json!({"status": "completed", "message": "eat fiber", "agent": "nutrition_agent"})
        );

        let text = formatted_response(&ActionResult {
            action: Action::delegate("personalization_agent"),
            reply: HandlerReply::Text("hi".into()),
        });
        assert_eq!(text, json!({"response": "hi", "agent": "personalization_agent"}));
    }

    #[tokio::test]
    async fn terminal_result_skips_summarizer() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let agg = aggregator(invoker.clone());
        let recipe_card = InteractiveComponent::new(ScreenName::Recipe, ComponentKind::Route, "Lentil soup");
        let results = vec![
            result("nutrition_agent", HandlerResponse::completed("fiber")),
            result(
                "nora_recipe_agent",
                HandlerResponse::completed("M").with_meta(Meta::new().with_action(recipe_card)),
            ),
        ];

        let response = agg.aggregate(&results, &RequestContext::new("q"), &Value::Null).await.unwrap();

        assert_eq!(response.status, "completed");
        assert_eq!(response.message, "M");
        assert_eq!(response.meta["actions"].as_array().unwrap().len(), 1);
        assert_eq!(invoker.calls(SUMMARIZER), 0);
    }

    #[tokio::test]
    async fn summarizer_meta_is_merged_after_results() {
        let invoker = Arc::new(ScriptedInvoker::new().with_structured(
            SUMMARIZER,
            json!({"status": "completed", "message": "Combined", "meta": {"actions": [{"id": "S"}], "tone": "warm"}}),
        ));
        let agg = aggregator(invoker.clone());
        let results = vec![
            result("support_agent", HandlerResponse::completed("a").with_meta(json!(r#"{"actions":[{"id":"X"}]}"#))),
            result("nutrition_agent", HandlerResponse::completed("b").with_meta(json!({"actions": [{"id": "Y"}]}))),
        ];
        let ctx = RequestContext::new("q");

        let response = agg.aggregate(&results, &ctx, &json!({"topic": "t"})).await.unwrap();

        assert_eq!(response.message, "Combined");
        assert_eq!(
            Value::Object(response.meta),
            json!({"actions": [{"id": "X"}, {"id": "Y"}, {"id": "S"}], "tone": "warm"})
        );
        assert_eq!(response.agent_statuses.len(), 1);

        let request = &invoker.requests_for(SUMMARIZER)[0];
        assert_eq!(
            request.variables["formatted_responses"],
            json!([
                {"status": "completed", "message": "a", "agent": "support_agent"},
                {"status": "completed", "message": "b", "agent": "nutrition_agent"}
            ])
        );
    }

    #[tokio::test]
    async fn text_summary_is_coerced() {
        let invoker = Arc::new(ScriptedInvoker::new().with_text(SUMMARIZER, "plain summary"));
        let agg = aggregator(invoker);
        let results = vec![result("nutrition_agent", HandlerResponse::completed("x"))];

        let response = agg.aggregate(&results, &RequestContext::new("q"), &Value::Null).await.unwrap();
        assert_eq!(response.status, "completed");
        assert_eq!(response.message, "plain summary");
        assert!(response.meta.is_empty());
    }

    #[tokio::test]
    async fn summarizer_failure_is_an_error() {
        let agg = aggregator(Arc::new(ScriptedInvoker::new()));
        let results = vec![result("nutrition_agent", HandlerResponse::completed("x"))];
        let err = agg
            .aggregate(&results, &RequestContext::new("q"), &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Summarization(_)));
    }
}

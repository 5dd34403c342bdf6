//! Built-in guardrails.

use crate::guardrail::{Guardrail, GuardrailCheck};
use askwise_core::invoker::ModelOutput;
use serde_json::Value;

pub const KIT_REGISTRATION_MESSAGE: &str =
    "Digbi users do not need to register kits; please correct the guidance.";
pub const REFERENCED_VIDEO_MESSAGE: &str =
    "Video recommendation is unavailable; remove video references from the response.";
pub const DUPLICATE_LINK_MESSAGE: &str =
    "Remove hyperlinks that already exist in the video recommendation component.";

/// Corrective guidance appended to the retry of a tripped invocation.
pub const KIT_REGISTRATION_GUIDANCE: &str =
    "Kit guidance: Digbi kits do not need to be registered by the user. Remove any kit registration instructions before responding.";
pub const VIDEO_GUIDANCE: &str =
    "Video guidance: The recommendation failed. Remove any video references or actions before responding.";
pub const DUPLICATE_LINK_GUIDANCE: &str =
    "Hyperlink guidance: Remove hyperlinks already provided via the video recommendation component.";

/// Trips when the support answer tells the user to register a kit.
///
/// Reads the `kit_registration_intent` flag of a structured output.
#[derive(Debug, Default)]
pub struct KitRegistrationGuardrail;

impl Guardrail for KitRegistrationGuardrail {
    fn name(&self) -> &str {
        "support_agent_no_kit_registration"
    }

    fn message(&self) -> &str {
        KIT_REGISTRATION_MESSAGE
    }

    fn check(&self, output: &ModelOutput) -> GuardrailCheck {
        let intent = output
            .as_structured()
            .and_then(|v| v.get("kit_registration_intent"))
            .and_then(Value::as_str);
        match intent {
            Some(i) if i.trim().eq_ignore_ascii_case("REGISTER") => {
                GuardrailCheck::trip(KIT_REGISTRATION_MESSAGE)
            }
            _ => GuardrailCheck::pass(),
        }
    }
}

/// Trips when the message references a video but no video component exists.
///
/// The model declares the reference via `message_references_a_video`; a video
/// component is any `meta.actions[]` entry (or top-level `actions[]`) whose
/// `screen_name` is `VideoPopUpScreen` or whose `display_text` mentions a video.
#[derive(Debug, Default)]
pub struct ReferencedVideoGuardrail;

impl ReferencedVideoGuardrail {
    fn has_video_action(output: &Value) -> bool {
        let actions = output
            .get("meta")
            .and_then(|m| m.get("actions"))
            .or_else(|| output.get("actions"));

        let items: Vec<&Value> = match actions {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(single) => vec![single],
        };

        items.into_iter().any(|action| {
            let screen = action
                .get("screen_name")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_ascii_lowercase());
            if screen.as_deref() == Some("videopopupscreen") {
                return true;
            }
            action
                .get("display_text")
                .and_then(Value::as_str)
                .is_some_and(|t| t.to_ascii_lowercase().contains("video"))
        })
    }
}

impl Guardrail for ReferencedVideoGuardrail {
    fn name(&self) -> &str {
        "referenced_video_does_not_exist"
    }

    fn message(&self) -> &str {
        REFERENCED_VIDEO_MESSAGE
    }

    fn check(&self, output: &ModelOutput) -> GuardrailCheck {
        let Some(value) = output.as_structured() else {
            return GuardrailCheck::pass();
        };
        let references_video = match value.get("message_references_a_video") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };
        if references_video && !Self::has_video_action(value) {
            GuardrailCheck::trip(REFERENCED_VIDEO_MESSAGE)
        } else {
            GuardrailCheck::pass()
        }
    }
}

/// Trips when the message repeats a URL already carried by `meta.actions[].data[]`.
///
/// Matching is case-insensitive and also catches the URL without its scheme.
#[derive(Debug, Default)]
pub struct DuplicateLinkGuardrail;

impl DuplicateLinkGuardrail {
    fn action_urls(output: &Value) -> Vec<String> {
        let Some(Value::Array(actions)) = output.get("meta").and_then(|m| m.get("actions")) else {
            return Vec::new();
        };
        let mut urls = Vec::new();
        for action in actions {
            let data: Vec<&Value> = match action.get("data") {
                Some(Value::Array(items)) => items.iter().collect(),
                Some(Value::Null) | None => continue,
                Some(single) => vec![single],
            };
            for item in data {
                if let Some(url) = item.get("url").and_then(Value::as_str) {
                    let url = url.trim();
                    if !url.is_empty() {
                        urls.push(url.to_ascii_lowercase());
                    }
                }
            }
        }
        urls
    }
}

impl Guardrail for DuplicateLinkGuardrail {
    fn name(&self) -> &str {
        "summarizer_no_duplicate_links"
    }

    fn message(&self) -> &str {
        DUPLICATE_LINK_MESSAGE
    }

    fn check(&self, output: &ModelOutput) -> GuardrailCheck {
        let Some(value) = output.as_structured() else {
            return GuardrailCheck::pass();
        };
        let message = match value.get("message").and_then(Value::as_str) {
            Some(m) if !m.trim().is_empty() => m.to_ascii_lowercase(),
            _ => return GuardrailCheck::pass(),
        };

        let duplicated = Self::action_urls(value).iter().any(|url| {
            if message.contains(url.as_str()) {
                return true;
            }
            url.split_once("://")
                .filter(|(scheme, _)| *scheme == "http" || *scheme == "https")
                .is_some_and(|(_, rest)| !rest.is_empty() && message.contains(rest))
        });

        if duplicated {
            GuardrailCheck::trip(DUPLICATE_LINK_MESSAGE)
        } else {
            GuardrailCheck::pass()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn structured(v: Value) -> ModelOutput {
        ModelOutput::Structured(v)
    }

    #[test]
    fn kit_registration_trips_on_register_intent() {
        let g = KitRegistrationGuardrail;
        assert!(g.check(&structured(json!({"kit_registration_intent": "register"}))).tripped);
        assert!(!g.check(&structured(json!({"kit_registration_intent": "NONE"}))).tripped);
        assert!(!g.check(&ModelOutput::Text("register your kit".into())).tripped);
    }

    #[test]
    fn video_reference_without_component_trips() {
        let g = ReferencedVideoGuardrail;
        let output = structured(json!({
            "message": "Watch the video below.",
            "message_references_a_video": true,
            "meta": {"actions": []}
        }));
        let check = g.check(&output);
        assert!(check.tripped);
        assert_eq!(check.info, json!(REFERENCED_VIDEO_MESSAGE));
    }

    #[test]
    fn video_reference_with_component_passes() {
        let g = ReferencedVideoGuardrail;
        let by_screen = structured(json!({
            "message_references_a_video": true,
            "meta": {"actions": [{"screen_name": "VideoPopUpScreen", "display_text": "Watch"}]}
        }));
        let by_text = structured(json!({
            "message_references_a_video": "true",
            "actions": [{"screen_name": "Recipe", "display_text": "Play the Video"}]
        }));
        assert!(!g.check(&by_screen).tripped);
        assert!(!g.check(&by_text).tripped);
    }

    #[test]
    fn no_video_reference_passes() {
        let g = ReferencedVideoGuardrail;
        assert!(!g.check(&structured(json!({"message": "hi"}))).tripped);
    }

    #[test]
    fn duplicate_link_detects_url_with_and_without_scheme() {
        let g = DuplicateLinkGuardrail;
        let meta = json!({"actions": [{"data": [{"url": "https://videos.example.com/Gut-Health"}]}]});

        let full = structured(json!({
            "message": "See https://videos.example.com/gut-health for more.",
            "meta": meta
        }));
        let bare = structured(json!({
            "message": "See videos.example.com/gut-health for more.",
            "meta": meta
        }));
        let clean = structured(json!({
            "message": "See the video below.",
            "meta": meta
        }));

        assert!(g.check(&full).tripped);
        assert!(g.check(&bare).tripped);
        assert!(!g.check(&clean).tripped);
    }

    #[test]
    fn duplicate_link_ignores_missing_urls() {
        let g = DuplicateLinkGuardrail;
        let output = structured(json!({
            "message": "anything",
            "meta": {"actions": [{"data": null}, {"data": [{"title": "no url"}]}]}
        }));
        assert!(!g.check(&output).tripped);
    }
}

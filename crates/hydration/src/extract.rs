//! Turning a raw fetch payload into a variable's value.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A custom transform: raw payload in, value out (`None` = no value).
pub type TransformFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// How a variable's value is derived from its fetch payload.
#[derive(Clone)]
pub enum Extraction {
    /// Walk this key path into the payload
    KeyPath(Vec<String>),
    /// Use the payload as-is
    Raw,
    /// Run a custom transform
    Transform(TransformFn),
}

impl Extraction {
    /// Apply to a payload. Empty payloads and empty results never yield
    /// a value.
    pub fn apply(&self, payload: &Value) -> Option<Value> {
        if is_empty(payload) {
            return None;
        }
        let value = match self {
            Extraction::KeyPath(path) => extract_key_path(payload, path),
            Extraction::Raw => Some(payload.clone()),
            Extraction::Transform(f) => f(payload),
        };
        value.filter(|v| !is_empty(v))
    }
}

impl fmt::Debug for Extraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extraction::KeyPath(path) => f.debug_tuple("KeyPath").field(path).finish(),
            Extraction::Raw => f.write_str("Raw"),
            Extraction::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

/// Walk `path` through nested objects.
///
/// Reaching a non-object before the path ends returns the whole payload
/// unchanged. A missing key or a null leaf yields `None`.
pub fn extract_key_path(payload: &Value, path: &[String]) -> Option<Value> {
    let mut current = payload;
    for key in path {
        match current {
            Value::Object(map) => match map.get(key) {
                Some(next) => current = next,
                None => return None,
            },
            _ => return Some(payload.clone()),
        }
    }
    if current.is_null() {
        None
    } else {
        Some(current.clone())
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn walks_nested_objects() {
        let payload = json!({"summary": {"score": 81}});
        assert_eq!(extract_key_path(&payload, &path(&["summary", "score"])), Some(json!(81)));
    }

    #[test]
    fn non_object_intermediate_returns_payload() {
        let payload = json!({"scores": [1, 2, 3]});
        let value = extract_key_path(&payload, &path(&["scores", "latest"]));
        assert_eq!(value, Some(payload));
    }

    #[test]
    fn missing_key_and_null_leaf_are_none() {
        let payload = json!({"average": null});
        assert_eq!(extract_key_path(&payload, &path(&["average"])), None);
        assert_eq!(extract_key_path(&payload, &path(&["other"])), None);
    }

    #[test]
    fn empty_payload_never_yields() {
        assert_eq!(Extraction::Raw.apply(&json!({})), None);
        assert_eq!(Extraction::Raw.apply(&json!([])), None);
        assert_eq!(Extraction::Raw.apply(&json!(0)), Some(json!(0)));
    }

    #[test]
    fn transform_null_is_none() {
        let transform = Extraction::Transform(Arc::new(|_| Some(Value::Null)));
        assert_eq!(transform.apply(&json!({"a": 1})), None);

        let count = Extraction::Transform(Arc::new(|v| v.as_array().map(|a| json!(a.len()))));
        assert_eq!(count.apply(&json!([1, 2])), Some(json!(2)));
    }

    #[test]
    fn empty_leaves_are_none() {
        let exclusions = Extraction::KeyPath(path(&["coachAddedExclusions"]));
        assert_eq!(exclusions.apply(&json!({"coachAddedExclusions": ""})), None);
        assert_eq!(exclusions.apply(&json!({"coachAddedExclusions": []})), None);
        assert_eq!(exclusions.apply(&json!({"coachAddedExclusions": {}})), None);
        assert_eq!(
            exclusions.apply(&json!({"coachAddedExclusions": ["peanuts"]})),
            Some(json!(["peanuts"]))
        );

        let blank = Extraction::Transform(Arc::new(|_| Some(json!(""))));
        assert_eq!(blank.apply(&json!({"a": 1})), None);
        let nothing = Extraction::Transform(Arc::new(|_| Some(json!([]))));
        assert_eq!(nothing.apply(&json!({"a": 1})), None);
    }
}

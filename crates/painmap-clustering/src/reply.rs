//! Accessors for fields of a parsed LLM reply, tolerant of the type drift
//! models produce (numbers as strings, missing keys, renamed keys).

use std::sync::LazyLock;

use painmap_llm::LlmObject;
use regex::Regex;
use serde_json::Value;

use crate::types::{CandidateTheme, DEFAULT_CONFIDENCE};

static FIRST_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+").expect("valid integer regex"));

/// Returns the first non-empty array stored under any of `keys`.
pub(crate) fn list_field<'a>(object: &'a LlmObject, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_array))
        .find(|items| !items.is_empty())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Returns the trimmed string under `key`, or an empty string.
pub(crate) fn text_field(object: &LlmObject, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// Reads an integer identifier from a JSON integer or from the first integer
/// inside a string (`"7"`, `"Theme 7"`, `"ID: 7"`).
pub(crate) fn id_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => FIRST_INTEGER
            .find(s)
            .and_then(|m| m.as_str().parse::<i64>().ok()),
        _ => None,
    }
}

pub(crate) fn id_field(object: &LlmObject, key: &str) -> Option<i64> {
    object.get(key).and_then(id_value)
}

/// Reads a confidence, clamped to `[0, 1]`. Missing or non-numeric values
/// count as [`DEFAULT_CONFIDENCE`].
pub(crate) fn confidence_field(object: &LlmObject, key: &str) -> f64 {
    let raw = match object.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

/// Builds a candidate theme from the metadata fields shared by discovery,
/// consolidation, and new-theme proposals.
pub(crate) fn candidate(object: &LlmObject, post_ids: Vec<String>) -> CandidateTheme {
    let mut name = text_field(object, "theme_name");
    if name.is_empty() {
        name = text_field(object, "name");
    }
    if name.is_empty() {
        name = "Untitled theme".to_string();
    }
    CandidateTheme {
        name,
        description: text_field(object, "description"),
        product_area_id: id_field(object, "product_area_id"),
        post_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> LlmObject {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn list_field_skips_missing_and_empty_keys() {
        let obj = object(json!({ "post_indices": [], "post_ids": [1, 2] }));
        assert_eq!(list_field(&obj, &["post_indices", "post_ids"]).len(), 2);
        assert!(list_field(&obj, &["indices"]).is_empty());
    }

    #[test]
    fn id_value_accepts_numbers_and_prefixed_strings() {
        assert_eq!(id_value(&json!(7)), Some(7));
        assert_eq!(id_value(&json!("7")), Some(7));
        assert_eq!(id_value(&json!("Theme ID: 12")), Some(12));
        assert_eq!(id_value(&json!("none")), None);
        assert_eq!(id_value(&json!(null)), None);
        assert_eq!(id_value(&json!(1.5)), None);
    }

    #[test]
    fn confidence_is_clamped_and_defaulted() {
        let obj = object(json!({ "a": 1.7, "b": -0.2, "c": "0.4", "d": "high", "e": 0.8 }));
        assert!((confidence_field(&obj, "a") - 1.0).abs() < f64::EPSILON);
        assert!(confidence_field(&obj, "b").abs() < f64::EPSILON);
        assert!((confidence_field(&obj, "c") - 0.4).abs() < f64::EPSILON);
        assert!((confidence_field(&obj, "d") - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
        assert!((confidence_field(&obj, "missing") - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
        assert!((confidence_field(&obj, "e") - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn candidate_falls_back_on_missing_name() {
        let obj = object(json!({ "description": "d", "product_area_id": "3" }));
        let theme = candidate(&obj, vec!["a".into()]);
        assert_eq!(theme.name, "Untitled theme");
        assert_eq!(theme.product_area_id, Some(3));
    }
}

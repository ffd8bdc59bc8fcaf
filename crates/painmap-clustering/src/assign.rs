//! Incremental assignment of unmapped documents to the active theme set.

use std::collections::HashSet;

use painmap_llm::{LlmGateway, LlmObject};
use serde_json::Value;

use crate::prompts::assignment_prompt;
use crate::reply;
use crate::resolver::IndexRefs;
use crate::types::{CandidateTheme, Document, ProductArea, Theme};

const POST_INDEX_KEYS: &[&str] = &["post_indices", "post_ids"];

/// One document placed into an existing theme.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub post_id: String,
    pub theme_id: i64,
    pub confidence: f64,
}

/// Parsed result of one assignment batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchAssignment {
    pub assignments: Vec<Assignment>,
    pub new_themes: Vec<CandidateTheme>,
}

/// Asks the LLM to place `batch` into `themes` or propose new themes.
/// Returns `None` when the call produced no usable reply.
pub async fn assign_batch(
    gateway: &LlmGateway,
    themes: &[Theme],
    batch: &[Document],
    areas: &[ProductArea],
) -> Option<BatchAssignment> {
    if batch.is_empty() {
        return Some(BatchAssignment::default());
    }

    let prompt = assignment_prompt(themes, batch, areas);
    let Some(reply) = gateway.send(&prompt).await else {
        tracing::warn!(batch_size = batch.len(), "assignment call returned no usable reply");
        return None;
    };

    let refs = IndexRefs::new(batch.iter().map(|d| d.id.clone()));
    let active: HashSet<i64> = themes.iter().map(|t| t.id).collect();
    Some(parse_assignment_reply(&reply, &refs, &active))
}

/// Resolves post indices and validates theme IDs in an assignment reply.
///
/// Assignments naming a theme outside `active_theme_ids` are dropped, as are
/// references that do not resolve to a document in the batch.
pub fn parse_assignment_reply(
    reply: &LlmObject,
    refs: &IndexRefs,
    active_theme_ids: &HashSet<i64>,
) -> BatchAssignment {
    let mut result = BatchAssignment::default();

    for raw in reply
        .get("assignments")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        let Some(object) = raw.as_object() else {
            continue;
        };
        let reference = object
            .get("post_index")
            .filter(|v| !v.is_null())
            .or_else(|| object.get("post_id"));
        let Some(index) = reference.and_then(|v| refs.resolve(v)) else {
            tracing::debug!(reference = ?reference, "dropped unresolved assignment");
            continue;
        };
        let Some(post_id) = refs.id(index) else {
            continue;
        };

        let theme_id = reply::id_field(object, "theme_id");
        match theme_id {
            Some(id) if active_theme_ids.contains(&id) => {
                result.assignments.push(Assignment {
                    post_id: post_id.to_string(),
                    theme_id: id,
                    confidence: reply::confidence_field(object, "confidence"),
                });
            }
            _ => {
                tracing::warn!(post_id, ?theme_id, "assignment names no active theme; dropped");
            }
        }
    }

    for raw in reply
        .get("new_themes")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        let Some(object) = raw.as_object() else {
            continue;
        };
        let (post_ids, unresolved) = refs.resolve_ids(reply::list_field(object, POST_INDEX_KEYS));
        if !unresolved.is_empty() {
            tracing::debug!(unresolved = unresolved.len(), "dropped unresolved new-theme references");
        }
        if post_ids.is_empty() {
            continue;
        }
        result.new_themes.push(reply::candidate(object, post_ids));
    }

    result
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

    fn refs() -> IndexRefs {
        IndexRefs::new(["a", "b", "c", "d"])
    }

    #[test]
    fn resolves_assignments_and_new_themes() {
        let reply = object(json!({
            "assignments": [
                { "post_index": 0, "theme_id": 10, "confidence": 0.9 },
                { "post_index": "Post 1", "theme_id": "11" },
                { "post_id": "c", "theme_id": "Theme ID: 10", "confidence": 3 }
            ],
            "new_themes": [
                { "theme_name": "Billing exports", "description": "d", "product_area_id": 2, "post_indices": [3] }
            ]
        }));
        let active = HashSet::from([10, 11]);

        let parsed = parse_assignment_reply(&reply, &refs(), &active);
        assert_eq!(
            parsed.assignments,
            vec![
                Assignment { post_id: "a".into(), theme_id: 10, confidence: 0.9 },
                Assignment { post_id: "b".into(), theme_id: 11, confidence: 1.0 },
                Assignment { post_id: "c".into(), theme_id: 10, confidence: 1.0 },
            ]
        );
        assert_eq!(parsed.new_themes.len(), 1);
        assert_eq!(parsed.new_themes[0].post_ids, ["d"]);
        assert_eq!(parsed.new_themes[0].product_area_id, Some(2));
    }

    #[test]
    fn unknown_theme_ids_and_bad_indices_are_dropped() {
        let reply = object(json!({
            "assignments": [
                { "post_index": 0, "theme_id": 999 },
                { "post_index": 0, "theme_id": null },
                { "post_index": 17, "theme_id": 10 },
                { "theme_id": 10 }
            ],
            "new_themes": [
                { "theme_name": "Empty", "post_indices": [42] }
            ]
        }));
        let active = HashSet::from([10]);

        let parsed = parse_assignment_reply(&reply, &refs(), &active);
        assert!(parsed.assignments.is_empty());
        assert!(parsed.new_themes.is_empty());
    }

    #[test]
    fn missing_sections_yield_empty_result() {
        let parsed = parse_assignment_reply(&object(json!({})), &refs(), &HashSet::new());
        assert_eq!(parsed, BatchAssignment::default());
    }
}

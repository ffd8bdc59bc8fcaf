//! Per-product-area consolidation of batch-local themes.
//!
//! The LLM only decides which themes merge. Document lists are combined here
//! by set union, and any source theme the reply does not mention is carried
//! through unchanged, so the set of documents leaving a round always equals
//! the set entering it.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use painmap_llm::{LlmGateway, LlmObject};
use serde_json::Value;

use crate::prompts::consolidation_prompt;
use crate::reply;
use crate::resolver::IndexRefs;
use crate::types::{CandidateTheme, PipelineSettings};

/// Keys under which a consolidated theme may list its source indices.
const MERGED_FROM_KEYS: &[&str] = &[
    "merged_from",
    "source_indices",
    "original_indices",
    "theme_indices",
    "indices",
];

/// Discovered themes split by product area.
#[derive(Debug, Default)]
pub struct AreaBuckets {
    pub by_area: BTreeMap<i64, Vec<CandidateTheme>>,
    /// Documents of themes with no product area. They skip consolidation and
    /// go straight to the fallback theme.
    pub unassigned_post_ids: Vec<String>,
}

#[must_use]
pub fn group_by_area(themes: Vec<CandidateTheme>) -> AreaBuckets {
    let mut buckets = AreaBuckets::default();
    for theme in themes {
        match theme.product_area_id {
            Some(area_id) => buckets.by_area.entry(area_id).or_default().push(theme),
            None => buckets.unassigned_post_ids.extend(theme.post_ids),
        }
    }
    buckets
}

/// Runs consolidation rounds for one product area until the theme count is
/// at most `max_themes_per_area` or the round budget is spent.
///
/// A failed round ends consolidation for the area and keeps its themes as
/// they were.
pub async fn consolidate_area(
    gateway: &LlmGateway,
    area_id: i64,
    themes: Vec<CandidateTheme>,
    settings: &PipelineSettings,
) -> Vec<CandidateTheme> {
    let mut current = themes;
    let mut round = 0;

    while current.len() > settings.max_themes_per_area && round < settings.max_consolidation_rounds
    {
        round += 1;
        tracing::info!(
            product_area_id = area_id,
            round,
            themes = current.len(),
            target = settings.max_themes_per_area,
            "consolidation round"
        );

        let prompt = consolidation_prompt(&current);
        let merged = match gateway.send(&prompt).await {
            Some(reply) => apply_merge(&reply, &current, area_id, settings.debug),
            None => None,
        };
        match merged {
            Some(next) => current = next,
            None => {
                tracing::warn!(
                    product_area_id = area_id,
                    round,
                    "consolidation failed; keeping current themes"
                );
                break;
            }
        }
    }

    if current.len() > settings.max_themes_per_area {
        tracing::info!(
            product_area_id = area_id,
            themes = current.len(),
            target = settings.max_themes_per_area,
            "consolidation stopped above target"
        );
    }
    current
}

/// Applies one consolidation reply to `sources`.
///
/// Each consolidated theme takes the union of the documents of every source
/// index in its `merged_from` list. A source index is claimed by the first
/// consolidated theme that names it. Unclaimed sources are appended as-is.
/// Returns `None` if the reply has no `themes` array.
pub fn apply_merge(
    reply: &LlmObject,
    sources: &[CandidateTheme],
    area_id: i64,
    debug: bool,
) -> Option<Vec<CandidateTheme>> {
    let raw_themes = reply.get("themes").and_then(Value::as_array)?;
    let refs = IndexRefs::new(sources.iter().map(|t| t.name.clone()));
    let mut claimed = vec![false; sources.len()];
    let mut merged = Vec::with_capacity(raw_themes.len());

    for raw in raw_themes {
        let Some(object) = raw.as_object() else {
            continue;
        };
        let merged_from = reply::list_field(object, MERGED_FROM_KEYS);
        if merged_from.is_empty() && debug {
            tracing::warn!(
                theme = %reply::text_field(object, "theme_name"),
                keys = ?object.keys().collect::<Vec<_>>(),
                "consolidated theme has no merged_from list"
            );
        }

        let mut seen = HashSet::new();
        let mut post_ids = Vec::new();
        for value in merged_from {
            let Some(index) = refs.resolve(value) else {
                continue;
            };
            if std::mem::replace(&mut claimed[index], true) {
                continue;
            }
            for id in &sources[index].post_ids {
                if seen.insert(id.as_str()) {
                    post_ids.push(id.clone());
                }
            }
        }
        if post_ids.is_empty() {
            continue;
        }

        let mut theme = reply::candidate(object, post_ids);
        if theme.product_area_id.is_none() {
            theme.product_area_id = Some(area_id);
        }
        merged.push(theme);
    }

    let missed: Vec<usize> = claimed
        .iter()
        .enumerate()
        .filter_map(|(i, &c)| (!c).then_some(i))
        .collect();
    if !missed.is_empty() {
        tracing::warn!(
            product_area_id = area_id,
            ?missed,
            "consolidation reply missed theme indices; carrying them through"
        );
        merged.extend(missed.iter().map(|&i| sources[i].clone()));
    }

    if debug {
        log_preservation(area_id, sources, &merged);
    }
    Some(merged)
}

/// Distinct document IDs across `themes`.
#[must_use]
pub fn post_id_union(themes: &[CandidateTheme]) -> BTreeSet<&str> {
    themes
        .iter()
        .flat_map(|t| t.post_ids.iter().map(String::as_str))
        .collect()
}

fn log_preservation(area_id: i64, before: &[CandidateTheme], after: &[CandidateTheme]) {
    let input = post_id_union(before);
    let output = post_id_union(after);
    if input == output {
        tracing::info!(
            product_area_id = area_id,
            themes_in = before.len(),
            themes_out = after.len(),
            posts = output.len(),
            "consolidation preserved every post"
        );
    } else {
        tracing::warn!(
            product_area_id = area_id,
            lost = input.difference(&output).count(),
            extra = output.difference(&input).count(),
            "consolidation changed the post set"
        );
    }
}

//! Prompt text for the three LLM round-trips.
//!
//! Documents and themes are always referred to by position. Real identifiers
//! never appear in a prompt except as existing theme IDs during incremental
//! assignment, which the assigner validates against the active set.

use serde::Serialize;

use crate::types::{CandidateTheme, Document, ProductArea, Theme};

const NO_BODY: &str = "(no body)";
const NO_DESCRIPTION: &str = "No description";

/// `[Post i]` blocks, one per document, in batch order.
#[must_use]
pub fn render_posts(batch: &[Document]) -> String {
    let mut out = String::new();
    for (index, doc) in batch.iter().enumerate() {
        if index > 0 {
            out.push_str("\n\n");
        }
        let body = doc
            .body
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(NO_BODY);
        out.push_str(&format!(
            "[Post {index}]\nTitle: {}\nBody: {body}",
            doc.title.trim()
        ));
    }
    out
}

/// `id = name: description` lines for the taxonomy.
#[must_use]
pub fn render_product_areas(areas: &[ProductArea]) -> String {
    if areas.is_empty() {
        return "(no product areas are defined; always use null)".to_string();
    }
    areas
        .iter()
        .map(|area| match area.description.as_deref().map(str::trim) {
            Some(desc) if !desc.is_empty() => format!("{} = {}: {desc}", area.id, area.name),
            _ => format!("{} = {}", area.id, area.name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `[Theme ID: id] name: description` lines for incremental assignment.
#[must_use]
pub fn render_existing_themes(themes: &[Theme]) -> String {
    themes
        .iter()
        .map(|t| {
            let desc = t
                .description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(NO_DESCRIPTION);
            format!("[Theme ID: {}] {}: {desc}", t.id, t.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[must_use]
pub fn discovery_prompt(batch: &[Document], areas: &[ProductArea]) -> String {
    let max_index = batch.len().saturating_sub(1);
    let post_count = batch.len();
    let posts = render_posts(batch);
    let areas = render_product_areas(areas);
    format!(
        r#"Read the user posts below and group them into recurring themes. A theme is what users are TRYING TO DO and struggling with, not a technical symptom.

Posts (each has an index number):
{posts}

Product areas (use the ID number; pick the area that is the SOURCE of the frustration, not merely one that is mentioned):
{areas}

Name each theme after the user's goal ("Connecting a shared drive as a knowledge source"), not the failure ("Drive sync errors"). Describe what users want and why they are stuck.

Return a JSON object with exactly this structure:
{{
    "themes": [
        {{
            "theme_name": "What users are trying to do",
            "description": "Users want to X but are struggling because Y",
            "product_area_id": <area ID, or null if unclear>,
            "post_indices": [0, 3, 7]
        }}
    ]
}}

Rules:
- "post_indices" holds INDEX NUMBERS from 0 to {max_index}. Never use any other identifier.
- Every index from 0 to {max_index} must appear in exactly one theme.
- If unsure, put the post in the closest theme. If nothing fits, use a "General questions and discussions" theme.
- A post with several complaints goes to the theme of its MAIN frustration only.
- Before answering, count the indices in your response. The count must be {post_count}.

Respond ONLY with the JSON object."#
    )
}

#[derive(Serialize)]
struct ThemeSummary<'a> {
    index: usize,
    theme_name: &'a str,
    description: &'a str,
    product_area_id: Option<i64>,
    post_count: usize,
}

/// Consolidation sees theme metadata and document counts only, never the
/// document lists.
#[must_use]
pub fn consolidation_prompt(themes: &[CandidateTheme]) -> String {
    let summaries: Vec<ThemeSummary<'_>> = themes
        .iter()
        .enumerate()
        .map(|(index, t)| ThemeSummary {
            index,
            theme_name: &t.name,
            description: &t.description,
            product_area_id: t.product_area_id,
            post_count: t.post_ids.len(),
        })
        .collect();
    let themes_json =
        serde_json::to_string_pretty(&summaries).unwrap_or_else(|_| "[]".to_string());
    let max_index = themes.len().saturating_sub(1);

    format!(
        r#"The themes below were discovered independently in several batches of user posts. Many describe the same user goal in different words.

Themes (each has an index number):
{themes_json}

Merge themes that share the SAME user goal. Keep names focused on what users want to do. When merged themes disagree on product area, choose the area that is the main source of frustration.

You do not need to list any posts. Only say which theme indices were merged.

Return a JSON object with exactly this structure:
{{
    "themes": [
        {{
            "theme_name": "What users are trying to do",
            "description": "Users want to X but are struggling because Y",
            "product_area_id": <area ID, or null>,
            "merged_from": [0, 3, 7]
        }}
    ]
}}

Every theme index from 0 to {max_index} must appear in exactly one "merged_from" list.

Respond ONLY with the JSON object."#
    )
}

#[must_use]
pub fn assignment_prompt(themes: &[Theme], batch: &[Document], areas: &[ProductArea]) -> String {
    let max_index = batch.len().saturating_sub(1);
    let post_count = batch.len();
    let existing = render_existing_themes(themes);
    let posts = render_posts(batch);
    let areas = render_product_areas(areas);
    format!(
        r#"Assign each new post below to the existing theme that matches what the user is TRYING TO DO. If a post describes a goal no existing theme covers, propose a new theme for it.

Existing themes:
{existing}

New posts (each has an index number):
{posts}

Product areas for new themes (use the ID number):
{areas}

Return a JSON object with exactly this structure:
{{
    "assignments": [
        {{
            "post_index": 0,
            "theme_id": 1,
            "confidence": 0.8
        }}
    ],
    "new_themes": [
        {{
            "theme_name": "What users are trying to do",
            "description": "Users want to X but are struggling because Y",
            "product_area_id": <area ID, or null>,
            "post_indices": [3, 7]
        }}
    ]
}}

Rules:
- "post_index" and "post_indices" hold INDEX NUMBERS from 0 to {max_index}.
- "theme_id" must be one of the Theme IDs listed above.
- Every index from 0 to {max_index} must appear exactly once, either in an assignment or in a new theme.
- Include uncertain matches with a lower confidence (0.0 to 1.0) instead of dropping them.
- Before answering, count the indices in your response. The count must be {post_count}.

Respond ONLY with the JSON object."#
    )
}

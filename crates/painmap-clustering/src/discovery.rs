//! Full-run theme discovery, one LLM call per batch of documents.

use painmap_llm::{LlmGateway, LlmObject};
use serde_json::Value;

use crate::prompts::discovery_prompt;
use crate::reply;
use crate::resolver::IndexRefs;
use crate::types::{CandidateTheme, Document, ProductArea};

/// Keys under which a theme's document indices may arrive.
const POST_INDEX_KEYS: &[&str] = &["post_indices", "post_ids"];

/// Discovers themes in one batch.
///
/// A failed call or a reply without a `themes` array contributes nothing;
/// the batch's documents then fall through to the fallback theme.
pub async fn discover_batch(
    gateway: &LlmGateway,
    batch: &[Document],
    areas: &[ProductArea],
    debug: bool,
) -> Vec<CandidateTheme> {
    if batch.is_empty() {
        return Vec::new();
    }

    let prompt = discovery_prompt(batch, areas);
    let Some(reply) = gateway.send(&prompt).await else {
        tracing::warn!(batch_size = batch.len(), "discovery call returned no usable reply");
        return Vec::new();
    };

    let refs = IndexRefs::new(batch.iter().map(|d| d.id.clone()));
    parse_discovery_reply(&reply, &refs, debug)
}

/// Turns a discovery reply into candidate themes with real document IDs.
/// Themes whose indices all fail to resolve are dropped.
pub fn parse_discovery_reply(
    reply: &LlmObject,
    refs: &IndexRefs,
    debug: bool,
) -> Vec<CandidateTheme> {
    let Some(raw_themes) = reply.get("themes").and_then(Value::as_array) else {
        tracing::warn!(
            keys = ?reply.keys().collect::<Vec<_>>(),
            "discovery reply has no themes array"
        );
        return Vec::new();
    };

    let mut covered = vec![false; refs.len()];
    let mut themes = Vec::with_capacity(raw_themes.len());

    for raw in raw_themes {
        let Some(object) = raw.as_object() else {
            continue;
        };
        let (post_ids, unresolved) = refs.resolve_ids(reply::list_field(object, POST_INDEX_KEYS));
        let theme = reply::candidate(object, post_ids);

        if debug {
            for value in &unresolved {
                tracing::warn!(theme = %theme.name, value = %value, "could not resolve post reference");
            }
        } else if !unresolved.is_empty() {
            tracing::debug!(theme = %theme.name, unresolved = unresolved.len(), "dropped unresolved post references");
        }

        if theme.post_ids.is_empty() {
            continue;
        }
        for id in &theme.post_ids {
            if let Some(index) = refs.index_of(id) {
                covered[index] = true;
            }
        }
        themes.push(theme);
    }

    if debug {
        let missing: Vec<usize> = covered
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| (!c).then_some(i))
            .collect();
        let assigned = refs.len() - missing.len();
        if missing.is_empty() {
            tracing::info!(assigned, total = refs.len(), "all batch posts assigned");
        } else {
            tracing::warn!(assigned, total = refs.len(), ?missing, "batch posts missing from reply");
        }
    }

    themes
}

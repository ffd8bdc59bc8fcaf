//! Maps the loosely-typed references an LLM echoes back (`3`, `"3"`,
//! `"Post 3"`, `"[3]"`, or an identifier) onto positions in the list that was
//! rendered into the prompt.
//!
//! Prompts enumerate items by position only. Nothing here touches the
//! network, so every accepted format is covered by table tests.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static EMBEDDED_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\b").expect("valid embedded number regex"));

/// Bidirectional `index <-> identifier` table for one prompt.
#[derive(Debug, Clone, Default)]
pub struct IndexRefs {
    ids: Vec<String>,
    by_id: HashMap<String, usize>,
}

impl IndexRefs {
    /// Builds the table in iteration order; position `i` is index `i`.
    /// A repeated identifier resolves to its first position.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        let mut by_id = HashMap::with_capacity(ids.len());
        for (index, id) in ids.iter().enumerate() {
            by_id.entry(id.clone()).or_insert(index);
        }
        Self { ids, by_id }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifier at `index`, if in range.
    #[must_use]
    pub fn id(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    /// Position of an identifier, exact match only.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Resolves one raw reference.
    ///
    /// Tried in order: a non-negative JSON integer; a digit-only string; the
    /// first standalone number embedded in a string; the identifier itself,
    /// exact and then case-insensitive. Anything else, or any number outside
    /// `0..len`, yields `None`.
    #[must_use]
    pub fn resolve(&self, value: &Value) -> Option<usize> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .filter(|&i| i < self.ids.len()),
            Value::String(s) => self.resolve_str(s),
            _ => None,
        }
    }

    fn resolve_str(&self, raw: &str) -> Option<usize> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }

        if s.bytes().all(|b| b.is_ascii_digit()) {
            if let Some(index) = self.in_range(s) {
                return Some(index);
            }
        } else if let Some(index) = EMBEDDED_NUMBER
            .captures(s)
            .and_then(|caps| caps.get(1))
            .and_then(|m| self.in_range(m.as_str()))
        {
            return Some(index);
        }

        if let Some(&index) = self.by_id.get(s) {
            return Some(index);
        }

        let lowered = s.to_lowercase();
        self.ids.iter().position(|id| id.to_lowercase() == lowered)
    }

    fn in_range(&self, digits: &str) -> Option<usize> {
        digits
            .parse::<usize>()
            .ok()
            .filter(|&i| i < self.ids.len())
    }

    /// Resolves every value in `raw`, returning the identifiers in first-seen
    /// order without duplicates, plus the values that could not be resolved.
    pub fn resolve_ids<'v>(&self, raw: &'v [Value]) -> (Vec<String>, Vec<&'v Value>) {
        let mut seen = vec![false; self.ids.len()];
        let mut resolved = Vec::new();
        let mut unresolved = Vec::new();
        for value in raw {
            match self.resolve(value) {
                Some(index) => {
                    if !seen[index] {
                        seen[index] = true;
                        resolved.push(self.ids[index].clone());
                    }
                }
                None => unresolved.push(value),
            }
        }
        (resolved, unresolved)
    }
}

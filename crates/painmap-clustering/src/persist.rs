//! Writing themes and mappings with the one-mapping-per-document rule.
//!
//! [`ThemeWriter`] tracks which documents have been mapped during a run. The
//! first theme to claim a document keeps it; later claims are ignored. The
//! fallback theme picks up whatever is left.

use std::collections::HashSet;

use crate::error::StoreError;
use crate::severity::DEFAULT_SEVERITY;
use crate::store::ClusteringStore;
use crate::types::{
    CandidateTheme, Document, NewMapping, NewTheme, ProductArea, Theme, FALLBACK_CONFIDENCE,
    UNCATEGORIZED_THEME_DESCRIPTION, UNCATEGORIZED_THEME_NAME,
};

/// Active product-area ids, used to vet ids coming back from the LLM.
#[derive(Debug, Clone, Default)]
pub struct AreaSet {
    ids: HashSet<i64>,
}

impl AreaSet {
    #[must_use]
    pub fn new(areas: &[ProductArea]) -> Self {
        Self {
            ids: areas.iter().map(|a| a.id).collect(),
        }
    }

    /// Returns `area_id` if it names an active area, otherwise `None`.
    #[must_use]
    pub fn check(&self, area_id: Option<i64>) -> Option<i64> {
        match area_id {
            Some(id) if self.ids.contains(&id) => Some(id),
            Some(id) => {
                tracing::warn!(product_area_id = id, "unknown product area; using none");
                None
            }
            None => None,
        }
    }

    /// Nulls out unknown product areas in place.
    pub fn sanitize(&self, themes: &mut [CandidateTheme]) {
        for theme in themes {
            theme.product_area_id = self.check(theme.product_area_id);
        }
    }
}

/// Outcome of [`ThemeWriter::write_uncategorized`].
#[derive(Debug, Clone)]
pub struct FallbackWrite {
    pub theme: Theme,
    /// `false` when an existing fallback theme was reused.
    pub created: bool,
    pub posts: usize,
}

pub struct ThemeWriter<'a> {
    store: &'a dyn ClusteringStore,
    run_id: i64,
    areas: AreaSet,
    eligible: HashSet<String>,
    claimed: HashSet<String>,
}

impl<'a> ThemeWriter<'a> {
    /// `documents` bounds what this writer may map: ids outside it are
    /// ignored even if the LLM returns them.
    #[must_use]
    pub fn new(
        store: &'a dyn ClusteringStore,
        run_id: i64,
        areas: AreaSet,
        documents: &[Document],
    ) -> Self {
        Self {
            store,
            run_id,
            areas,
            eligible: documents.iter().map(|d| d.id.clone()).collect(),
            claimed: HashSet::new(),
        }
    }

    #[must_use]
    pub fn claimed(&self) -> usize {
        self.claimed.len()
    }

    /// Ids from `post_ids` that are eligible, not yet claimed and still
    /// present in the store, deduplicated in input order.
    async fn claimable(&self, post_ids: Vec<String>) -> Result<Vec<String>, StoreError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in post_ids {
            let fresh = self.eligible.contains(&id) && !self.claimed.contains(&id);
            if !fresh || !seen.insert(id.clone()) {
                continue;
            }
            if self.store.post_exists(&id).await? {
                out.push(id);
            } else {
                tracing::debug!(run_id = self.run_id, post_id = %id, "post vanished mid-run");
            }
        }
        Ok(out)
    }

    async fn map(
        &mut self,
        theme_id: i64,
        entries: Vec<(String, f64)>,
    ) -> Result<usize, StoreError> {
        let mappings: Vec<NewMapping> = entries
            .iter()
            .map(|(post_id, confidence)| NewMapping {
                post_id: post_id.clone(),
                theme_id,
                confidence: *confidence,
            })
            .collect();
        let inserted = self.store.insert_mappings(&mappings).await?;
        self.claimed.extend(entries.into_iter().map(|(post_id, _)| post_id));
        Ok(usize::try_from(inserted).unwrap_or(usize::MAX))
    }

    /// Creates a theme for `candidate` and maps its claimable documents.
    /// Returns `None`, writing nothing, when no document is left to map.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a store call fails.
    pub async fn write_theme(
        &mut self,
        candidate: &CandidateTheme,
        confidence: f64,
    ) -> Result<Option<Theme>, StoreError> {
        let post_ids = self
            .claimable(candidate.post_ids.clone())
            .await?;
        if post_ids.is_empty() {
            tracing::debug!(
                run_id = self.run_id,
                theme = %candidate.name,
                "theme has no unclaimed posts; skipped"
            );
            return Ok(None);
        }

        let description = Some(candidate.description.clone()).filter(|d| !d.is_empty());
        let theme = self
            .store
            .create_theme(NewTheme {
                name: candidate.name.clone(),
                description,
                product_area_id: self.areas.check(candidate.product_area_id),
                severity: DEFAULT_SEVERITY,
                clustering_run_id: Some(self.run_id),
            })
            .await?;

        let entries = post_ids.into_iter().map(|id| (id, confidence)).collect();
        let mapped = self.map(theme.id, entries).await?;
        tracing::debug!(
            run_id = self.run_id,
            theme_id = theme.id,
            theme = %theme.name,
            posts = mapped,
            "theme written"
        );
        Ok(Some(theme))
    }

    /// Maps documents onto an existing theme. Returns how many were mapped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a store call fails.
    pub async fn map_to_existing(
        &mut self,
        theme_id: i64,
        entries: Vec<(String, f64)>,
    ) -> Result<usize, StoreError> {
        let ids = entries.iter().map(|(id, _)| id.clone()).collect();
        let mut allowed: HashSet<String> = self.claimable(ids).await?.into_iter().collect();
        // First confidence for a repeated id wins.
        let entries: Vec<(String, f64)> = entries
            .into_iter()
            .filter(|(id, _)| allowed.remove(id))
            .collect();
        if entries.is_empty() {
            return Ok(0);
        }
        self.map(theme_id, entries).await
    }

    /// Maps every unclaimed document of `documents` to the fallback theme.
    ///
    /// With `reuse_existing`, an active fallback theme with no product area
    /// is reused instead of creating a new one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a store call fails.
    pub async fn write_uncategorized(
        &mut self,
        documents: &[Document],
        reuse_existing: bool,
    ) -> Result<Option<FallbackWrite>, StoreError> {
        let leftover = self
            .claimable(documents.iter().map(|d| d.id.clone()).collect())
            .await?;
        if leftover.is_empty() {
            return Ok(None);
        }

        let existing = if reuse_existing {
            self.store
                .find_active_theme_by_name(UNCATEGORIZED_THEME_NAME, None)
                .await?
        } else {
            None
        };
        let (theme, created) = match existing {
            Some(theme) => (theme, false),
            None => {
                let theme = self
                    .store
                    .create_theme(NewTheme {
                        name: UNCATEGORIZED_THEME_NAME.to_string(),
                        description: Some(UNCATEGORIZED_THEME_DESCRIPTION.to_string()),
                        product_area_id: None,
                        severity: DEFAULT_SEVERITY,
                        clustering_run_id: Some(self.run_id),
                    })
                    .await?;
                (theme, true)
            }
        };

        let entries = leftover
            .into_iter()
            .map(|id| (id, FALLBACK_CONFIDENCE))
            .collect();
        let posts = self.map(theme.id, entries).await?;
        tracing::info!(
            run_id = self.run_id,
            theme_id = theme.id,
            posts,
            reused = !created,
            "uncategorized posts mapped"
        );
        Ok(Some(FallbackWrite {
            theme,
            created,
            posts,
        }))
    }
}

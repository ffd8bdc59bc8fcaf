//! The clustering service: run lifecycle plus the full and incremental
//! pipelines.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use painmap_core::{AppConfig, RunStatus, RunType};
use painmap_llm::{LlmError, LlmGateway};
use tokio::task::JoinHandle;

use crate::assign::assign_batch;
use crate::consolidate::{consolidate_area, group_by_area, post_id_union};
use crate::discovery::discover_batch;
use crate::error::{ClusteringError, StoreError};
use crate::persist::{AreaSet, ThemeWriter};
use crate::severity::compute_theme_severity;
use crate::store::ClusteringStore;
use crate::types::{
    CandidateTheme, ClusteringRun, PipelineSettings, RunTotals, Theme, DEFAULT_CONFIDENCE,
};

/// Message recorded on runs force-failed by [`ClusteringService::cancel_stuck_runs`].
pub const CANCELLED_MESSAGE: &str = "cancelled by operator";

/// Entry point for everything the surrounding service layer can ask of the
/// pipeline.
///
/// Cloning is cheap; [`spawn`](Self::spawn) moves a clone onto a background
/// task.
#[derive(Clone)]
pub struct ClusteringService {
    store: Arc<dyn ClusteringStore>,
    gateway: LlmGateway,
    settings: PipelineSettings,
}

impl std::fmt::Debug for ClusteringService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusteringService")
            .field("gateway", &self.gateway)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ClusteringService {
    #[must_use]
    pub fn new(
        store: Arc<dyn ClusteringStore>,
        gateway: LlmGateway,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            settings,
        }
    }

    /// Builds the gateway and settings from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] if the configured provider cannot be built.
    pub fn from_config(
        store: Arc<dyn ClusteringStore>,
        config: &AppConfig,
    ) -> Result<Self, LlmError> {
        Ok(Self::new(
            store,
            LlmGateway::from_config(config)?,
            PipelineSettings::from_config(config),
        ))
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    // -- run lifecycle --------------------------------------------------------

    /// Creates a run and promotes it to `running`.
    ///
    /// The row is inserted as `pending` first and only then checked against
    /// other active runs, so two concurrent callers can never both succeed:
    /// the later insert sees the earlier one and withdraws.
    ///
    /// # Errors
    ///
    /// Returns [`ClusteringError::Conflict`] if another run is pending or
    /// running, or [`ClusteringError::Store`] on storage failure.
    pub async fn start_run(&self, run_type: RunType) -> Result<ClusteringRun, ClusteringError> {
        let run = self.store.create_pending_run(run_type).await?;

        if self.store.has_blocking_run(run.id).await? {
            self.withdraw(run.id).await;
            tracing::info!(run_id = run.id, %run_type, "clustering run already in progress");
            return Err(ClusteringError::Conflict);
        }

        match self.store.promote_run(run.id).await {
            Ok(()) => {}
            Err(StoreError::ActiveRunConflict) => {
                self.withdraw(run.id).await;
                tracing::info!(run_id = run.id, %run_type, "lost race for the running slot");
                return Err(ClusteringError::Conflict);
            }
            Err(e) => {
                self.withdraw(run.id).await;
                return Err(e.into());
            }
        }

        let run = self.store.get_run(run.id).await?;
        tracing::info!(
            run_id = run.id,
            public_id = %run.public_id,
            %run_type,
            "clustering run started"
        );
        Ok(run)
    }

    async fn withdraw(&self, run_id: i64) {
        if let Err(e) = self.store.delete_run(run_id).await {
            tracing::warn!(run_id, error = %e, "failed to withdraw pending run");
        }
    }

    /// Runs the pipeline for a run returned by [`start_run`](Self::start_run).
    ///
    /// Never returns an error. Any failure is recorded on the run row as
    /// `failed`; batches committed before the failure stay in place.
    pub async fn run(&self, run_id: i64) {
        if let Err(err) = self.execute(run_id).await {
            tracing::error!(run_id, error = %err, "clustering run failed");
            self.fail_run_best_effort(run_id, &err.to_string()).await;
        }
    }

    /// Runs [`run`](Self::run) on a detached tokio task.
    #[must_use]
    pub fn spawn(&self, run_id: i64) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move { service.run(run_id).await })
    }

    async fn execute(&self, run_id: i64) -> Result<(), ClusteringError> {
        let run = match self.store.get_run(run_id).await {
            Ok(run) => run,
            Err(StoreError::NotFound) => return Err(ClusteringError::RunNotFound(run_id)),
            Err(e) => return Err(e.into()),
        };
        if run.status != RunStatus::Running {
            tracing::warn!(run_id, status = %run.status, "run is not running; nothing to do");
            return Ok(());
        }

        let totals = match run.run_type {
            RunType::Full => self.run_full(run_id).await?,
            RunType::Incremental => self.run_incremental(run_id).await?,
        };

        match self.store.complete_run(run_id, totals).await {
            Ok(()) => {}
            Err(StoreError::InvalidTransition { .. }) => {
                tracing::warn!(
                    run_id,
                    posts_processed = totals.posts_processed,
                    "run was closed while in flight; its status is left as is"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            run_id,
            posts_processed = totals.posts_processed,
            themes_created = totals.themes_created,
            themes_updated = totals.themes_updated,
            "clustering run completed"
        );
        Ok(())
    }

    /// Progress bookkeeping. A run closed by a cancel keeps going; only the
    /// counter stops moving.
    async fn record_progress(&self, run_id: i64, processed: usize) -> Result<(), StoreError> {
        match self.store.record_progress(run_id, processed).await {
            Err(StoreError::InvalidTransition { .. }) => {
                tracing::debug!(
                    run_id,
                    processed,
                    "run is no longer running; progress not recorded"
                );
                Ok(())
            }
            other => other,
        }
    }

    async fn fail_run_best_effort(&self, run_id: i64, message: &str) {
        if let Err(mark_err) = self.store.fail_run(run_id, message).await {
            tracing::error!(
                run_id,
                error = %mark_err,
                "failed to mark clustering run as failed"
            );
        }
    }

    /// Force-fails every pending or running run. In-flight work is not
    /// interrupted; only the bookkeeping changes.
    ///
    /// # Errors
    ///
    /// Returns [`ClusteringError::Store`] on storage failure.
    pub async fn cancel_stuck_runs(&self) -> Result<u64, ClusteringError> {
        let cancelled = self.store.cancel_active_runs(CANCELLED_MESSAGE).await?;
        tracing::info!(cancelled, "cancelled active clustering runs");
        Ok(cancelled)
    }

    /// Most recently started run, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ClusteringError::Store`] on storage failure.
    pub async fn latest_run(&self) -> Result<Option<ClusteringRun>, ClusteringError> {
        Ok(self.store.latest_run().await?)
    }

    /// # Errors
    ///
    /// Returns [`ClusteringError::RunNotFound`] for an unknown id.
    pub async fn get_run(&self, run_id: i64) -> Result<ClusteringRun, ClusteringError> {
        match self.store.get_run(run_id).await {
            Ok(run) => Ok(run),
            Err(StoreError::NotFound) => Err(ClusteringError::RunNotFound(run_id)),
            Err(e) => Err(e.into()),
        }
    }

    // -- full run -------------------------------------------------------------

    async fn run_full(&self, run_id: i64) -> Result<RunTotals, ClusteringError> {
        let store = self.store.as_ref();
        let documents = store.list_posts_newest_first().await?;
        if documents.is_empty() {
            tracing::info!(run_id, "no posts to cluster");
            return Ok(RunTotals::default());
        }

        let areas = store.list_active_product_areas().await?;
        let area_set = AreaSet::new(&areas);
        let deactivated = store.deactivate_all_themes().await?;
        let cleared = store.clear_all_mappings().await?;
        tracing::info!(
            run_id,
            posts = documents.len(),
            product_areas = areas.len(),
            deactivated,
            cleared,
            "starting full clustering"
        );

        let batch_size = self.settings.batch_size.max(1);
        let batches = documents.len().div_ceil(batch_size);
        let mut discovered: Vec<CandidateTheme> = Vec::new();
        let mut processed = 0;
        for (i, batch) in documents.chunks(batch_size).enumerate() {
            let mut themes =
                discover_batch(&self.gateway, batch, &areas, self.settings.debug).await;
            area_set.sanitize(&mut themes);
            tracing::info!(
                run_id,
                batch = i + 1,
                batches,
                themes = themes.len(),
                "discovery batch done"
            );
            discovered.extend(themes);
            processed += batch.len();
            self.record_progress(run_id, processed).await?;
        }

        let discovered_posts = post_id_union(&discovered).len();
        let buckets = group_by_area(discovered);
        if !buckets.unassigned_post_ids.is_empty() {
            tracing::info!(
                run_id,
                posts = buckets.unassigned_post_ids.len(),
                "posts without a product area go to the fallback theme"
            );
        }

        let mut final_themes = Vec::new();
        for (area_id, themes) in buckets.by_area {
            final_themes.extend(consolidate_area(&self.gateway, area_id, themes, &self.settings).await);
        }
        tracing::info!(
            run_id,
            discovered_posts,
            themes = final_themes.len(),
            "consolidation done"
        );

        let mut writer = ThemeWriter::new(store, run_id, area_set, &documents);
        let mut created: Vec<Theme> = Vec::new();
        for candidate in &final_themes {
            if let Some(theme) = writer.write_theme(candidate, DEFAULT_CONFIDENCE).await? {
                created.push(theme);
            }
        }
        if let Some(fallback) = writer.write_uncategorized(&documents, false).await? {
            created.push(fallback.theme);
        }

        for theme in &created {
            self.refresh_severity(theme.id).await?;
        }

        Ok(RunTotals {
            posts_processed: documents.len(),
            themes_created: created.len(),
            themes_updated: 0,
        })
    }

    // -- incremental run ------------------------------------------------------

    async fn run_incremental(&self, run_id: i64) -> Result<RunTotals, ClusteringError> {
        let store = self.store.as_ref();
        let mut themes = store.list_active_themes().await?;
        if themes.is_empty() {
            tracing::info!(run_id, "no active themes; running full clustering instead");
            return self.run_full(run_id).await;
        }

        let documents = store.list_unmapped_posts().await?;
        if documents.is_empty() {
            tracing::info!(run_id, "no unmapped posts");
            return Ok(RunTotals::default());
        }

        let areas = store.list_active_product_areas().await?;
        let mut writer = ThemeWriter::new(store, run_id, AreaSet::new(&areas), &documents);
        let mut touched: BTreeSet<i64> = BTreeSet::new();
        let mut created: Vec<i64> = Vec::new();
        tracing::info!(
            run_id,
            posts = documents.len(),
            themes = themes.len(),
            "starting incremental assignment"
        );

        let batch_size = self.settings.batch_size.max(1);
        let batches = documents.len().div_ceil(batch_size);
        let mut processed = 0;
        for (i, batch) in documents.chunks(batch_size).enumerate() {
            let mut assigned = 0;
            let mut proposed = 0;
            if let Some(result) = assign_batch(&self.gateway, &themes, batch, &areas).await {
                for assignment in &result.assignments {
                    let mapped = writer
                        .map_to_existing(
                            assignment.theme_id,
                            vec![(assignment.post_id.clone(), assignment.confidence)],
                        )
                        .await?;
                    if mapped > 0 {
                        touched.insert(assignment.theme_id);
                        assigned += mapped;
                    }
                }
                for candidate in &result.new_themes {
                    if let Some(theme) = writer.write_theme(candidate, DEFAULT_CONFIDENCE).await? {
                        created.push(theme.id);
                        themes.push(theme);
                        proposed += 1;
                    }
                }
            }
            tracing::info!(
                run_id,
                batch = i + 1,
                batches,
                assigned,
                new_themes = proposed,
                "assignment batch done"
            );
            processed += batch.len();
            self.record_progress(run_id, processed).await?;
        }

        let fallback = writer.write_uncategorized(&documents, true).await?;
        if let Some(fallback) = &fallback {
            if fallback.created {
                created.push(fallback.theme.id);
            } else {
                touched.insert(fallback.theme.id);
            }
        }

        let new_ids: HashSet<i64> = created.iter().copied().collect();
        let updated: Vec<i64> = touched
            .into_iter()
            .filter(|id| !new_ids.contains(id))
            .collect();
        let refresh: Vec<i64> = updated.iter().chain(&created).copied().collect();
        for theme_id in refresh {
            self.refresh_severity(theme_id).await?;
        }

        Ok(RunTotals {
            posts_processed: documents.len(),
            themes_created: created.len(),
            themes_updated: updated.len(),
        })
    }

    // -- severity -------------------------------------------------------------

    async fn refresh_severity(&self, theme_id: i64) -> Result<u8, StoreError> {
        let severity = compute_theme_severity(self.store.as_ref(), theme_id).await?;
        self.store.set_theme_severity(theme_id, severity).await?;
        Ok(severity)
    }

    /// Recomputes and stores one theme's severity.
    ///
    /// # Errors
    ///
    /// Returns [`ClusteringError::ThemeNotFound`] for an unknown theme.
    pub async fn recalculate_severity(&self, theme_id: i64) -> Result<u8, ClusteringError> {
        match self.store.get_theme(theme_id).await {
            Ok(_) => {}
            Err(StoreError::NotFound) => return Err(ClusteringError::ThemeNotFound(theme_id)),
            Err(e) => return Err(e.into()),
        }
        let severity = self.refresh_severity(theme_id).await?;
        tracing::debug!(theme_id, severity, "severity recalculated");
        Ok(severity)
    }

    /// Recomputes severity for every active theme and returns how many
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns [`ClusteringError::Store`] on storage failure.
    pub async fn recalculate_all_severities(&self) -> Result<usize, ClusteringError> {
        let themes = self.store.list_active_themes().await?;
        let mut changed = 0;
        for theme in &themes {
            if self.refresh_severity(theme.id).await? != theme.severity {
                changed += 1;
            }
        }
        tracing::info!(themes = themes.len(), changed, "severities recalculated");
        Ok(changed)
    }
}

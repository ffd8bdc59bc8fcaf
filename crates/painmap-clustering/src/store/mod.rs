//! Storage seam for the pipeline.
//!
//! [`ClusteringStore`] is the only way the pipeline reads or writes state.
//! [`PgStore`] backs it with Postgres through `painmap-db`; [`MemoryStore`]
//! keeps everything in process for tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use painmap_core::{RunType, Sentiment};

use crate::error::StoreError;
use crate::types::{
    ClusteringRun, Document, NewMapping, NewTheme, ProductArea, RunTotals, Theme,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ClusteringStore: Send + Sync {
    // -- runs ---------------------------------------------------------------

    /// Inserts a run in `pending` state.
    async fn create_pending_run(&self, run_type: RunType) -> Result<ClusteringRun, StoreError>;

    /// `true` if another run is `running`, or `pending` and older than `run_id`.
    async fn has_blocking_run(&self, run_id: i64) -> Result<bool, StoreError>;

    /// Withdraws a `pending` run.
    async fn delete_run(&self, run_id: i64) -> Result<(), StoreError>;

    /// `pending` -> `running`. Fails with [`StoreError::ActiveRunConflict`]
    /// if another run is already running.
    async fn promote_run(&self, run_id: i64) -> Result<(), StoreError>;

    async fn get_run(&self, run_id: i64) -> Result<ClusteringRun, StoreError>;

    /// Raises `posts_processed`; never lowers it.
    async fn record_progress(&self, run_id: i64, posts_processed: usize)
        -> Result<(), StoreError>;

    async fn complete_run(&self, run_id: i64, totals: RunTotals) -> Result<(), StoreError>;

    async fn fail_run(&self, run_id: i64, error_message: &str) -> Result<(), StoreError>;

    /// Force-fails every `pending` or `running` run; returns how many changed.
    async fn cancel_active_runs(&self, error_message: &str) -> Result<u64, StoreError>;

    async fn latest_run(&self) -> Result<Option<ClusteringRun>, StoreError>;

    // -- documents & taxonomy -------------------------------------------------

    async fn list_posts_newest_first(&self) -> Result<Vec<Document>, StoreError>;

    /// Documents with no mapping, newest first.
    async fn list_unmapped_posts(&self) -> Result<Vec<Document>, StoreError>;

    async fn post_exists(&self, post_id: &str) -> Result<bool, StoreError>;

    async fn list_active_product_areas(&self) -> Result<Vec<ProductArea>, StoreError>;

    // -- themes ---------------------------------------------------------------

    async fn deactivate_all_themes(&self) -> Result<u64, StoreError>;

    async fn clear_all_mappings(&self) -> Result<u64, StoreError>;

    async fn list_active_themes(&self) -> Result<Vec<Theme>, StoreError>;

    async fn find_active_theme_by_name(
        &self,
        name: &str,
        product_area_id: Option<i64>,
    ) -> Result<Option<Theme>, StoreError>;

    async fn create_theme(&self, theme: NewTheme) -> Result<Theme, StoreError>;

    async fn set_theme_severity(&self, theme_id: i64, severity: u8) -> Result<(), StoreError>;

    async fn get_theme(&self, theme_id: i64) -> Result<Theme, StoreError>;

    // -- mappings & sentiment -------------------------------------------------

    /// Inserts mappings, skipping documents that no longer exist. Returns the
    /// number inserted.
    async fn insert_mappings(&self, mappings: &[NewMapping]) -> Result<u64, StoreError>;

    async fn theme_post_ids(&self, theme_id: i64) -> Result<Vec<String>, StoreError>;

    /// Latest sentiment per document. Documents without any analysis are
    /// absent from the map.
    async fn latest_sentiments(
        &self,
        post_ids: &[String],
    ) -> Result<HashMap<String, Sentiment>, StoreError>;
}

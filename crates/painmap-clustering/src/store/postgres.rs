use std::collections::HashMap;

use async_trait::async_trait;
use painmap_core::{RunStatus, RunType, Sentiment};
use painmap_db::{ClusteringRunRow, PostRow, ProductAreaRow, ThemeRow};
use sqlx::PgPool;

use super::ClusteringStore;
use crate::error::StoreError;
use crate::severity::DEFAULT_SEVERITY;
use crate::types::{
    ClusteringRun, Document, NewMapping, NewTheme, ProductArea, RunTotals, Theme,
};

/// [`ClusteringStore`] over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn count_to_db(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn count_from_db(n: i32) -> usize {
    usize::try_from(n).unwrap_or(0)
}

fn run_from_row(row: ClusteringRunRow) -> Result<ClusteringRun, StoreError> {
    let run_type = row
        .run_type
        .parse::<RunType>()
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    let status = row
        .status
        .parse::<RunStatus>()
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(ClusteringRun {
        id: row.id,
        public_id: row.public_id,
        run_type,
        status,
        started_at: row.started_at,
        completed_at: row.completed_at,
        posts_processed: count_from_db(row.posts_processed),
        themes_created: count_from_db(row.themes_created),
        themes_updated: count_from_db(row.themes_updated),
        error_message: row.error_message,
    })
}

fn theme_from_row(row: ThemeRow) -> Theme {
    Theme {
        id: row.id,
        name: row.name,
        description: row.description,
        severity: u8::try_from(row.severity).unwrap_or(DEFAULT_SEVERITY),
        product_area_id: row.product_area_id,
        is_active: row.is_active,
        clustering_run_id: row.clustering_run_id,
    }
}

fn document_from_row(row: PostRow) -> Document {
    Document {
        id: row.id,
        title: row.title,
        body: row.body,
    }
}

fn area_from_row(row: ProductAreaRow) -> ProductArea {
    ProductArea {
        id: row.id,
        name: row.name,
        description: row.description,
    }
}

#[async_trait]
impl ClusteringStore for PgStore {
    async fn create_pending_run(&self, run_type: RunType) -> Result<ClusteringRun, StoreError> {
        let row = painmap_db::create_clustering_run(&self.pool, run_type).await?;
        run_from_row(row)
    }

    async fn has_blocking_run(&self, run_id: i64) -> Result<bool, StoreError> {
        Ok(painmap_db::count_blocking_runs(&self.pool, run_id).await? > 0)
    }

    async fn delete_run(&self, run_id: i64) -> Result<(), StoreError> {
        Ok(painmap_db::delete_clustering_run(&self.pool, run_id).await?)
    }

    async fn promote_run(&self, run_id: i64) -> Result<(), StoreError> {
        Ok(painmap_db::start_clustering_run(&self.pool, run_id).await?)
    }

    async fn get_run(&self, run_id: i64) -> Result<ClusteringRun, StoreError> {
        run_from_row(painmap_db::get_clustering_run(&self.pool, run_id).await?)
    }

    async fn record_progress(
        &self,
        run_id: i64,
        posts_processed: usize,
    ) -> Result<(), StoreError> {
        Ok(
            painmap_db::record_clustering_progress(
                &self.pool,
                run_id,
                count_to_db(posts_processed),
            )
            .await?,
        )
    }

    async fn complete_run(&self, run_id: i64, totals: RunTotals) -> Result<(), StoreError> {
        let totals = painmap_db::RunTotals {
            posts_processed: count_to_db(totals.posts_processed),
            themes_created: count_to_db(totals.themes_created),
            themes_updated: count_to_db(totals.themes_updated),
        };
        Ok(painmap_db::complete_clustering_run(&self.pool, run_id, totals).await?)
    }

    async fn fail_run(&self, run_id: i64, error_message: &str) -> Result<(), StoreError> {
        Ok(painmap_db::fail_clustering_run(&self.pool, run_id, error_message).await?)
    }

    async fn cancel_active_runs(&self, error_message: &str) -> Result<u64, StoreError> {
        Ok(painmap_db::cancel_active_clustering_runs(&self.pool, error_message).await?)
    }

    async fn latest_run(&self) -> Result<Option<ClusteringRun>, StoreError> {
        painmap_db::latest_clustering_run(&self.pool)
            .await?
            .map(run_from_row)
            .transpose()
    }

    async fn list_posts_newest_first(&self) -> Result<Vec<Document>, StoreError> {
        let rows = painmap_db::list_posts_newest_first(&self.pool).await?;
        Ok(rows.into_iter().map(document_from_row).collect())
    }

    async fn list_unmapped_posts(&self) -> Result<Vec<Document>, StoreError> {
        let rows = painmap_db::list_unmapped_posts(&self.pool).await?;
        Ok(rows.into_iter().map(document_from_row).collect())
    }

    async fn post_exists(&self, post_id: &str) -> Result<bool, StoreError> {
        Ok(painmap_db::post_exists(&self.pool, post_id).await?)
    }

    async fn list_active_product_areas(&self) -> Result<Vec<ProductArea>, StoreError> {
        let rows = painmap_db::list_active_product_areas(&self.pool).await?;
        Ok(rows.into_iter().map(area_from_row).collect())
    }

    async fn deactivate_all_themes(&self) -> Result<u64, StoreError> {
        Ok(painmap_db::deactivate_all_themes(&self.pool).await?)
    }

    async fn clear_all_mappings(&self) -> Result<u64, StoreError> {
        Ok(painmap_db::clear_all_mappings(&self.pool).await?)
    }

    async fn list_active_themes(&self) -> Result<Vec<Theme>, StoreError> {
        let rows = painmap_db::list_active_themes(&self.pool).await?;
        Ok(rows.into_iter().map(theme_from_row).collect())
    }

    async fn find_active_theme_by_name(
        &self,
        name: &str,
        product_area_id: Option<i64>,
    ) -> Result<Option<Theme>, StoreError> {
        let row = painmap_db::find_active_theme_by_name(&self.pool, name, product_area_id).await?;
        Ok(row.map(theme_from_row))
    }

    async fn create_theme(&self, theme: NewTheme) -> Result<Theme, StoreError> {
        let new = painmap_db::NewTheme {
            name: theme.name,
            description: theme.description,
            product_area_id: theme.product_area_id,
            severity: i16::from(theme.severity),
            clustering_run_id: theme.clustering_run_id,
        };
        Ok(theme_from_row(painmap_db::create_theme(&self.pool, &new).await?))
    }

    async fn set_theme_severity(&self, theme_id: i64, severity: u8) -> Result<(), StoreError> {
        Ok(painmap_db::set_theme_severity(&self.pool, theme_id, i16::from(severity)).await?)
    }

    async fn get_theme(&self, theme_id: i64) -> Result<Theme, StoreError> {
        Ok(theme_from_row(painmap_db::get_theme(&self.pool, theme_id).await?))
    }

    async fn insert_mappings(&self, mappings: &[NewMapping]) -> Result<u64, StoreError> {
        let rows: Vec<painmap_db::NewMapping> = mappings
            .iter()
            .map(|m| painmap_db::NewMapping {
                post_id: m.post_id.clone(),
                theme_id: m.theme_id,
                confidence: m.confidence,
            })
            .collect();
        Ok(painmap_db::insert_mappings(&self.pool, &rows).await?)
    }

    async fn theme_post_ids(&self, theme_id: i64) -> Result<Vec<String>, StoreError> {
        Ok(painmap_db::theme_post_ids(&self.pool, theme_id).await?)
    }

    async fn latest_sentiments(
        &self,
        post_ids: &[String],
    ) -> Result<HashMap<String, Sentiment>, StoreError> {
        let rows = painmap_db::latest_sentiments(&self.pool, post_ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let sentiment = Sentiment::from_label(Some(row.sentiment.as_str()));
                (row.post_id, sentiment)
            })
            .collect())
    }
}

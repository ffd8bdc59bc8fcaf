//! Database operations for `clustering_runs`.
//!
//! Status transitions are guarded in SQL: every update names the state it
//! expects to leave, and zero affected rows is reported as
//! [`DbError::InvalidClusteringRunTransition`].

use chrono::{DateTime, Utc};
use painmap_core::RunType;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const RUN_COLUMNS: &str = "id, public_id, run_type, status, started_at, completed_at, \
                           posts_processed, themes_created, themes_updated, error_message";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `clustering_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClusteringRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub run_type: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub posts_processed: i32,
    pub themes_created: i32,
    pub themes_updated: i32,
    pub error_message: Option<String>,
}

/// Final counters written when a run completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub posts_processed: i32,
    pub themes_created: i32,
    pub themes_updated: i32,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Inserts a new run in `pending` status and returns the full row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_clustering_run(
    pool: &PgPool,
    run_type: RunType,
) -> Result<ClusteringRunRow, DbError> {
    let row = sqlx::query_as::<_, ClusteringRunRow>(&format!(
        "INSERT INTO clustering_runs (public_id, run_type, status) \
         VALUES ($1, $2, 'pending') \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(run_type.as_str())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Counts runs that prevent run `id` from being promoted: any other run that
/// is `running`, and any `pending` run inserted before it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_blocking_runs(pool: &PgPool, id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM clustering_runs \
         WHERE id <> $1 \
           AND (status = 'running' OR (status = 'pending' AND id < $1))",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Removes a run row. Used to withdraw a `pending` run that lost the
/// single-flight check.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no `pending` row has this `id`, or
/// [`DbError::Sqlx`] if the delete fails.
pub async fn delete_clustering_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM clustering_runs WHERE id = $1 AND status = 'pending'")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Promotes a run from `pending` to `running` and resets `started_at`.
///
/// # Errors
///
/// Returns [`DbError::ActiveRunConflict`] if another run is already
/// `running`, [`DbError::InvalidClusteringRunTransition`] if the row is not
/// `pending`, or [`DbError::Sqlx`] if the update fails.
pub async fn start_clustering_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE clustering_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await
    .map_err(DbError::from_run_write)?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidClusteringRunTransition {
            id,
            expected_status: "pending",
        });
    }

    Ok(())
}

/// Checkpoints the number of documents processed so far.
///
/// The counter only moves forward; a smaller value leaves it unchanged.
///
/// # Errors
///
/// Returns [`DbError::InvalidClusteringRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn record_clustering_progress(
    pool: &PgPool,
    id: i64,
    posts_processed: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE clustering_runs \
         SET posts_processed = GREATEST(posts_processed, $1) \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(posts_processed)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidClusteringRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run `completed` with its final counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidClusteringRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_clustering_run(
    pool: &PgPool,
    id: i64,
    totals: RunTotals,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE clustering_runs \
         SET status = 'completed', completed_at = NOW(), \
             posts_processed = GREATEST(posts_processed, $1), \
             themes_created = $2, themes_updated = $3 \
         WHERE id = $4 AND status = 'running'",
    )
    .bind(totals.posts_processed)
    .bind(totals.themes_created)
    .bind(totals.themes_updated)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidClusteringRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run `failed`, sets `completed_at = NOW()` and `error_message`.
///
/// # Errors
///
/// Returns [`DbError::InvalidClusteringRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_clustering_run(
    pool: &PgPool,
    id: i64,
    error_message: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE clustering_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidClusteringRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Force-fails every `pending` or `running` run. Returns the number of rows
/// changed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn cancel_active_clustering_runs(
    pool: &PgPool,
    error_message: &str,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE clustering_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE status IN ('pending', 'running')",
    )
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_clustering_run(pool: &PgPool, id: i64) -> Result<ClusteringRunRow, DbError> {
    let row = sqlx::query_as::<_, ClusteringRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM clustering_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns the most recently started run, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_clustering_run(pool: &PgPool) -> Result<Option<ClusteringRunRow>, DbError> {
    let row = sqlx::query_as::<_, ClusteringRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM clustering_runs \
         ORDER BY started_at DESC, id DESC \
         LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

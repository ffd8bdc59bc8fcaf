//! Database operations for `pain_themes`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

const THEME_COLUMNS: &str = "id, name, description, severity, product_area_id, is_active, \
                             clustering_run_id, created_at, updated_at";

/// A row from the `pain_themes` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ThemeRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub severity: i16,
    pub product_area_id: Option<i64>,
    pub is_active: bool,
    pub clustering_run_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for a theme about to be inserted.
#[derive(Debug, Clone)]
pub struct NewTheme {
    pub name: String,
    pub description: Option<String>,
    pub product_area_id: Option<i64>,
    pub severity: i16,
    pub clustering_run_id: Option<i64>,
}

/// Soft-deletes every active theme. Returns the number of rows changed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn deactivate_all_themes(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE pain_themes SET is_active = FALSE, updated_at = NOW() WHERE is_active = TRUE",
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Returns all active themes in creation order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_themes(pool: &PgPool) -> Result<Vec<ThemeRow>, DbError> {
    let rows = sqlx::query_as::<_, ThemeRow>(&format!(
        "SELECT {THEME_COLUMNS} FROM pain_themes WHERE is_active = TRUE ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Looks up an active theme by exact name within a product area (`None`
/// matches themes with no area).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_active_theme_by_name(
    pool: &PgPool,
    name: &str,
    product_area_id: Option<i64>,
) -> Result<Option<ThemeRow>, DbError> {
    let row = sqlx::query_as::<_, ThemeRow>(&format!(
        "SELECT {THEME_COLUMNS} FROM pain_themes \
         WHERE is_active = TRUE AND name = $1 \
           AND product_area_id IS NOT DISTINCT FROM $2 \
         ORDER BY id \
         LIMIT 1"
    ))
    .bind(name)
    .bind(product_area_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Inserts an active theme and returns the stored row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_theme(pool: &PgPool, theme: &NewTheme) -> Result<ThemeRow, DbError> {
    let row = sqlx::query_as::<_, ThemeRow>(&format!(
        "INSERT INTO pain_themes \
             (name, description, severity, product_area_id, is_active, clustering_run_id) \
         VALUES ($1, $2, $3, $4, TRUE, $5) \
         RETURNING {THEME_COLUMNS}"
    ))
    .bind(&theme.name)
    .bind(theme.description.as_deref())
    .bind(theme.severity)
    .bind(theme.product_area_id)
    .bind(theme.clustering_run_id)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Writes a recomputed severity.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no theme has this `id`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_theme_severity(pool: &PgPool, id: i64, severity: i16) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE pain_themes SET severity = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(severity)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Fetches a theme by `id`, active or not.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_theme(pool: &PgPool, id: i64) -> Result<ThemeRow, DbError> {
    let row = sqlx::query_as::<_, ThemeRow>(&format!(
        "SELECT {THEME_COLUMNS} FROM pain_themes WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

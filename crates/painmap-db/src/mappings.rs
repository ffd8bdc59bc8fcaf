//! Database operations for `post_theme_mappings`.

use sqlx::PgPool;

use crate::DbError;

/// One document-to-theme edge to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMapping {
    pub post_id: String,
    pub theme_id: i64,
    pub confidence: f64,
}

/// Bulk-inserts mappings in a single statement. Rows whose `post_id` no
/// longer exists in `posts` are skipped. Returns the number inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_mappings(pool: &PgPool, mappings: &[NewMapping]) -> Result<u64, DbError> {
    if mappings.is_empty() {
        return Ok(0);
    }

    let post_ids: Vec<String> = mappings.iter().map(|m| m.post_id.clone()).collect();
    let theme_ids: Vec<i64> = mappings.iter().map(|m| m.theme_id).collect();
    let confidences: Vec<f64> = mappings.iter().map(|m| m.confidence).collect();

    let result = sqlx::query(
        "INSERT INTO post_theme_mappings (post_id, theme_id, confidence) \
         SELECT m.post_id, m.theme_id, m.confidence \
         FROM UNNEST($1::text[], $2::bigint[], $3::float8[]) AS m(post_id, theme_id, confidence) \
         JOIN posts p ON p.id = m.post_id",
    )
    .bind(&post_ids)
    .bind(&theme_ids)
    .bind(&confidences)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Deletes every mapping. Returns the number of rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn clear_all_mappings(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM post_theme_mappings")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Returns the IDs of every document mapped to a theme.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn theme_post_ids(pool: &PgPool, theme_id: i64) -> Result<Vec<String>, DbError> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT post_id FROM post_theme_mappings WHERE theme_id = $1 ORDER BY post_id",
    )
    .bind(theme_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

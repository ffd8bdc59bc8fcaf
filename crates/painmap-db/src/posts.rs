//! Read-only queries over `posts`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// The subset of a `posts` row the clustering pipeline reads.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Returns every document, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_posts_newest_first(pool: &PgPool) -> Result<Vec<PostRow>, DbError> {
    let rows = sqlx::query_as::<_, PostRow>(
        "SELECT id, title, body, created_utc FROM posts ORDER BY created_utc DESC, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns documents with no theme mapping, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_unmapped_posts(pool: &PgPool) -> Result<Vec<PostRow>, DbError> {
    let rows = sqlx::query_as::<_, PostRow>(
        "SELECT p.id, p.title, p.body, p.created_utc \
         FROM posts p \
         WHERE NOT EXISTS ( \
             SELECT 1 FROM post_theme_mappings m WHERE m.post_id = p.id \
         ) \
         ORDER BY p.created_utc DESC, p.id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn post_exists(pool: &PgPool, id: &str) -> Result<bool, DbError> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await?;

    Ok(exists)
}

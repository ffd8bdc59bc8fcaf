//! Read-only sentiment lookups over `analyses`.

use sqlx::PgPool;

use crate::DbError;

/// Most recent sentiment label recorded for a document.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LatestSentimentRow {
    pub post_id: String,
    pub sentiment: String,
}

/// For each of `post_ids` that has at least one analysis, returns the label
/// of the analysis with the highest `id`. Documents without analyses are
/// absent from the result.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_sentiments(
    pool: &PgPool,
    post_ids: &[String],
) -> Result<Vec<LatestSentimentRow>, DbError> {
    if post_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, LatestSentimentRow>(
        "SELECT DISTINCT ON (post_id) post_id, sentiment \
         FROM analyses \
         WHERE post_id = ANY($1) \
         ORDER BY post_id, id DESC",
    )
    .bind(post_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

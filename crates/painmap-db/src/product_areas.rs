//! Read-only queries over the `product_areas` taxonomy.

use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductAreaRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub display_order: i32,
}

/// Returns active product areas in display order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_product_areas(pool: &PgPool) -> Result<Vec<ProductAreaRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductAreaRow>(
        "SELECT id, name, description, display_order \
         FROM product_areas \
         WHERE is_active = TRUE \
         ORDER BY display_order, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

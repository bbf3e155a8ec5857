use sqlx::PgPool;

use crate::error::AppResult;

/// `silver.users` / `silver.departments` / `silver.computers` are rebuilt by
/// incremental upsert, never truncated — each consolidator module owns its
/// own typed upsert query (the column sets differ too much per entity to
/// share one generic function). This file holds the bits genuinely shared
/// across all three.

pub async fn existing_entity_hash(
    pool: &PgPool,
    table: &str,
    key_column: &str,
    key: &str,
) -> AppResult<Option<String>> {
    let sql = format!("SELECT entity_hash FROM silver.{table} WHERE {key_column} = $1");
    let hash: Option<String> = sqlx::query_scalar(&sql).bind(key).fetch_optional(pool).await?;
    Ok(hash)
}

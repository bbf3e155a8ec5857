use std::collections::HashMap;

use sqlx::PgPool;

use crate::error::AppResult;

#[derive(Debug, Default, Clone, Copy)]
pub struct UpsertCounts {
    pub upserted: i64,
    pub skipped_unchanged: i64,
}

/// Existing `entity_hash` values for a Silver-source table, keyed by its
/// natural key column. `table` and `key_column` come from each projector's
/// `const TABLE` / `const KEY_COLUMN` — a closed, compile-time-selected set,
/// never user input, so building the query text with `format!` is safe here.
pub async fn existing_hashes(
    pool: &PgPool,
    table: &str,
    key_column: &str,
    keys: &[String],
) -> AppResult<HashMap<String, String>> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!(
        "SELECT {key_column}, entity_hash FROM silver.{table} WHERE {key_column} = ANY($1)"
    );
    let rows: Vec<(String, String)> = sqlx::query_as(&sql).bind(keys).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

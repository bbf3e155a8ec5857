use sqlx::{PgPool, Postgres, Transaction};

use crate::error::AppResult;

/// Link tables are rebuilt by `TRUNCATE` + chunked `INSERT` on every run —
/// they are fully derivable from current consolidated state, so there is no
/// incremental upsert to get wrong. Chunk size is the caller's choice
/// (`relationship_extractor` uses ~5000, `lab_computer_associator` a few
/// hundred to a few thousand depending on fleet size).
pub async fn truncate(tx: &mut Transaction<'_, Postgres>, table: &str) -> AppResult<()> {
    let sql = format!("TRUNCATE TABLE silver.{table}");
    sqlx::query(&sql).execute(&mut **tx).await?;
    Ok(())
}

pub async fn begin_rebuild(pool: &PgPool) -> AppResult<Transaction<'_, Postgres>> {
    Ok(pool.begin().await?)
}

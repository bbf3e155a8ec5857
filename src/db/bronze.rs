use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BronzeRow {
    pub raw_id: i64,
    pub entity_type: String,
    pub source_system: String,
    pub external_id: String,
    pub raw_data: Value,
    pub ingested_at: DateTime<Utc>,
    pub ingestion_run_id: Uuid,
    pub ingestion_metadata: Value,
}

pub struct NewBronzeRow<'a> {
    pub entity_type: &'a str,
    pub source_system: &'a str,
    pub external_id: &'a str,
    pub raw_data: Value,
    pub ingestion_run_id: Uuid,
    pub ingestion_metadata: Value,
}

pub async fn insert_row(pool: &PgPool, row: NewBronzeRow<'_>) -> AppResult<BronzeRow> {
    let record = sqlx::query_as::<_, BronzeRow>(
        "INSERT INTO bronze.raw_entities \
         (entity_type, source_system, external_id, raw_data, ingested_at, ingestion_run_id, ingestion_metadata) \
         VALUES ($1, $2, $3, $4, NOW(), $5, $6) \
         RETURNING raw_id, entity_type, source_system, external_id, raw_data, ingested_at, ingestion_run_id, ingestion_metadata",
    )
    .bind(row.entity_type)
    .bind(row.source_system)
    .bind(row.external_id)
    .bind(row.raw_data)
    .bind(row.ingestion_run_id)
    .bind(row.ingestion_metadata)
    .fetch_one(pool)
    .await?;
    Ok(record)
}

/// The most recent `_content_hash_basic` per `external_id`, via
/// `DISTINCT ON (external_id) ... ORDER BY external_id, ingested_at DESC`.
pub async fn latest_hashes(
    pool: &PgPool,
    entity_type: &str,
    source_system: &str,
) -> AppResult<HashMap<String, Option<String>>> {
    let rows: Vec<(String, Option<String>)> = sqlx::query_as(
        "SELECT DISTINCT ON (external_id) \
             external_id, raw_data->>'_content_hash_basic' AS content_hash_basic \
         FROM bronze.raw_entities \
         WHERE entity_type = $1 AND source_system = $2 \
         ORDER BY external_id, ingested_at DESC",
    )
    .bind(entity_type)
    .bind(source_system)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

/// Bronze rows for `entity_type` lacking `_content_hash_enriched`, optionally
/// scoped to rows ingested after `since`.
pub async fn rows_needing_enrichment(
    pool: &PgPool,
    entity_type: &str,
    source_system: &str,
    since: Option<DateTime<Utc>>,
) -> AppResult<Vec<BronzeRow>> {
    let rows = sqlx::query_as::<_, BronzeRow>(
        "SELECT raw_id, entity_type, source_system, external_id, raw_data, ingested_at, ingestion_run_id, ingestion_metadata \
         FROM bronze.raw_entities \
         WHERE entity_type = $1 AND source_system = $2 \
           AND raw_data->>'_content_hash_enriched' IS NULL \
           AND ($3::TIMESTAMPTZ IS NULL OR ingested_at > $3) \
         ORDER BY external_id, ingested_at DESC",
    )
    .bind(entity_type)
    .bind(source_system)
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// The sole legal in-place Bronze mutation: overwrites `raw_data` for an
/// existing row by `raw_id`. Always call inside a transaction opened by the
/// caller so the enrichment is atomic per row.
pub async fn update_enriched<'c, E>(executor: E, raw_id: i64, raw_data: Value) -> AppResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query("UPDATE bronze.raw_entities SET raw_data = $2 WHERE raw_id = $1")
        .bind(raw_id)
        .bind(raw_data)
        .execute(executor)
        .await?;
    Ok(())
}

/// Batch-fetch the latest Bronze row per `external_id` in `ids` using a
/// single windowed query (`ROW_NUMBER() OVER (PARTITION BY external_id
/// ORDER BY ingested_at DESC)`). Callers chunk `ids` to ~1000 per call.
pub async fn batch_latest_by_external_id(
    pool: &PgPool,
    entity_type: &str,
    source_system: &str,
    ids: &[String],
) -> AppResult<HashMap<String, BronzeRow>> {
    let rows = sqlx::query_as::<_, BronzeRow>(
        "SELECT raw_id, entity_type, source_system, external_id, raw_data, ingested_at, ingestion_run_id, ingestion_metadata FROM ( \
             SELECT *, ROW_NUMBER() OVER (PARTITION BY external_id ORDER BY ingested_at DESC) AS rn \
             FROM bronze.raw_entities \
             WHERE entity_type = $1 AND source_system = $2 AND external_id = ANY($3) \
         ) ranked WHERE rn = 1",
    )
    .bind(entity_type)
    .bind(source_system)
    .bind(ids)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| (r.external_id.clone(), r)).collect())
}

/// Distinct `external_id`s for `(entity_type, source_system)` ingested after
/// `since` (or all, when `since` is `None`) — drives a transform's scope.
pub async fn external_ids_in_scope(
    pool: &PgPool,
    entity_type: &str,
    source_system: &str,
    since: Option<DateTime<Utc>>,
) -> AppResult<Vec<String>> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT external_id FROM bronze.raw_entities \
         WHERE entity_type = $1 AND source_system = $2 \
           AND ($3::TIMESTAMPTZ IS NULL OR ingested_at > $3)",
    )
    .bind(entity_type)
    .bind(source_system)
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

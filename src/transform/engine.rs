//! Generic Silver-source transform engine. One
//! instantiation per (source, entity) job binary, parameterized over a
//! [`Projector`].

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use crate::db::bronze;
use crate::db::silver_source::{self, UpsertCounts};
use crate::error::AppResult;
use crate::hashing;
use crate::run_ledger::{self, RunCounts};

const CHUNK_SIZE: usize = 1000;

#[derive(Debug, Default, Clone)]
pub struct TransformStats {
    pub processed: i64,
    pub upserted: i64,
    pub skipped_unchanged: i64,
    pub errors: Vec<String>,
}

/// One implementation per (source, entity) Silver-source table. `project`
/// turns a Bronze row's raw JSON into a typed row ready for upsert;
/// `entity_hash` excludes this row type's metadata columns.
#[async_trait]
pub trait Projector: Send + Sync {
    type Row: Send + Sync + Clone;

    const TABLE: &'static str;
    const KEY_COLUMN: &'static str;
    const ENTITY_TYPE: &'static str;
    const SOURCE_SYSTEM: &'static str;

    fn project(&self, bronze_raw: &Value) -> AppResult<Self::Row>;
    fn entity_hash(&self, row: &Self::Row) -> String;
    fn key_of(&self, row: &Self::Row) -> String;

    async fn upsert_batch(&self, pool: &PgPool, rows: &[Self::Row]) -> AppResult<UpsertCounts>;
}

pub async fn transform<P: Projector>(
    pool: &PgPool,
    projector: &P,
    full_sync: bool,
    dry_run: bool,
) -> AppResult<TransformStats> {
    let mut stats = TransformStats::default();

    let run_id = if dry_run {
        uuid::Uuid::nil()
    } else {
        run_ledger::begin(
            pool,
            P::SOURCE_SYSTEM,
            P::ENTITY_TYPE,
            serde_json::json!({"phase": "transform", "full_sync": full_sync}),
        )
        .await?
    };

    let since = if full_sync {
        None
    } else {
        run_ledger::last_successful_completion(pool, P::SOURCE_SYSTEM, P::ENTITY_TYPE).await?
    };

    let ids = bronze::external_ids_in_scope(pool, P::ENTITY_TYPE, P::SOURCE_SYSTEM, since).await?;

    for chunk in ids.chunks(CHUNK_SIZE) {
        let latest = bronze::batch_latest_by_external_id(
            pool,
            P::ENTITY_TYPE,
            P::SOURCE_SYSTEM,
            chunk,
        )
        .await?;

        let mut projected = Vec::with_capacity(latest.len());
        for (external_id, bronze_row) in &latest {
            stats.processed += 1;
            match projector.project(&bronze_row.raw_data) {
                Ok(row) => projected.push(row),
                Err(err) => stats.errors.push(format!("{external_id}: {err}")),
            }
        }

        let keys: Vec<String> = projected.iter().map(|r| projector.key_of(r)).collect();
        let existing_hashes = if dry_run {
            Default::default()
        } else {
            silver_source::existing_hashes(pool, P::TABLE, P::KEY_COLUMN, &keys).await?
        };

        let mut to_upsert = Vec::with_capacity(projected.len());
        for row in projected {
            let key = projector.key_of(&row);
            let hash = projector.entity_hash(&row);
            if existing_hashes.get(&key) == Some(&hash) {
                stats.skipped_unchanged += 1;
                continue;
            }
            to_upsert.push(row);
        }

        if !to_upsert.is_empty() && !dry_run {
            let counts = projector.upsert_batch(pool, &to_upsert).await?;
            stats.upserted += counts.upserted;
            stats.skipped_unchanged += counts.skipped_unchanged;
        } else {
            stats.upserted += to_upsert.len() as i64;
        }
    }

    if !dry_run {
        let error_message = if stats.errors.is_empty() {
            None
        } else {
            Some(format!("{} record(s) failed projection", stats.errors.len()))
        };
        run_ledger::complete(
            pool,
            run_id,
            RunCounts {
                processed: stats.processed,
                created: stats.upserted,
                updated: 0,
            },
            error_message.as_deref(),
        )
        .await?;
    }

    Ok(stats)
}

pub fn entity_hash_excluding_metadata<T: serde::Serialize>(row: &T) -> String {
    hashing::entity_hash(row, &["raw_id", "entity_hash", "ingestion_run_id", "updated_at", "created_at"])
}

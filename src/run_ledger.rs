//! `meta.ingestion_runs` — authoritative record of every job invocation.
//! The stale-run sweep and the new run's insert happen in one transaction
//! so two near-simultaneous starts never both observe "no running row".

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    fn from_str(value: &str) -> Self {
        match value {
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Running,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestionRun {
    pub run_id: Uuid,
    pub source_system: String,
    pub entity_type: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub records_processed: i64,
    pub records_created: i64,
    pub records_updated: i64,
    pub error_message: Option<String>,
    pub metadata: Value,
}

impl IngestionRun {
    pub fn status(&self) -> RunStatus {
        RunStatus::from_str(&self.status)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunCounts {
    pub processed: i64,
    pub created: i64,
    pub updated: i64,
}

/// Marks any prior `running` row for `(source, entity)` as stale/failed,
/// then inserts a new `running` row, all in one transaction. Returns the
/// new run's id. The stale row's id, if any, is recorded in the new run's
/// metadata under `predecessor_run_id` for traceability.
pub async fn begin(
    pool: &PgPool,
    source_system: &str,
    entity_type: &str,
    metadata: Value,
) -> AppResult<Uuid> {
    let mut tx = pool.begin().await?;

    let stale_run_id: Option<Uuid> = sqlx::query_scalar(
        "SELECT run_id FROM meta.ingestion_runs \
         WHERE source_system = $1 AND entity_type = $2 AND status = 'running' \
         FOR UPDATE",
    )
    .bind(source_system)
    .bind(entity_type)
    .fetch_optional(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE meta.ingestion_runs \
         SET status = 'failed', error_message = 'stale — process terminated', completed_at = NOW() \
         WHERE source_system = $1 AND entity_type = $2 AND status = 'running'",
    )
    .bind(source_system)
    .bind(entity_type)
    .execute(&mut *tx)
    .await?;

    let mut metadata = metadata;
    if let (Some(stale_run_id), Value::Object(map)) = (stale_run_id, &mut metadata) {
        map.insert("predecessor_run_id".to_string(), json!(stale_run_id));
    }

    let run_id: Uuid = sqlx::query_scalar(
        "INSERT INTO meta.ingestion_runs \
         (run_id, source_system, entity_type, started_at, status, metadata) \
         VALUES ($1, $2, $3, NOW(), 'running', $4) \
         RETURNING run_id",
    )
    .bind(Uuid::new_v4())
    .bind(source_system)
    .bind(entity_type)
    .bind(metadata)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(run_id)
}

/// Completes a run. `error_message` non-empty marks the run `failed`,
/// otherwise `completed`. Ledger writes are best-effort: callers should log
/// and swallow the error rather than let it unwind prior committed work —
/// see [`complete_best_effort`].
pub async fn complete(
    pool: &PgPool,
    run_id: Uuid,
    counts: RunCounts,
    error_message: Option<&str>,
) -> AppResult<()> {
    let status = if error_message.is_some() {
        "failed"
    } else {
        "completed"
    };
    sqlx::query(
        "UPDATE meta.ingestion_runs \
         SET completed_at = NOW(), status = $2, records_processed = $3, \
             records_created = $4, records_updated = $5, error_message = $6 \
         WHERE run_id = $1",
    )
    .bind(run_id)
    .bind(status)
    .bind(counts.processed)
    .bind(counts.created)
    .bind(counts.updated)
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fire-and-forget variant of [`complete`]: a failed ledger write is logged
/// and otherwise ignored, since it must never roll back work already
/// committed to Bronze/Silver.
pub async fn complete_best_effort(
    pool: &PgPool,
    run_id: Uuid,
    counts: RunCounts,
    error_message: Option<&str>,
) {
    if let Err(err) = complete(pool, run_id, counts, error_message).await {
        tracing::warn!(?err, %run_id, "failed to write run-ledger completion");
    }
}

/// `MAX(completed_at)` among successful prior runs — the incremental
/// watermark for this `(source, entity)`.
pub async fn last_successful_completion(
    pool: &PgPool,
    source_system: &str,
    entity_type: &str,
) -> AppResult<Option<DateTime<Utc>>> {
    let ts: Option<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT MAX(completed_at) FROM meta.ingestion_runs \
         WHERE source_system = $1 AND entity_type = $2 AND status = 'completed'",
    )
    .bind(source_system)
    .bind(entity_type)
    .fetch_one(pool)
    .await?;
    Ok(ts)
}

/// Read-only status report for `--show-status`.
pub async fn show_status(
    pool: &PgPool,
    source_system: Option<&str>,
    entity_type: Option<&str>,
) -> AppResult<Vec<IngestionRun>> {
    let rows = sqlx::query_as::<_, IngestionRun>(
        "SELECT run_id, source_system, entity_type, started_at, completed_at, status, \
                records_processed, records_created, records_updated, error_message, metadata \
         FROM meta.ingestion_runs \
         WHERE ($1::TEXT IS NULL OR source_system = $1) \
           AND ($2::TEXT IS NULL OR entity_type = $2) \
         ORDER BY started_at DESC \
         LIMIT 50",
    )
    .bind(source_system)
    .bind(entity_type)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Read-only report for `--show-recent-changes DAYS`.
pub async fn recent_changes(pool: &PgPool, days: i64) -> AppResult<Vec<IngestionRun>> {
    let rows = sqlx::query_as::<_, IngestionRun>(
        "SELECT run_id, source_system, entity_type, started_at, completed_at, status, \
                records_processed, records_created, records_updated, error_message, metadata \
         FROM meta.ingestion_runs \
         WHERE started_at > NOW() - ($1 || ' days')::INTERVAL \
         ORDER BY started_at DESC",
    )
    .bind(days.to_string())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

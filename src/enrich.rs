//! Generic Bronze enrichment engine. Fetches per-record detail for
//! rows lacking an enriched hash and performs the sole legal in-place
//! Bronze mutation, transactionally, one row at a time.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;

use crate::db::bronze::{self, BronzeRow};
use crate::error::{is_retryable, AppError, AppResult};
use crate::hashing;
use crate::run_ledger::{self, RunCounts};
use crate::sources::DetailClient;

#[derive(Debug, Default, Clone)]
pub struct EnrichStats {
    pub processed: i64,
    pub enriched: i64,
    pub errors: Vec<String>,
}

/// `basic_fields`/`detail_fields` extract the same whitelisted subsets the
/// ingester uses, so `enriched_content_hash` stays consistent with
/// `basic_content_hash` by construction.
pub async fn enrich<C: DetailClient>(
    pool: &PgPool,
    client: &C,
    entity_type: &str,
    source_system: &str,
    basic_fields: fn(&Value) -> BTreeMap<&'static str, Value>,
    detail_fields: fn(&Value) -> BTreeMap<&'static str, Value>,
    max_workers: usize,
    api_delay: Option<Duration>,
    dry_run: bool,
) -> AppResult<EnrichStats> {
    let run_id = if dry_run {
        uuid::Uuid::nil()
    } else {
        run_ledger::begin(pool, source_system, entity_type, json!({"phase": "enrich"})).await?
    };

    let rows = bronze::rows_needing_enrichment(pool, entity_type, source_system, None).await?;
    let worker_count = if api_delay.is_some() { 1 } else { max_workers.max(1) };

    let stats = Mutex::new(EnrichStats::default());

    stream::iter(rows)
        .for_each_concurrent(worker_count, |row| async {
            {
                let mut stats = stats.lock().await;
                stats.processed += 1;
            }

            let result = enrich_one(pool, client, &row, basic_fields, detail_fields, dry_run).await;

            let mut stats = stats.lock().await;
            match result {
                Ok(()) => stats.enriched += 1,
                Err(err) => stats.errors.push(format!("{}: {err}", row.external_id)),
            }
            drop(stats);

            if let Some(delay) = api_delay {
                tokio::time::sleep(delay).await;
            }
        })
        .await;

    let stats = stats.into_inner();

    if !dry_run {
        let error_message = if stats.errors.is_empty() {
            None
        } else {
            Some(format!("{} record(s) failed enrichment", stats.errors.len()))
        };
        run_ledger::complete(
            pool,
            run_id,
            RunCounts {
                processed: stats.processed,
                created: 0,
                updated: stats.enriched,
            },
            error_message.as_deref(),
        )
        .await?;
    }

    Ok(stats)
}

async fn enrich_one<C: DetailClient>(
    pool: &PgPool,
    client: &C,
    row: &BronzeRow,
    basic_fields: fn(&Value) -> BTreeMap<&'static str, Value>,
    detail_fields: fn(&Value) -> BTreeMap<&'static str, Value>,
    dry_run: bool,
) -> AppResult<()> {
    let basic = basic_fields(&row.raw_data);
    let recomputed_basic_hash = hashing::hash_fields(&basic);
    if let Some(stored_hash) = row.raw_data.get("_content_hash_basic").and_then(Value::as_str) {
        if stored_hash != recomputed_basic_hash {
            tracing::warn!(
                raw_id = row.raw_id,
                external_id = %row.external_id,
                stored_hash,
                recomputed_hash = %recomputed_basic_hash,
                "basic content hash changed between ingestion and enrichment",
            );
        }
    }

    let retry_strategy = ExponentialBackoff::from_millis(200).take(3);
    let external_id = row.external_id.clone();
    let detail = RetryIf::spawn(
        retry_strategy,
        || client.fetch_detail(&external_id),
        is_retryable,
    )
    .await?;

    let detail_map = detail_fields(&detail);
    let enriched_hash = hashing::hash_enriched(&basic, &detail_map);

    let mut raw_data = row.raw_data.clone();
    let Value::Object(map) = &mut raw_data else {
        return Err(AppError::Message("Bronze raw_data was not a JSON object".into()));
    };
    if let Value::Object(detail_obj) = &detail {
        for (k, v) in detail_obj {
            map.insert(k.clone(), v.clone());
        }
    }
    map.insert("_content_hash_enriched".to_string(), json!(enriched_hash));
    map.insert("_ingestion_method".to_string(), json!("enriched"));
    map.insert("_enrichment_timestamp".to_string(), json!(Utc::now().to_rfc3339()));

    if dry_run {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    bronze::update_enriched(&mut *tx, row.raw_id, raw_data).await?;
    tx.commit().await?;
    Ok(())
}

//! Generic Bronze ingestion engine. One instantiation per (source,
//! entity) job binary, parameterized over a [`sources::SourceClient`] and a
//! whitelisted-field hash function so the "same field set" invariant
//! between ingestion and enrichment holds by construction.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::db::bronze::{self, NewBronzeRow};
use crate::error::AppResult;
use crate::hashing;
use crate::run_ledger::{self, RunCounts};
use crate::sources::SourceClient;

#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    pub processed: i64,
    pub created: i64,
    pub skipped_unchanged: i64,
    pub errors: Vec<String>,
}

/// `basic_fields` extracts the whitelisted field subset hashed for change
/// detection, given the source's raw candidate JSON.
pub async fn ingest<C: SourceClient>(
    pool: &PgPool,
    client: &C,
    entity_type: &str,
    source_system: &str,
    basic_fields: fn(&Value) -> BTreeMap<&'static str, Value>,
    full_sync: bool,
    dry_run: bool,
    stop_on_errors: bool,
) -> AppResult<IngestStats> {
    let mut stats = IngestStats::default();

    let run_id = if dry_run {
        uuid::Uuid::nil()
    } else {
        run_ledger::begin(pool, source_system, entity_type, json!({"full_sync": full_sync})).await?
    };

    let since = if full_sync {
        None
    } else {
        run_ledger::last_successful_completion(pool, source_system, entity_type).await?
    };

    let fetch_result = client.fetch_candidates(since, full_sync).await;
    let candidates = match fetch_result {
        Ok(records) => records,
        Err(err) => {
            if !dry_run {
                run_ledger::complete_best_effort(pool, run_id, RunCounts::default(), Some(&err.to_string()))
                    .await;
            }
            return Err(err);
        }
    };

    let existing = bronze::latest_hashes(pool, entity_type, source_system).await?;

    for candidate in candidates {
        stats.processed += 1;
        let fields = basic_fields(&candidate.data);
        let basic_hash = hashing::hash_fields(&fields);

        if existing.get(&candidate.external_id) == Some(&Some(basic_hash.clone())) {
            stats.skipped_unchanged += 1;
            continue;
        }

        if dry_run {
            stats.created += 1;
            continue;
        }

        let mut raw_data = candidate.data.clone();
        if let Value::Object(map) = &mut raw_data {
            map.insert("_content_hash_basic".to_string(), json!(basic_hash));
            map.insert(
                "_ingestion_method".to_string(),
                json!(if full_sync { "full_sync" } else { "incremental" }),
            );
            map.insert("_ingestion_source".to_string(), json!(source_system));
            map.insert("_ingestion_timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        }

        let insert_result = bronze::insert_row(
            pool,
            NewBronzeRow {
                entity_type,
                source_system,
                external_id: &candidate.external_id,
                raw_data,
                ingestion_run_id: run_id,
                ingestion_metadata: json!({}),
            },
        )
        .await;

        match insert_result {
            Ok(_) => stats.created += 1,
            Err(err) => {
                stats.errors.push(format!("{}: {err}", candidate.external_id));
                if stop_on_errors {
                    run_ledger::complete_best_effort(
                        pool,
                        run_id,
                        RunCounts {
                            processed: stats.processed,
                            created: stats.created,
                            updated: 0,
                        },
                        Some(&err.to_string()),
                    )
                    .await;
                    return Err(err);
                }
            }
        }
    }

    if !dry_run {
        let error_message = if stats.errors.is_empty() {
            None
        } else {
            Some(format!("{} record(s) failed", stats.errors.len()))
        };
        run_ledger::complete(
            pool,
            run_id,
            RunCounts {
                processed: stats.processed,
                created: stats.created,
                updated: 0,
            },
            error_message.as_deref(),
        )
        .await?;
    }

    Ok(stats)
}

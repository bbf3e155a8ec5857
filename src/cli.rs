//! Shared CLI surface for every `src/bin/*.rs` job: one `clap` struct, one
//! set of flags, reused across many thin binaries instead of each parsing
//! its own arguments.

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::{ALLOW_MIGRATION_FAILURE, DATABASE_URL};
use crate::error::AppResult;
use crate::run_ledger;

#[derive(Debug, Parser)]
#[command(about = "Medallion pipeline job runner", version)]
pub struct JobArgs {
    /// Ignore the last successful run's watermark and process everything.
    #[arg(long)]
    pub full_sync: bool,

    /// Run without writing to Bronze/Silver or the run ledger.
    #[arg(long)]
    pub dry_run: bool,

    /// Override the default batch size for windowed reads/upserts.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Seconds to wait between calls to a rate-limited source; forces
    /// single-worker enrichment.
    #[arg(long)]
    pub api_delay: Option<f64>,

    /// Bounded worker-pool size for Bronze enrichment.
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Abort the run on the first record-level error instead of collecting
    /// and continuing.
    #[arg(long)]
    pub stop_on_errors: bool,

    /// Print the recent run history for this (source, entity) and exit.
    #[arg(long)]
    pub show_status: bool,

    /// Print ingestion runs started within the last N days and exit.
    #[arg(long)]
    pub show_recent_changes: Option<i64>,

    /// User consolidation only: drop candidates whose sole source is
    /// MCommunity and whose affiliation OUs name "alumni".
    #[arg(long)]
    pub exclude_alumni: bool,
}

impl JobArgs {
    pub fn worker_count(&self) -> usize {
        if self.api_delay.is_some() {
            return 1;
        }
        self.max_workers.unwrap_or(8)
    }

    pub fn batch_size_or_default(&self, default: usize) -> usize {
        self.batch_size.unwrap_or(default)
    }
}

/// Opens the shared pool every job binary connects through.
pub async fn connect_pool() -> AppResult<PgPool> {
    Ok(PgPoolOptions::new()
        .max_connections(5)
        .connect(DATABASE_URL.as_str())
        .await?)
}

/// Applies `./migrations` against `pool`. A failed run is fatal unless
/// `ALLOW_MIGRATION_FAILURE` is set, for environments where migrations are
/// applied out-of-band ahead of the job.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    if let Err(error) = sqlx::migrate!("./migrations").run(pool).await {
        if *ALLOW_MIGRATION_FAILURE {
            tracing::warn!(?error, "migrations failed but continuing due to ALLOW_MIGRATION_FAILURE");
        } else {
            return Err(error.into());
        }
    }
    Ok(())
}

/// Handles `--show-status`/`--show-recent-changes` if either was passed.
/// Returns `true` when one was handled, in which case the caller should
/// print nothing further and exit 0 without running the job itself.
pub async fn maybe_show_reports(
    args: &JobArgs,
    pool: &PgPool,
    source_system: &str,
    entity_type: &str,
) -> AppResult<bool> {
    if args.show_status {
        let runs = run_ledger::show_status(pool, Some(source_system), Some(entity_type)).await?;
        for run in runs {
            println!(
                "{} {} {} status={} processed={} created={} updated={} started={}",
                run.run_id,
                run.source_system,
                run.entity_type,
                run.status,
                run.records_processed,
                run.records_created,
                run.records_updated,
                run.started_at,
            );
        }
        return Ok(true);
    }

    if let Some(days) = args.show_recent_changes {
        let runs = run_ledger::recent_changes(pool, days).await?;
        for run in runs {
            println!(
                "{} {}/{} status={} created={} updated={} started={}",
                run.run_id, run.source_system, run.entity_type, run.status,
                run.records_created, run.records_updated, run.started_at,
            );
        }
        return Ok(true);
    }

    Ok(false)
}

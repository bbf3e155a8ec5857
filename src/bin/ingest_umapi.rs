//! Bronze ingestion job: institutional identity API departments and
//! employment records.

use clap::Parser;
use medallion_pipeline::sources::identity_api::IdentityApiClient;
use medallion_pipeline::transform::{umapi_departments, umapi_employment};
use medallion_pipeline::{cli, config, ingest, logging};

const SOURCE_SYSTEM: &str = "identity_api";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("ingest_umapi");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if args.show_status || args.show_recent_changes.is_some() {
        for entity_type in ["department", "user"] {
            cli::maybe_show_reports(&args, &pool, SOURCE_SYSTEM, entity_type).await?;
        }
        return Ok(());
    }

    let departments_client = IdentityApiClient::new(
        config::UMAPI_BASE_URL.as_str(),
        config::UMAPI_CLIENT_ID.as_str(),
        config::UMAPI_CLIENT_SECRET.as_str(),
        "departments",
        "DeptID",
    );
    let employment_client = IdentityApiClient::new(
        config::UMAPI_BASE_URL.as_str(),
        config::UMAPI_CLIENT_ID.as_str(),
        config::UMAPI_CLIENT_SECRET.as_str(),
        "employment-records",
        "uniqname",
    );

    let mut had_errors = false;

    let departments_stats = ingest::ingest(
        &pool,
        &departments_client,
        "department",
        SOURCE_SYSTEM,
        umapi_departments::basic_fields,
        args.full_sync,
        args.dry_run,
        args.stop_on_errors,
    )
    .await?;
    had_errors |= !departments_stats.errors.is_empty();

    let employment_stats = ingest::ingest(
        &pool,
        &employment_client,
        "user",
        SOURCE_SYSTEM,
        umapi_employment::basic_fields,
        args.full_sync,
        args.dry_run,
        args.stop_on_errors,
    )
    .await?;
    had_errors |= !employment_stats.errors.is_empty();

    println!(
        "departments: processed={} created={} skipped_unchanged={} errors={}",
        departments_stats.processed,
        departments_stats.created,
        departments_stats.skipped_unchanged,
        departments_stats.errors.len()
    );
    println!(
        "employment: processed={} created={} skipped_unchanged={} errors={}",
        employment_stats.processed,
        employment_stats.created,
        employment_stats.skipped_unchanged,
        employment_stats.errors.len()
    );

    if had_errors && args.stop_on_errors {
        std::process::exit(1);
    }
    Ok(())
}

//! Bronze ingestion job: TeamDynamix assets.

use clap::Parser;
use medallion_pipeline::sources::tdx::TdxClient;
use medallion_pipeline::transform::tdx_assets;
use medallion_pipeline::{cli, config, ingest, logging};

const ENTITY_TYPE: &str = "asset";
const SOURCE_SYSTEM: &str = "tdx";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("ingest_tdx_assets");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if cli::maybe_show_reports(&args, &pool, SOURCE_SYSTEM, ENTITY_TYPE).await? {
        return Ok(());
    }

    let client = TdxClient::new(
        config::TDX_BASE_URL.as_str(),
        config::TDX_API_TOKEN.as_str(),
        config::TDX_APP_ID.as_str(),
        "api/assets",
        Some("api/assets".to_string()),
        "ModifiedDate",
    );

    let stats = ingest::ingest(
        &pool,
        &client,
        ENTITY_TYPE,
        SOURCE_SYSTEM,
        tdx_assets::basic_fields,
        args.full_sync,
        args.dry_run,
        args.stop_on_errors,
    )
    .await?;

    tracing::info!(
        processed = stats.processed,
        created = stats.created,
        skipped_unchanged = stats.skipped_unchanged,
        errors = stats.errors.len(),
        "ingest_tdx_assets finished"
    );
    println!(
        "processed={} created={} skipped_unchanged={} errors={}",
        stats.processed,
        stats.created,
        stats.skipped_unchanged,
        stats.errors.len()
    );

    if !stats.errors.is_empty() && args.stop_on_errors {
        std::process::exit(1);
    }
    Ok(())
}

//! Bronze enrichment job: TeamDynamix department detail fetch.

use std::time::Duration;

use clap::Parser;
use medallion_pipeline::sources::tdx::TdxClient;
use medallion_pipeline::transform::tdx_departments;
use medallion_pipeline::{cli, config, enrich, logging};

const ENTITY_TYPE: &str = "department";
const SOURCE_SYSTEM: &str = "tdx";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("enrich_tdx_departments");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if cli::maybe_show_reports(&args, &pool, SOURCE_SYSTEM, ENTITY_TYPE).await? {
        return Ok(());
    }

    let client = TdxClient::new(
        config::TDX_BASE_URL.as_str(),
        config::TDX_API_TOKEN.as_str(),
        config::TDX_APP_ID.as_str(),
        "api/departments",
        Some("api/departments".to_string()),
        "ModifiedDate",
    );

    let stats = enrich::enrich(
        &pool,
        &client,
        ENTITY_TYPE,
        SOURCE_SYSTEM,
        tdx_departments::basic_fields,
        tdx_departments::detail_fields,
        args.worker_count(),
        args.api_delay.map(Duration::from_secs_f64),
        args.dry_run,
    )
    .await?;

    println!(
        "processed={} enriched={} errors={}",
        stats.processed,
        stats.enriched,
        stats.errors.len()
    );

    if !stats.errors.is_empty() && args.stop_on_errors {
        std::process::exit(1);
    }
    Ok(())
}

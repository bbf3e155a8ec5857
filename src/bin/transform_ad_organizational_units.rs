//! Silver-source transform job: ad_organizational_units.

use clap::Parser;
use medallion_pipeline::transform::ad_organizational_units::AdOrganizationalUnitProjector;
use medallion_pipeline::transform::engine::transform;
use medallion_pipeline::{cli, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("transform_ad_organizational_units");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if cli::maybe_show_reports(&args, &pool, "ad", "organizational_unit").await? {
        return Ok(());
    }

    let stats = transform(&pool, &AdOrganizationalUnitProjector, args.full_sync, args.dry_run).await?;

    println!(
        "processed={} upserted={} skipped_unchanged={} errors={}",
        stats.processed,
        stats.upserted,
        stats.skipped_unchanged,
        stats.errors.len()
    );

    if !stats.errors.is_empty() && args.stop_on_errors {
        std::process::exit(1);
    }
    Ok(())
}

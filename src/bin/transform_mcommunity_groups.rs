//! Silver-source transform job: mcommunity_groups.

use clap::Parser;
use medallion_pipeline::transform::engine::transform;
use medallion_pipeline::transform::mcommunity_groups::McommunityGroupProjector;
use medallion_pipeline::{cli, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("transform_mcommunity_groups");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if cli::maybe_show_reports(&args, &pool, "mcommunity", "group").await? {
        return Ok(());
    }

    let stats = transform(&pool, &McommunityGroupProjector, args.full_sync, args.dry_run).await?;

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

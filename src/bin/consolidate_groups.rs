//! Silver-consolidated build job: canonical groups.

use clap::Parser;
use medallion_pipeline::consolidate::groups::consolidate;
use medallion_pipeline::{cli, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("consolidate_groups");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if cli::maybe_show_reports(&args, &pool, "consolidated", "group").await? {
        return Ok(());
    }

    let stats = consolidate(&pool, args.dry_run).await?;

    println!(
        "candidates={} upserted={} skipped_unchanged={}",
        stats.candidates, stats.upserted, stats.skipped_unchanged
    );

    Ok(())
}

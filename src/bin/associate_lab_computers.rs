//! Derived-table job: rebuilds lab-computer associations standalone,
//! without re-running full computer consolidation. The same associator
//! `consolidate_computers` invokes after committing its own rows.

use clap::Parser;
use medallion_pipeline::lab_computers::associator::associate;
use medallion_pipeline::{cli, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("associate_lab_computers");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if cli::maybe_show_reports(&args, &pool, "consolidated", "lab_computer").await? {
        return Ok(());
    }

    let stats = associate(&pool, args.dry_run).await?;

    println!("{stats:?}");

    Ok(())
}

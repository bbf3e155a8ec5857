//! Derived-table job: rebuilds `group_members`/`group_owners` link tables
//! from `silver.groups`.

use clap::Parser;
use medallion_pipeline::relationships::extractor::extract;
use medallion_pipeline::{cli, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("extract_group_relationships");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if cli::maybe_show_reports(&args, &pool, "consolidated", "group_relationship").await? {
        return Ok(());
    }

    let stats = extract(&pool, args.dry_run).await?;

    println!("{stats:?}");

    Ok(())
}

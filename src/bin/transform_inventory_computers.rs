//! Silver-source transform job: inventory-agent computers. Not a generic
//! [`Projector`] — see [`inventory_computers`]'s own `transform`, which
//! groups Bronze rows by `(computer_name, serial_number)` before projecting.

use clap::Parser;
use medallion_pipeline::transform::inventory_computers;
use medallion_pipeline::{cli, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("transform_inventory_computers");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if cli::maybe_show_reports(&args, &pool, "inventory_agent", "computer").await? {
        return Ok(());
    }

    let stats = inventory_computers::transform(&pool, args.full_sync, args.dry_run).await?;

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

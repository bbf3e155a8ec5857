//! Bronze ingestion job: inventory agent NIC records.

use clap::Parser;
use medallion_pipeline::sources::inventory::InventoryAgentClient;
use medallion_pipeline::transform::inventory_computers;
use medallion_pipeline::{cli, config, ingest, logging};

const ENTITY_TYPE: &str = "computer";
const SOURCE_SYSTEM: &str = "inventory_agent";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("ingest_inventory");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if cli::maybe_show_reports(&args, &pool, SOURCE_SYSTEM, ENTITY_TYPE).await? {
        return Ok(());
    }

    let client = InventoryAgentClient::new(config::INVENTORY_AGENT_ENDPOINT.as_str());

    let stats = ingest::ingest(
        &pool,
        &client,
        ENTITY_TYPE,
        SOURCE_SYSTEM,
        inventory_computers::basic_fields,
        args.full_sync,
        args.dry_run,
        args.stop_on_errors,
    )
    .await?;

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

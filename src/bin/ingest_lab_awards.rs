//! Bronze ingestion job: lab-equipment award CSV exports.

use clap::Parser;
use medallion_pipeline::sources::csv_source::CsvAwardsClient;
use medallion_pipeline::transform::lab_awards;
use medallion_pipeline::{cli, config, ingest, logging};

const ENTITY_TYPE: &str = "lab_award";
const SOURCE_SYSTEM: &str = "lab_awards_csv";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("ingest_lab_awards");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if cli::maybe_show_reports(&args, &pool, SOURCE_SYSTEM, ENTITY_TYPE).await? {
        return Ok(());
    }

    let client = CsvAwardsClient::new(config::LAB_AWARDS_CSV_DIR.as_str(), "lab_awards");

    let stats = ingest::ingest(
        &pool,
        &client,
        ENTITY_TYPE,
        SOURCE_SYSTEM,
        lab_awards::basic_fields,
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

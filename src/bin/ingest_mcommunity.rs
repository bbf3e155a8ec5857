//! Bronze ingestion job: MCommunity people and groups.

use clap::Parser;
use medallion_pipeline::sources::ldap::{LdapConfig, LdapDirectoryClient};
use medallion_pipeline::transform::{mcommunity_groups, mcommunity_users};
use medallion_pipeline::{cli, config, ingest, logging};

const SOURCE_SYSTEM: &str = "mcommunity";

fn ldap_config(filter: &str, attributes: &[&str]) -> LdapConfig {
    LdapConfig {
        host: config::MCOMMUNITY_HOST.clone(),
        bind_dn: config::MCOMMUNITY_BIND_DN.clone(),
        bind_password: config::MCOMMUNITY_BIND_PASSWORD.clone(),
        base_dn: config::MCOMMUNITY_BASE_DN.clone(),
        filter: filter.to_string(),
        attributes: attributes.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("ingest_mcommunity");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if args.show_status || args.show_recent_changes.is_some() {
        for entity_type in ["user", "group"] {
            cli::maybe_show_reports(&args, &pool, SOURCE_SYSTEM, entity_type).await?;
        }
        return Ok(());
    }

    let users_client = LdapDirectoryClient::new(ldap_config(
        "(objectClass=person)",
        &["dn", "givenName", "displayName", "mail", "telephoneNumber", "umichTitle", "ou"],
    ));
    let groups_client = LdapDirectoryClient::new(ldap_config(
        "(objectClass=group)",
        &["dn", "cn", "description", "member", "umichDirectMember", "owner"],
    ));

    let mut had_errors = false;

    let users_stats = ingest::ingest(
        &pool,
        &users_client,
        "user",
        SOURCE_SYSTEM,
        mcommunity_users::basic_fields,
        args.full_sync,
        args.dry_run,
        args.stop_on_errors,
    )
    .await?;
    had_errors |= !users_stats.errors.is_empty();

    let groups_stats = ingest::ingest(
        &pool,
        &groups_client,
        "group",
        SOURCE_SYSTEM,
        mcommunity_groups::basic_fields,
        args.full_sync,
        args.dry_run,
        args.stop_on_errors,
    )
    .await?;
    had_errors |= !groups_stats.errors.is_empty();

    println!(
        "users: processed={} created={} skipped_unchanged={} errors={}",
        users_stats.processed, users_stats.created, users_stats.skipped_unchanged, users_stats.errors.len()
    );
    println!(
        "groups: processed={} created={} skipped_unchanged={} errors={}",
        groups_stats.processed, groups_stats.created, groups_stats.skipped_unchanged, groups_stats.errors.len()
    );

    if had_errors && args.stop_on_errors {
        std::process::exit(1);
    }
    Ok(())
}

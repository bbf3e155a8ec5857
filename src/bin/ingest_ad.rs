//! Bronze ingestion job: Active Directory users, computers, and groups.
//! One LDAP bind serves all three object classes, so this job runs all
//! three sub-ingestions rather than splitting into three binaries.

use clap::Parser;
use medallion_pipeline::sources::ldap::{LdapConfig, LdapDirectoryClient};
use medallion_pipeline::transform::{ad_computers, ad_groups, ad_organizational_units, ad_users};
use medallion_pipeline::{cli, config, ingest, logging};

const SOURCE_SYSTEM: &str = "ad";

fn ldap_config(base_dn_suffix: &str, filter: &str, attributes: &[&str]) -> LdapConfig {
    LdapConfig {
        host: config::AD_HOST.clone(),
        bind_dn: config::AD_BIND_DN.clone(),
        bind_password: config::AD_BIND_PASSWORD.clone(),
        base_dn: format!("{},{}", base_dn_suffix, config::AD_BASE_DN.as_str()),
        filter: filter.to_string(),
        attributes: attributes.iter().map(|s| s.to_string()).collect(),
    }
}

/// Organizational units span the whole tree rather than living under one
/// container, so the search base is the directory root itself.
fn ldap_config_at_root(filter: &str, attributes: &[&str]) -> LdapConfig {
    LdapConfig {
        host: config::AD_HOST.clone(),
        bind_dn: config::AD_BIND_DN.clone(),
        bind_password: config::AD_BIND_PASSWORD.clone(),
        base_dn: config::AD_BASE_DN.clone(),
        filter: filter.to_string(),
        attributes: attributes.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = cli::JobArgs::parse();
    let _guard = logging::init("ingest_ad");
    let pool = cli::connect_pool().await?;
    cli::run_migrations(&pool).await?;

    if args.show_status || args.show_recent_changes.is_some() {
        for entity_type in ["user", "computer", "group", "organizational_unit"] {
            cli::maybe_show_reports(&args, &pool, SOURCE_SYSTEM, entity_type).await?;
        }
        return Ok(());
    }

    let users_client = LdapDirectoryClient::new(ldap_config(
        "ou=People",
        "(objectClass=user)",
        &["dn", "sAMAccountName", "givenName", "sn", "mail", "displayName", "userAccountControl"],
    ));
    let computers_client = LdapDirectoryClient::new(ldap_config(
        "ou=Computers",
        "(objectClass=computer)",
        &["dn", "cn", "dNSHostName", "operatingSystem", "userAccountControl", "memberOf"],
    ));
    let groups_client = LdapDirectoryClient::new(ldap_config(
        "ou=Groups",
        "(objectClass=group)",
        &["dn", "sAMAccountName", "description", "member", "owner"],
    ));
    let organizational_units_client = LdapDirectoryClient::new(ldap_config_at_root(
        "(objectClass=organizationalUnit)",
        &["dn"],
    ));

    let mut had_errors = false;

    let users_stats = ingest::ingest(
        &pool,
        &users_client,
        "user",
        SOURCE_SYSTEM,
        ad_users::basic_fields,
        args.full_sync,
        args.dry_run,
        args.stop_on_errors,
    )
    .await?;
    had_errors |= !users_stats.errors.is_empty();

    let computers_stats = ingest::ingest(
        &pool,
        &computers_client,
        "computer",
        SOURCE_SYSTEM,
        ad_computers::basic_fields,
        args.full_sync,
        args.dry_run,
        args.stop_on_errors,
    )
    .await?;
    had_errors |= !computers_stats.errors.is_empty();

    let groups_stats = ingest::ingest(
        &pool,
        &groups_client,
        "group",
        SOURCE_SYSTEM,
        ad_groups::basic_fields,
        args.full_sync,
        args.dry_run,
        args.stop_on_errors,
    )
    .await?;
    had_errors |= !groups_stats.errors.is_empty();

    let organizational_units_stats = ingest::ingest(
        &pool,
        &organizational_units_client,
        "organizational_unit",
        SOURCE_SYSTEM,
        ad_organizational_units::basic_fields,
        args.full_sync,
        args.dry_run,
        args.stop_on_errors,
    )
    .await?;
    had_errors |= !organizational_units_stats.errors.is_empty();

    println!(
        "users: processed={} created={} skipped_unchanged={} errors={}",
        users_stats.processed, users_stats.created, users_stats.skipped_unchanged, users_stats.errors.len()
    );
    println!(
        "computers: processed={} created={} skipped_unchanged={} errors={}",
        computers_stats.processed,
        computers_stats.created,
        computers_stats.skipped_unchanged,
        computers_stats.errors.len()
    );
    println!(
        "groups: processed={} created={} skipped_unchanged={} errors={}",
        groups_stats.processed, groups_stats.created, groups_stats.skipped_unchanged, groups_stats.errors.len()
    );
    println!(
        "organizational_units: processed={} created={} skipped_unchanged={} errors={}",
        organizational_units_stats.processed,
        organizational_units_stats.created,
        organizational_units_stats.skipped_unchanged,
        organizational_units_stats.errors.len()
    );

    if had_errors && args.stop_on_errors {
        std::process::exit(1);
    }
    Ok(())
}

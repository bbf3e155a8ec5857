//! Computer consolidation: three-phase match (name → MAC → serial)
//! across TDX assets, AD computer objects, and inventory-agent rows, then
//! owner resolution and hand-off to the lab-computer associator.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::db::silver_consolidated;
use crate::error::AppResult;
use crate::hashing::{entity_hash, normalize_mac};
use crate::lab_computers::associator;
use crate::run_ledger::{self, RunCounts};

const ENTITY_TYPE: &str = "computer";
const SOURCE_SYSTEM: &str = "consolidated";
const RECENT_ACTIVITY_WINDOW_DAYS: i64 = 90;

#[derive(Debug, Default, Clone)]
pub struct ConsolidateStats {
    pub candidates: i64,
    pub groups: i64,
    pub upserted: i64,
    pub skipped_unchanged: i64,
}

#[derive(Debug, Clone)]
pub struct ComputerCandidate {
    pub source: &'static str,
    pub name: Option<String>,
    pub serial: Option<String>,
    pub macs: Vec<String>,
    pub ad_dn: Option<String>,
    pub owning_customer_id: Option<String>,
    pub financial_owner_uid: Option<String>,
    pub function_id: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConsolidatedComputerRow {
    pub computer_id: String,
    pub name: Option<String>,
    pub serial_numbers: serde_json::Value,
    pub mac_addresses: serde_json::Value,
    pub ad_dn: Option<String>,
    pub owner_uniqname: Option<String>,
    pub financial_owner_uniqname: Option<String>,
    pub function_id: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub has_recent_activity: bool,
    pub source_system: String,
    pub entity_hash: String,
}

fn normalized_name(name: &Option<String>) -> Option<String> {
    name.as_deref().map(|n| n.trim().to_lowercase()).filter(|n| !n.is_empty())
}

/// Groups candidates by the first of name, MAC, or serial that matches an
/// already-formed group. Order-dependent (first-seen group wins a
/// candidate) — a plain `HashMap`-based grouping rather than a general
/// union-find.
pub fn group_candidates(candidates: Vec<ComputerCandidate>) -> Vec<Vec<ComputerCandidate>> {
    let mut groups: Vec<Vec<ComputerCandidate>> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    let mut by_mac: HashMap<String, usize> = HashMap::new();
    let mut by_serial: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        let name_key = normalized_name(&candidate.name);
        let serial_key = candidate.serial.as_deref().map(|s| s.trim().to_uppercase());

        let existing = name_key
            .as_ref()
            .and_then(|k| by_name.get(k))
            .or_else(|| candidate.macs.iter().find_map(|m| by_mac.get(m)))
            .or_else(|| serial_key.as_ref().and_then(|k| by_serial.get(k)))
            .copied();

        let group_idx = match existing {
            Some(idx) => idx,
            None => {
                groups.push(Vec::new());
                groups.len() - 1
            }
        };

        if let Some(key) = &name_key {
            by_name.entry(key.clone()).or_insert(group_idx);
        }
        for mac in &candidate.macs {
            by_mac.entry(mac.clone()).or_insert(group_idx);
        }
        if let Some(key) = &serial_key {
            by_serial.entry(key.clone()).or_insert(group_idx);
        }

        groups[group_idx].push(candidate);
    }

    groups
}

fn merge_group(group: &[ComputerCandidate], now: DateTime<Utc>) -> ConsolidatedComputerRow {
    let mut sources: Vec<&str> = group.iter().map(|c| c.source).collect();
    sources.sort();
    sources.dedup();

    let name = group.iter().find_map(|c| c.name.clone());

    let mut serials: Vec<String> = group.iter().filter_map(|c| c.serial.clone()).collect();
    serials.sort();
    serials.dedup();

    let mut macs: Vec<String> = group
        .iter()
        .flat_map(|c| c.macs.iter().map(|m| normalize_mac(m)))
        .collect();
    macs.sort();
    macs.dedup();

    let ad_dn = group.iter().find_map(|c| c.ad_dn.clone());
    let owning_customer_id = group.iter().find_map(|c| c.owning_customer_id.clone());
    let financial_owner_uid = group.iter().find_map(|c| c.financial_owner_uid.clone());
    let function_id = group.iter().find_map(|c| c.function_id.clone());
    let last_seen = group.iter().filter_map(|c| c.last_seen).max();
    let has_recent_activity = last_seen
        .map(|ts| now - ts <= Duration::days(RECENT_ACTIVITY_WINDOW_DAYS))
        .unwrap_or(false);

    let computer_id = name
        .clone()
        .or_else(|| serials.first().cloned())
        .unwrap_or_else(|| format!("unidentified-{}", macs.join(",")));

    let mut row = ConsolidatedComputerRow {
        computer_id,
        name,
        serial_numbers: serde_json::Value::Array(serials.into_iter().map(serde_json::Value::String).collect()),
        mac_addresses: serde_json::Value::Array(macs.into_iter().map(serde_json::Value::String).collect()),
        ad_dn,
        owner_uniqname: owning_customer_id,
        financial_owner_uniqname: financial_owner_uid,
        function_id,
        last_seen,
        has_recent_activity,
        source_system: sources.join("+"),
        entity_hash: String::new(),
    };
    row.entity_hash = entity_hash(&row, &["entity_hash", "created_at", "updated_at"]);
    row
}

async fn load_candidates(pool: &PgPool) -> AppResult<Vec<ComputerCandidate>> {
    let mut candidates = Vec::new();

    let tdx_rows: Vec<(Option<String>, Option<String>, Option<String>, Option<String>, Option<String>, Option<String>)> =
        sqlx::query_as(
            "SELECT name, serial_number, mac_address, owning_customer_id, financial_owner_uid, function_id \
             FROM silver.tdx_assets",
        )
        .fetch_all(pool)
        .await?;
    for (name, serial, mac, owner, fin_owner, function_id) in tdx_rows {
        candidates.push(ComputerCandidate {
            source: "tdx",
            name,
            serial,
            macs: mac.into_iter().collect(),
            ad_dn: None,
            owning_customer_id: owner,
            financial_owner_uid: fin_owner,
            function_id,
            last_seen: None,
        });
    }

    let ad_rows: Vec<(String, Option<String>, Option<String>)> =
        sqlx::query_as("SELECT dn, cn, dns_host_name FROM silver.ad_computers")
            .fetch_all(pool)
            .await?;
    for (dn, cn, _dns) in ad_rows {
        candidates.push(ComputerCandidate {
            source: "ad",
            name: cn,
            serial: None,
            macs: vec![],
            ad_dn: Some(dn),
            owning_customer_id: None,
            financial_owner_uid: None,
            function_id: None,
            last_seen: None,
        });
    }

    let inv_rows: Vec<(Option<String>, Option<String>, serde_json::Value, Option<DateTime<Utc>>)> =
        sqlx::query_as(
            "SELECT computer_name, serial_number, mac_addresses, last_session FROM silver.inventory_computers",
        )
        .fetch_all(pool)
        .await?;
    for (name, serial, macs, last_session) in inv_rows {
        let macs: Vec<String> = macs
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        candidates.push(ComputerCandidate {
            source: "inventory_agent",
            name,
            serial,
            macs,
            ad_dn: None,
            owning_customer_id: None,
            financial_owner_uid: None,
            function_id: None,
            last_seen: last_session,
        });
    }

    Ok(candidates)
}

/// Resolves owner/financial-owner TDX uids to uniqnames, never storing an
/// owner that does not resolve against `silver.users`.
async fn resolve_owners(pool: &PgPool, rows: &mut [ConsolidatedComputerRow]) -> AppResult<()> {
    let tdx_uids: HashSet<String> = rows
        .iter()
        .flat_map(|r| [r.owner_uniqname.clone(), r.financial_owner_uniqname.clone()])
        .flatten()
        .collect();
    if tdx_uids.is_empty() {
        return Ok(());
    }
    let tdx_uids: Vec<String> = tdx_uids.into_iter().collect();

    let uid_to_username: HashMap<String, String> = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT tdx_user_uid, username FROM silver.tdx_users WHERE tdx_user_uid = ANY($1)",
    )
    .bind(&tdx_uids)
    .fetch_all(pool)
    .await?
    .into_iter()
    .filter_map(|(uid, username)| username.map(|u| (uid, u)))
    .collect();

    let usernames: Vec<String> = uid_to_username.values().cloned().collect();
    let known_users: HashSet<String> = sqlx::query_scalar::<_, String>(
        "SELECT uniqname FROM silver.users WHERE uniqname = ANY($1)",
    )
    .bind(&usernames)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    for row in rows.iter_mut() {
        row.owner_uniqname = row
            .owner_uniqname
            .take()
            .and_then(|uid| uid_to_username.get(&uid).cloned())
            .filter(|username| known_users.contains(username));
        row.financial_owner_uniqname = row
            .financial_owner_uniqname
            .take()
            .and_then(|uid| uid_to_username.get(&uid).cloned())
            .filter(|username| known_users.contains(username));
    }
    Ok(())
}

pub async fn consolidate(pool: &PgPool, dry_run: bool) -> AppResult<ConsolidateStats> {
    let mut stats = ConsolidateStats::default();

    let run_id = if dry_run {
        uuid::Uuid::nil()
    } else {
        run_ledger::begin(pool, SOURCE_SYSTEM, ENTITY_TYPE, serde_json::json!({})).await?
    };

    let candidates = load_candidates(pool).await?;
    stats.candidates = candidates.len() as i64;

    let groups = group_candidates(candidates);
    stats.groups = groups.len() as i64;

    let now = Utc::now();
    let mut rows: Vec<ConsolidatedComputerRow> = groups.iter().map(|g| merge_group(g, now)).collect();

    if !dry_run {
        resolve_owners(pool, &mut rows).await?;
        for row in &rows {
            let entity_hash_recomputed = entity_hash(row, &["entity_hash", "created_at", "updated_at"]);
            let existing =
                silver_consolidated::existing_entity_hash(pool, "computers", "computer_id", &row.computer_id)
                    .await?;
            if existing.as_deref() == Some(entity_hash_recomputed.as_str()) {
                stats.skipped_unchanged += 1;
                continue;
            }
            let mut row = row.clone();
            row.entity_hash = entity_hash_recomputed;
            upsert(pool, &row).await?;
            stats.upserted += 1;
        }
    } else {
        stats.upserted = rows.len() as i64;
    }

    if !dry_run {
        run_ledger::complete(
            pool,
            run_id,
            RunCounts {
                processed: stats.candidates,
                created: stats.upserted,
                updated: 0,
            },
            None,
        )
        .await?;
        associator::associate(pool, dry_run).await?;
    }

    Ok(stats)
}

async fn upsert(pool: &PgPool, row: &ConsolidatedComputerRow) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO silver.computers \
             (computer_id, name, serial_numbers, mac_addresses, ad_dn, owner_uniqname, \
              financial_owner_uniqname, function_id, last_seen, has_recent_activity, \
              source_system, entity_hash) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (computer_id) DO UPDATE SET \
             name = EXCLUDED.name, serial_numbers = EXCLUDED.serial_numbers, \
             mac_addresses = EXCLUDED.mac_addresses, ad_dn = EXCLUDED.ad_dn, \
             owner_uniqname = EXCLUDED.owner_uniqname, \
             financial_owner_uniqname = EXCLUDED.financial_owner_uniqname, \
             function_id = EXCLUDED.function_id, last_seen = EXCLUDED.last_seen, \
             has_recent_activity = EXCLUDED.has_recent_activity, source_system = EXCLUDED.source_system, \
             entity_hash = EXCLUDED.entity_hash \
         WHERE silver.computers.entity_hash != EXCLUDED.entity_hash",
    )
    .bind(&row.computer_id)
    .bind(&row.name)
    .bind(&row.serial_numbers)
    .bind(&row.mac_addresses)
    .bind(&row.ad_dn)
    .bind(&row.owner_uniqname)
    .bind(&row.financial_owner_uniqname)
    .bind(&row.function_id)
    .bind(row.last_seen)
    .bind(row.has_recent_activity)
    .bind(&row.source_system)
    .bind(&row.entity_hash)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(source: &'static str, name: Option<&str>, serial: Option<&str>, macs: &[&str]) -> ComputerCandidate {
        ComputerCandidate {
            source,
            name: name.map(str::to_string),
            serial: serial.map(str::to_string),
            macs: macs.iter().map(|s| s.to_string()).collect(),
            ad_dn: None,
            owning_customer_id: None,
            financial_owner_uid: None,
            function_id: None,
            last_seen: None,
        }
    }

    #[test]
    fn matching_by_name_merges_into_one_group() {
        let candidates = vec![
            candidate("tdx", Some("LAB-PC-01"), Some("SN1"), &[]),
            candidate("ad", Some("lab-pc-01"), None, &[]),
        ];
        let groups = group_candidates(candidates);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn matching_by_mac_merges_when_names_differ() {
        let candidates = vec![
            candidate("tdx", Some("LAB-PC-01"), None, &["AA:BB:CC:DD:EE:FF"]),
            candidate("inventory_agent", Some("LAB-PC-01-RENAMED"), None, &["aabbccddeeff"]),
        ];
        let groups = group_candidates(candidates);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn unrelated_candidates_stay_in_separate_groups() {
        let candidates = vec![
            candidate("tdx", Some("LAB-PC-01"), Some("SN1"), &[]),
            candidate("tdx", Some("LAB-PC-02"), Some("SN2"), &[]),
        ];
        let groups = group_candidates(candidates);
        assert_eq!(groups.len(), 2);
    }
}

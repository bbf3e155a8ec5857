//! Inventory-agent computer projection. Unlike every other Silver-source
//! transform, this one cannot be a per-row [`Projector`]: several Bronze
//! rows (one per NIC) describe the same physical machine, keyed by
//! `(computer_name, serial_number)`. Rows are grouped in a pre-pass before
//! projection — not a per-row mapping.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::db::bronze;
use crate::db::silver_source::{self, UpsertCounts};
use crate::error::AppResult;
use crate::hashing::{self, normalize_mac, trim_or_null};
use crate::run_ledger::{self, RunCounts};

const ENTITY_TYPE: &str = "computer";
const SOURCE_SYSTEM: &str = "inventory_agent";
const TABLE: &str = "inventory_computers";
const KEY_COLUMN: &str = "computer_key";
const CHUNK_SIZE: usize = 1000;

pub fn basic_fields(raw: &Value) -> BTreeMap<&'static str, Value> {
    let mut map = BTreeMap::new();
    for key in ["Name", "OEM SN", "MAC Address", "IP Address", "Last Session"] {
        map.insert(key, raw.get(key).cloned().unwrap_or(Value::Null));
    }
    map
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InventoryComputerRow {
    pub computer_key: String,
    pub computer_name: Option<String>,
    pub serial_number: Option<String>,
    pub mac_addresses: Value,
    pub primary_mac_address: Option<String>,
    pub ip_addresses: Value,
    pub nic_count: i32,
    pub last_session: Option<DateTime<Utc>>,
    pub contributing_raw_ids: Value,
    pub entity_hash: String,
}

#[derive(Debug, Default, Clone)]
pub struct TransformStats {
    pub processed: i64,
    pub upserted: i64,
    pub skipped_unchanged: i64,
    pub errors: Vec<String>,
}

pub async fn transform(pool: &PgPool, full_sync: bool, dry_run: bool) -> AppResult<TransformStats> {
    let mut stats = TransformStats::default();

    let run_id = if dry_run {
        uuid::Uuid::nil()
    } else {
        run_ledger::begin(
            pool,
            SOURCE_SYSTEM,
            ENTITY_TYPE,
            serde_json::json!({"phase": "transform", "full_sync": full_sync}),
        )
        .await?
    };

    let since = if full_sync {
        None
    } else {
        run_ledger::last_successful_completion(pool, SOURCE_SYSTEM, ENTITY_TYPE).await?
    };

    let ids = bronze::external_ids_in_scope(pool, ENTITY_TYPE, SOURCE_SYSTEM, since).await?;

    for chunk in ids.chunks(CHUNK_SIZE) {
        let latest = bronze::batch_latest_by_external_id(pool, ENTITY_TYPE, SOURCE_SYSTEM, chunk).await?;
        stats.processed += latest.len() as i64;

        let mut groups: HashMap<(String, String), Vec<(i64, Value)>> = HashMap::new();
        for bronze_row in latest.values() {
            let name = bronze_row
                .raw_data
                .get("Name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let serial = bronze_row
                .raw_data
                .get("OEM SN")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            groups
                .entry((name, serial))
                .or_default()
                .push((bronze_row.raw_id, bronze_row.raw_data.clone()));
        }

        let mut rows = Vec::with_capacity(groups.len());
        for ((name, serial), members) in groups {
            rows.push(consolidate_group(&name, &serial, &members));
        }

        let keys: Vec<String> = rows.iter().map(|r| r.computer_key.clone()).collect();
        let existing_hashes = if dry_run {
            Default::default()
        } else {
            silver_source::existing_hashes(pool, TABLE, KEY_COLUMN, &keys).await?
        };

        let mut to_upsert = Vec::with_capacity(rows.len());
        for row in rows {
            if existing_hashes.get(&row.computer_key) == Some(&row.entity_hash) {
                stats.skipped_unchanged += 1;
                continue;
            }
            to_upsert.push(row);
        }

        if !to_upsert.is_empty() && !dry_run {
            let counts = upsert_batch(pool, &to_upsert).await?;
            stats.upserted += counts.upserted;
            stats.skipped_unchanged += counts.skipped_unchanged;
        } else {
            stats.upserted += to_upsert.len() as i64;
        }
    }

    if !dry_run {
        run_ledger::complete(
            pool,
            run_id,
            RunCounts {
                processed: stats.processed,
                created: stats.upserted,
                updated: 0,
            },
            None,
        )
        .await?;
    }

    Ok(stats)
}

/// Consolidates all per-NIC rows for one `(computer_name, serial_number)`
/// into a single row: MAC/IP collected into arrays, scalar fields taken
/// from the row with the maximum `Last Session`.
fn consolidate_group(
    name: &str,
    serial: &str,
    members: &[(i64, Value)],
) -> InventoryComputerRow {
    let mut raw_ids = Vec::new();
    let mut nics: Vec<(Option<DateTime<Utc>>, Option<String>, Option<String>)> = Vec::new();

    for (raw_id, raw) in members {
        raw_ids.push(Value::from(*raw_id));
        let mac = raw.get("MAC Address").and_then(Value::as_str).map(normalize_mac);
        let ip = raw.get("IP Address").and_then(Value::as_str).map(str::to_string);
        let last_session = raw
            .get("Last Session")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        nics.push((last_session, mac, ip));
    }
    // Most-recently-active NIC first — both the array order
    // and the scalar "primary" fields follow this ordering.
    nics.sort_by(|a, b| b.0.cmp(&a.0));

    let mut macs = Vec::new();
    let mut ips = Vec::new();
    for (_, mac, ip) in &nics {
        if let Some(mac) = mac {
            if !macs.contains(mac) {
                macs.push(mac.clone());
            }
        }
        if let Some(ip) = ip {
            if !ips.contains(ip) {
                ips.push(ip.clone());
            }
        }
    }

    let last_session = nics.first().and_then(|(ts, _, _)| *ts);
    let primary_mac_address = macs.first().cloned();

    let mut row = InventoryComputerRow {
        computer_key: format!("{name}|{serial}"),
        computer_name: trim_or_null(Some(name)),
        serial_number: trim_or_null(Some(serial)),
        mac_addresses: Value::Array(macs.into_iter().map(Value::String).collect()),
        primary_mac_address,
        ip_addresses: Value::Array(ips.into_iter().map(Value::String).collect()),
        nic_count: members.len() as i32,
        last_session,
        contributing_raw_ids: Value::Array(raw_ids),
        entity_hash: String::new(),
    };
    row.entity_hash = hashing::entity_hash(&row, &["computer_key", "entity_hash", "contributing_raw_ids"]);
    row
}

async fn upsert_batch(pool: &PgPool, rows: &[InventoryComputerRow]) -> AppResult<UpsertCounts> {
    let mut counts = UpsertCounts::default();
    let computer_keys: Vec<&str> = rows.iter().map(|r| r.computer_key.as_str()).collect();
    let computer_names: Vec<Option<&str>> = rows.iter().map(|r| r.computer_name.as_deref()).collect();
    let serial_numbers: Vec<Option<&str>> = rows.iter().map(|r| r.serial_number.as_deref()).collect();
    let mac_addresses: Vec<&Value> = rows.iter().map(|r| &r.mac_addresses).collect();
    let primary_mac_addresses: Vec<Option<&str>> =
        rows.iter().map(|r| r.primary_mac_address.as_deref()).collect();
    let ip_addresses: Vec<&Value> = rows.iter().map(|r| &r.ip_addresses).collect();
    let nic_counts: Vec<i32> = rows.iter().map(|r| r.nic_count).collect();
    let last_sessions: Vec<Option<DateTime<Utc>>> = rows.iter().map(|r| r.last_session).collect();
    let contributing_raw_ids: Vec<&Value> = rows.iter().map(|r| &r.contributing_raw_ids).collect();
    let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

    let result = sqlx::query(
        "INSERT INTO silver.inventory_computers \
             (computer_key, computer_name, serial_number, mac_addresses, primary_mac_address, \
              ip_addresses, nic_count, last_session, contributing_raw_ids, entity_hash) \
         SELECT * FROM UNNEST( \
             $1::text[], $2::text[], $3::text[], $4::jsonb[], $5::text[], \
             $6::jsonb[], $7::int[], $8::timestamptz[], $9::jsonb[], $10::text[] \
         ) \
         ON CONFLICT (computer_key) DO UPDATE SET \
             computer_name = EXCLUDED.computer_name, serial_number = EXCLUDED.serial_number, \
             mac_addresses = EXCLUDED.mac_addresses, primary_mac_address = EXCLUDED.primary_mac_address, \
             ip_addresses = EXCLUDED.ip_addresses, nic_count = EXCLUDED.nic_count, \
             last_session = EXCLUDED.last_session, contributing_raw_ids = EXCLUDED.contributing_raw_ids, \
             entity_hash = EXCLUDED.entity_hash \
         WHERE silver.inventory_computers.entity_hash != EXCLUDED.entity_hash",
    )
    .bind(&computer_keys)
    .bind(&computer_names)
    .bind(&serial_numbers)
    .bind(&mac_addresses)
    .bind(&primary_mac_addresses)
    .bind(&ip_addresses)
    .bind(&nic_counts)
    .bind(&last_sessions)
    .bind(&contributing_raw_ids)
    .bind(&entity_hashes)
    .execute(pool)
    .await?;

    counts.upserted = result.rows_affected() as i64;
    counts.skipped_unchanged = rows.len() as i64 - counts.upserted;
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn multiple_nics_consolidate_into_one_row_with_sorted_unique_macs() {
        let members = vec![
            (
                1,
                json!({"Name": "lab-pc-01", "OEM SN": "SN1", "MAC Address": "aa:bb:cc:dd:ee:ff", "Last Session": "2024-01-01T00:00:00Z"}),
            ),
            (
                2,
                json!({"Name": "lab-pc-01", "OEM SN": "SN1", "MAC Address": "11:22:33:44:55:66", "Last Session": "2024-06-01T00:00:00Z"}),
            ),
        ];
        let row = consolidate_group("lab-pc-01", "SN1", &members);
        assert_eq!(row.mac_addresses.as_array().unwrap().len(), 2);
        assert_eq!(row.nic_count, 2);
        assert_eq!(row.primary_mac_address, Some("112233445566".to_string()));
        assert_eq!(
            row.last_session,
            Some(DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z").unwrap().with_timezone(&Utc))
        );
    }

    #[test]
    fn mac_array_is_ordered_most_recent_nic_first() {
        let members = vec![
            (
                1,
                json!({"Name": "lab-pc-01", "OEM SN": "SN1", "MAC Address": "aa:bb:cc:dd:ee:01", "Last Session": "2025-01-01T00:00:00Z"}),
            ),
            (
                2,
                json!({"Name": "lab-pc-01", "OEM SN": "SN1", "MAC Address": "aa:bb:cc:dd:ee:02", "Last Session": "2025-02-01T00:00:00Z"}),
            ),
            (
                3,
                json!({"Name": "lab-pc-01", "OEM SN": "SN1", "MAC Address": "aa:bb:cc:dd:ee:03", "Last Session": "2025-03-15T00:00:00Z"}),
            ),
        ];
        let row = consolidate_group("lab-pc-01", "SN1", &members);
        let macs: Vec<&str> = row.mac_addresses.as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(macs, vec!["AABBCCDDEE03", "AABBCCDDEE02", "AABBCCDDEE01"]);
        assert_eq!(row.primary_mac_address, Some("AABBCCDDEE03".to_string()));
    }
}

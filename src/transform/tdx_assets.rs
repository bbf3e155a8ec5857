//! TDX asset projection, including the `Attributes`-array extraction
//! described below (MAC, reserved IP, OS, function, financial owner,
//! support groups) via the `find_attribute` helper.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::db::silver_source::UpsertCounts;
use crate::error::{AppError, AppResult};
use crate::hashing::{trim_or_null, uuid_or_null_if_sentinel};
use crate::transform::engine::{entity_hash_excluding_metadata, Projector};
use crate::transform::field_map::find_attribute;

/// TDX custom-attribute field ids this projector reads out of `Attributes`.
/// Concrete ids are environment-specific in the original system; these are
/// representative placeholders wired through one helper so the real ids
/// are a one-line change, not a rewrite.
mod attr_ids {
    pub const MAC_ADDRESS: i64 = 10001;
    pub const RESERVED_IP: i64 = 10002;
    pub const OS_ID: i64 = 10003;
    pub const FUNCTION_ID: i64 = 10004;
    pub const FINANCIAL_OWNER_UID: i64 = 10005;
    pub const SUPPORT_GROUP_IDS: i64 = 10006;
}

pub fn basic_fields(raw: &Value) -> BTreeMap<&'static str, Value> {
    let mut map = BTreeMap::new();
    for key in ["ID", "Name", "SerialNumber", "StatusName", "OwningCustomerID", "Tag"] {
        map.insert(key, raw.get(key).cloned().unwrap_or(Value::Null));
    }
    map
}

/// Detail-only fields the per-asset TDX endpoint adds: `Attributes`
/// (custom fields this projector reads MAC/IP/OS/function/financial-owner
/// out of) and `Applications`, neither of which the list endpoint returns.
pub fn detail_fields(detail: &Value) -> BTreeMap<&'static str, Value> {
    let mut map = BTreeMap::new();
    map.insert("Attributes", detail.get("Attributes").cloned().unwrap_or(Value::Array(vec![])));
    map.insert("Applications", detail.get("Applications").cloned().unwrap_or(Value::Array(vec![])));
    map
}

fn attribute_value(attrs: &Value, field_id: i64) -> Option<Value> {
    find_attribute(attrs, field_id).and_then(|a| a.get("Value")).cloned()
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TdxAssetRow {
    pub tdx_asset_id: String,
    pub name: Option<String>,
    pub serial_number: Option<String>,
    pub status_name: Option<String>,
    pub owning_customer_id: Option<String>,
    pub tag: Option<String>,
    pub mac_address: Option<String>,
    pub reserved_ip: Option<String>,
    pub os_id: Option<String>,
    pub function_id: Option<String>,
    pub financial_owner_uid: Option<String>,
    pub support_group_ids: Value,
    pub entity_hash: String,
}

pub struct TdxAssetProjector;

#[async_trait]
impl Projector for TdxAssetProjector {
    type Row = TdxAssetRow;

    const TABLE: &'static str = "tdx_assets";
    const KEY_COLUMN: &'static str = "tdx_asset_id";
    const ENTITY_TYPE: &'static str = "asset";
    const SOURCE_SYSTEM: &'static str = "tdx";

    fn project(&self, raw: &Value) -> AppResult<Self::Row> {
        let id = raw
            .get("ID")
            .ok_or_else(|| AppError::Projection("TDX asset missing ID".into()))?
            .to_string();
        let attrs = raw.get("Attributes").cloned().unwrap_or(Value::Array(vec![]));

        let mut row = TdxAssetRow {
            tdx_asset_id: id,
            name: trim_or_null(raw.get("Name").and_then(Value::as_str)),
            serial_number: trim_or_null(raw.get("SerialNumber").and_then(Value::as_str)),
            status_name: trim_or_null(raw.get("StatusName").and_then(Value::as_str)),
            owning_customer_id: uuid_or_null_if_sentinel(raw.get("OwningCustomerID").and_then(Value::as_str)),
            tag: trim_or_null(raw.get("Tag").and_then(Value::as_str)),
            mac_address: attribute_value(&attrs, attr_ids::MAC_ADDRESS)
                .and_then(|v| v.as_str().map(str::to_string)),
            reserved_ip: attribute_value(&attrs, attr_ids::RESERVED_IP)
                .and_then(|v| v.as_str().map(str::to_string)),
            os_id: attribute_value(&attrs, attr_ids::OS_ID).map(|v| v.to_string()),
            function_id: attribute_value(&attrs, attr_ids::FUNCTION_ID).map(|v| v.to_string()),
            financial_owner_uid: attribute_value(&attrs, attr_ids::FINANCIAL_OWNER_UID)
                .and_then(|v| v.as_str().map(str::to_string)),
            support_group_ids: attribute_value(&attrs, attr_ids::SUPPORT_GROUP_IDS)
                .unwrap_or(Value::Array(vec![])),
            entity_hash: String::new(),
        };
        row.entity_hash = entity_hash_excluding_metadata(&row);
        Ok(row)
    }

    fn entity_hash(&self, row: &Self::Row) -> String {
        row.entity_hash.clone()
    }

    fn key_of(&self, row: &Self::Row) -> String {
        row.tdx_asset_id.clone()
    }

    async fn upsert_batch(&self, pool: &PgPool, rows: &[Self::Row]) -> AppResult<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        let ids: Vec<&str> = rows.iter().map(|r| r.tdx_asset_id.as_str()).collect();
        let names: Vec<Option<&str>> = rows.iter().map(|r| r.name.as_deref()).collect();
        let serial_numbers: Vec<Option<&str>> = rows.iter().map(|r| r.serial_number.as_deref()).collect();
        let status_names: Vec<Option<&str>> = rows.iter().map(|r| r.status_name.as_deref()).collect();
        let owning_customer_ids: Vec<Option<&str>> =
            rows.iter().map(|r| r.owning_customer_id.as_deref()).collect();
        let tags: Vec<Option<&str>> = rows.iter().map(|r| r.tag.as_deref()).collect();
        let mac_addresses: Vec<Option<&str>> = rows.iter().map(|r| r.mac_address.as_deref()).collect();
        let reserved_ips: Vec<Option<&str>> = rows.iter().map(|r| r.reserved_ip.as_deref()).collect();
        let os_ids: Vec<Option<&str>> = rows.iter().map(|r| r.os_id.as_deref()).collect();
        let function_ids: Vec<Option<&str>> = rows.iter().map(|r| r.function_id.as_deref()).collect();
        let financial_owner_uids: Vec<Option<&str>> =
            rows.iter().map(|r| r.financial_owner_uid.as_deref()).collect();
        let support_group_ids: Vec<&Value> = rows.iter().map(|r| &r.support_group_ids).collect();
        let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

        let result = sqlx::query(
            "INSERT INTO silver.tdx_assets \
                 (tdx_asset_id, name, serial_number, status_name, owning_customer_id, tag, \
                  mac_address, reserved_ip, os_id, function_id, financial_owner_uid, \
                  support_group_ids, entity_hash) \
             SELECT * FROM UNNEST( \
                 $1::text[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[], \
                 $7::text[], $8::text[], $9::text[], $10::text[], $11::text[], $12::jsonb[], $13::text[] \
             ) \
             ON CONFLICT (tdx_asset_id) DO UPDATE SET \
                 name = EXCLUDED.name, serial_number = EXCLUDED.serial_number, \
                 status_name = EXCLUDED.status_name, owning_customer_id = EXCLUDED.owning_customer_id, \
                 tag = EXCLUDED.tag, mac_address = EXCLUDED.mac_address, \
                 reserved_ip = EXCLUDED.reserved_ip, os_id = EXCLUDED.os_id, \
                 function_id = EXCLUDED.function_id, financial_owner_uid = EXCLUDED.financial_owner_uid, \
                 support_group_ids = EXCLUDED.support_group_ids, entity_hash = EXCLUDED.entity_hash \
             WHERE silver.tdx_assets.entity_hash != EXCLUDED.entity_hash",
        )
        .bind(&ids)
        .bind(&names)
        .bind(&serial_numbers)
        .bind(&status_names)
        .bind(&owning_customer_ids)
        .bind(&tags)
        .bind(&mac_addresses)
        .bind(&reserved_ips)
        .bind(&os_ids)
        .bind(&function_ids)
        .bind(&financial_owner_uids)
        .bind(&support_group_ids)
        .bind(&entity_hashes)
        .execute(pool)
        .await?;

        counts.upserted = result.rows_affected() as i64;
        counts.skipped_unchanged = rows.len() as i64 - counts.upserted;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn owning_customer_id_sentinel_maps_to_null() {
        let raw = json!({
            "ID": 1,
            "OwningCustomerID": "00000000-0000-0000-0000-000000000000",
            "Attributes": []
        });
        let row = TdxAssetProjector.project(&raw).unwrap();
        assert_eq!(row.owning_customer_id, None);
    }
}

//! Active Directory computer-object projection. `is_enabled` is derived
//! from `userAccountControl` bit 2; `memberOf` normalized to an array.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::db::silver_source::UpsertCounts;
use crate::error::{AppError, AppResult};
use crate::hashing::trim_or_null;
use crate::sources::ldap::{is_enabled_from_uac, to_string_array};
use crate::transform::engine::{entity_hash_excluding_metadata, Projector};
use crate::transform::ou_parser::parse_ou_path;

pub fn basic_fields(raw: &Value) -> BTreeMap<&'static str, Value> {
    let mut map = BTreeMap::new();
    for key in ["dn", "cn", "dNSHostName", "operatingSystem", "userAccountControl", "memberOf"] {
        map.insert(key, raw.get(key).cloned().unwrap_or(Value::Null));
    }
    map
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdComputerRow {
    pub dn: String,
    pub cn: Option<String>,
    pub dns_host_name: Option<String>,
    pub operating_system: Option<String>,
    pub is_enabled: Option<bool>,
    pub member_of: Value,
    pub ou_department: Option<String>,
    pub ou_full_path: Value,
    pub entity_hash: String,
}

pub struct AdComputerProjector;

#[async_trait]
impl Projector for AdComputerProjector {
    type Row = AdComputerRow;

    const TABLE: &'static str = "ad_computers";
    const KEY_COLUMN: &'static str = "dn";
    const ENTITY_TYPE: &'static str = "computer";
    const SOURCE_SYSTEM: &'static str = "ad";

    fn project(&self, raw: &Value) -> AppResult<Self::Row> {
        let dn = raw
            .get("dn")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Projection("AD computer missing dn".into()))?
            .to_string();

        let ou_path = parse_ou_path(&dn, false);
        let uac = raw.get("userAccountControl").and_then(Value::as_i64);
        let member_of = to_string_array(raw.get("memberOf"));

        let mut row = AdComputerRow {
            dn: dn.clone(),
            cn: trim_or_null(raw.get("cn").and_then(Value::as_str)),
            dns_host_name: trim_or_null(raw.get("dNSHostName").and_then(Value::as_str)),
            operating_system: trim_or_null(raw.get("operatingSystem").and_then(Value::as_str)),
            is_enabled: is_enabled_from_uac(uac),
            member_of: Value::Array(member_of.into_iter().map(Value::String).collect()),
            ou_department: ou_path.department.clone(),
            ou_full_path: Value::Array(ou_path.full_path.into_iter().map(Value::String).collect()),
            entity_hash: String::new(),
        };
        row.entity_hash = entity_hash_excluding_metadata(&row);
        Ok(row)
    }

    fn entity_hash(&self, row: &Self::Row) -> String {
        row.entity_hash.clone()
    }

    fn key_of(&self, row: &Self::Row) -> String {
        row.dn.clone()
    }

    async fn upsert_batch(&self, pool: &PgPool, rows: &[Self::Row]) -> AppResult<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        let dns: Vec<&str> = rows.iter().map(|r| r.dn.as_str()).collect();
        let cns: Vec<Option<&str>> = rows.iter().map(|r| r.cn.as_deref()).collect();
        let dns_host_names: Vec<Option<&str>> = rows.iter().map(|r| r.dns_host_name.as_deref()).collect();
        let operating_systems: Vec<Option<&str>> = rows.iter().map(|r| r.operating_system.as_deref()).collect();
        let is_enableds: Vec<Option<bool>> = rows.iter().map(|r| r.is_enabled).collect();
        let member_ofs: Vec<&Value> = rows.iter().map(|r| &r.member_of).collect();
        let ou_departments: Vec<Option<&str>> = rows.iter().map(|r| r.ou_department.as_deref()).collect();
        let ou_full_paths: Vec<&Value> = rows.iter().map(|r| &r.ou_full_path).collect();
        let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

        let result = sqlx::query(
            "INSERT INTO silver.ad_computers \
                 (dn, cn, dns_host_name, operating_system, is_enabled, member_of, \
                  ou_department, ou_full_path, entity_hash) \
             SELECT * FROM UNNEST( \
                 $1::text[], $2::text[], $3::text[], $4::text[], $5::bool[], $6::jsonb[], \
                 $7::text[], $8::jsonb[], $9::text[] \
             ) \
             ON CONFLICT (dn) DO UPDATE SET \
                 cn = EXCLUDED.cn, dns_host_name = EXCLUDED.dns_host_name, \
                 operating_system = EXCLUDED.operating_system, is_enabled = EXCLUDED.is_enabled, \
                 member_of = EXCLUDED.member_of, ou_department = EXCLUDED.ou_department, \
                 ou_full_path = EXCLUDED.ou_full_path, entity_hash = EXCLUDED.entity_hash \
             WHERE silver.ad_computers.entity_hash != EXCLUDED.entity_hash",
        )
        .bind(&dns)
        .bind(&cns)
        .bind(&dns_host_names)
        .bind(&operating_systems)
        .bind(&is_enableds)
        .bind(&member_ofs)
        .bind(&ou_departments)
        .bind(&ou_full_paths)
        .bind(&entity_hashes)
        .execute(pool)
        .await?;

        counts.upserted = result.rows_affected() as i64;
        counts.skipped_unchanged = rows.len() as i64 - counts.upserted;
        Ok(counts)
    }
}

//! Active Directory group projection. `member`/`memberOf`/`owner` are
//! normalized to string arrays since LDAP returns a bare string for
//! single-valued attributes and a list for multi-valued ones.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::db::silver_source::UpsertCounts;
use crate::error::{AppError, AppResult};
use crate::hashing::trim_or_null;
use crate::sources::ldap::to_string_array;
use crate::transform::engine::{entity_hash_excluding_metadata, Projector};
use crate::transform::ou_parser::parse_ou_path;

pub fn basic_fields(raw: &Value) -> BTreeMap<&'static str, Value> {
    let mut map = BTreeMap::new();
    map.insert("dn", raw.get("dn").cloned().unwrap_or(Value::Null));
    map.insert(
        "sAMAccountName",
        raw.get("sAMAccountName").cloned().unwrap_or(Value::Null),
    );
    map.insert("description", raw.get("description").cloned().unwrap_or(Value::Null));
    map.insert("member", raw.get("member").cloned().unwrap_or(Value::Null));
    map.insert("owner", raw.get("owner").cloned().unwrap_or(Value::Null));
    map
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdGroupRow {
    pub dn: String,
    pub sam_account_name: Option<String>,
    pub description: Option<String>,
    pub members: Value,
    pub owners: Value,
    pub ou_root: Option<String>,
    pub ou_full_path: Value,
    pub entity_hash: String,
}

pub struct AdGroupProjector;

#[async_trait]
impl Projector for AdGroupProjector {
    type Row = AdGroupRow;

    const TABLE: &'static str = "ad_groups";
    const KEY_COLUMN: &'static str = "dn";
    const ENTITY_TYPE: &'static str = "group";
    const SOURCE_SYSTEM: &'static str = "ad";

    fn project(&self, raw: &Value) -> AppResult<Self::Row> {
        let dn = raw
            .get("dn")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Projection("AD group missing dn".into()))?
            .to_string();

        let ou_path = parse_ou_path(&dn, false);
        let members = to_string_array(raw.get("member"));
        let owners = to_string_array(raw.get("owner"));

        let mut row = AdGroupRow {
            dn: dn.clone(),
            sam_account_name: trim_or_null(raw.get("sAMAccountName").and_then(Value::as_str)),
            description: trim_or_null(raw.get("description").and_then(Value::as_str)),
            members: Value::Array(members.into_iter().map(Value::String).collect()),
            owners: Value::Array(owners.into_iter().map(Value::String).collect()),
            ou_root: ou_path.root.clone(),
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
        let sam_account_names: Vec<Option<&str>> = rows.iter().map(|r| r.sam_account_name.as_deref()).collect();
        let descriptions: Vec<Option<&str>> = rows.iter().map(|r| r.description.as_deref()).collect();
        let members: Vec<&Value> = rows.iter().map(|r| &r.members).collect();
        let owners: Vec<&Value> = rows.iter().map(|r| &r.owners).collect();
        let ou_roots: Vec<Option<&str>> = rows.iter().map(|r| r.ou_root.as_deref()).collect();
        let ou_full_paths: Vec<&Value> = rows.iter().map(|r| &r.ou_full_path).collect();
        let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

        let result = sqlx::query(
            "INSERT INTO silver.ad_groups \
                 (dn, sam_account_name, description, members, owners, ou_root, ou_full_path, entity_hash) \
             SELECT * FROM UNNEST( \
                 $1::text[], $2::text[], $3::text[], $4::jsonb[], $5::jsonb[], $6::text[], $7::jsonb[], $8::text[] \
             ) \
             ON CONFLICT (dn) DO UPDATE SET \
                 sam_account_name = EXCLUDED.sam_account_name, description = EXCLUDED.description, \
                 members = EXCLUDED.members, owners = EXCLUDED.owners, ou_root = EXCLUDED.ou_root, \
                 ou_full_path = EXCLUDED.ou_full_path, entity_hash = EXCLUDED.entity_hash \
             WHERE silver.ad_groups.entity_hash != EXCLUDED.entity_hash",
        )
        .bind(&dns)
        .bind(&sam_account_names)
        .bind(&descriptions)
        .bind(&members)
        .bind(&owners)
        .bind(&ou_roots)
        .bind(&ou_full_paths)
        .bind(&entity_hashes)
        .execute(pool)
        .await?;

        counts.upserted = result.rows_affected() as i64;
        counts.skipped_unchanged = rows.len() as i64 - counts.upserted;
        Ok(counts)
    }
}

//! MCommunity group projection. Unlike AD, MCommunity distinguishes
//! `members` (may include nested-group expansion) from `direct_members` —
//! the relationship extractor uses the distinction to decide which
//! members are direct group-membership edges.

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

pub fn basic_fields(raw: &Value) -> BTreeMap<&'static str, Value> {
    let mut map = BTreeMap::new();
    for key in ["dn", "cn", "description", "member", "umichDirectMember", "owner"] {
        map.insert(key, raw.get(key).cloned().unwrap_or(Value::Null));
    }
    map
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct McommunityGroupRow {
    pub dn: String,
    pub cn: Option<String>,
    pub description: Option<String>,
    pub members: Value,
    pub direct_members: Value,
    pub owners: Value,
    pub entity_hash: String,
}

pub struct McommunityGroupProjector;

#[async_trait]
impl Projector for McommunityGroupProjector {
    type Row = McommunityGroupRow;

    const TABLE: &'static str = "mcommunity_groups";
    const KEY_COLUMN: &'static str = "dn";
    const ENTITY_TYPE: &'static str = "group";
    const SOURCE_SYSTEM: &'static str = "mcommunity";

    fn project(&self, raw: &Value) -> AppResult<Self::Row> {
        let dn = raw
            .get("dn")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Projection("MCommunity group missing dn".into()))?
            .to_string();

        let members = to_string_array(raw.get("member"));
        let direct_members = to_string_array(raw.get("umichDirectMember"));
        let owners = to_string_array(raw.get("owner"));

        let mut row = McommunityGroupRow {
            dn: dn.clone(),
            cn: trim_or_null(raw.get("cn").and_then(Value::as_str)),
            description: trim_or_null(raw.get("description").and_then(Value::as_str)),
            members: Value::Array(members.into_iter().map(Value::String).collect()),
            direct_members: Value::Array(direct_members.into_iter().map(Value::String).collect()),
            owners: Value::Array(owners.into_iter().map(Value::String).collect()),
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
        let descriptions: Vec<Option<&str>> = rows.iter().map(|r| r.description.as_deref()).collect();
        let members: Vec<&Value> = rows.iter().map(|r| &r.members).collect();
        let direct_members: Vec<&Value> = rows.iter().map(|r| &r.direct_members).collect();
        let owners: Vec<&Value> = rows.iter().map(|r| &r.owners).collect();
        let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

        let result = sqlx::query(
            "INSERT INTO silver.mcommunity_groups \
                 (dn, cn, description, members, direct_members, owners, entity_hash) \
             SELECT * FROM UNNEST( \
                 $1::text[], $2::text[], $3::text[], $4::jsonb[], $5::jsonb[], $6::jsonb[], $7::text[] \
             ) \
             ON CONFLICT (dn) DO UPDATE SET \
                 cn = EXCLUDED.cn, description = EXCLUDED.description, members = EXCLUDED.members, \
                 direct_members = EXCLUDED.direct_members, owners = EXCLUDED.owners, \
                 entity_hash = EXCLUDED.entity_hash \
             WHERE silver.mcommunity_groups.entity_hash != EXCLUDED.entity_hash",
        )
        .bind(&dns)
        .bind(&cns)
        .bind(&descriptions)
        .bind(&members)
        .bind(&direct_members)
        .bind(&owners)
        .bind(&entity_hashes)
        .execute(pool)
        .await?;

        counts.upserted = result.rows_affected() as i64;
        counts.skipped_unchanged = rows.len() as i64 - counts.upserted;
        Ok(counts)
    }
}

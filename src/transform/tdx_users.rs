//! TDX user projection. Representative field set (not TDX's full ~65-column
//! schema — see DESIGN.md) preserving the table-driven whitelist discipline.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::db::silver_source::UpsertCounts;
use crate::error::{AppError, AppResult};
use crate::hashing::trim_or_null;
use crate::transform::engine::{entity_hash_excluding_metadata, Projector};

pub fn basic_fields(raw: &Value) -> BTreeMap<&'static str, Value> {
    let mut map = BTreeMap::new();
    for key in [
        "UID",
        "Username",
        "FirstName",
        "LastName",
        "PrimaryEmail",
        "IsActive",
        "DefaultAccountID",
        "TypeID",
        "SecurityRoleName",
        "Title",
    ] {
        map.insert(key, raw.get(key).cloned().unwrap_or(Value::Null));
    }
    map
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TdxUserRow {
    pub tdx_user_uid: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub primary_email: Option<String>,
    pub is_active: Option<bool>,
    pub default_account_id: Option<String>,
    pub type_id: Option<i64>,
    pub security_role_name: Option<String>,
    pub job_title: Option<String>,
    pub entity_hash: String,
}

pub struct TdxUserProjector;

#[async_trait]
impl Projector for TdxUserProjector {
    type Row = TdxUserRow;

    const TABLE: &'static str = "tdx_users";
    const KEY_COLUMN: &'static str = "tdx_user_uid";
    const ENTITY_TYPE: &'static str = "user";
    const SOURCE_SYSTEM: &'static str = "tdx";

    fn project(&self, raw: &Value) -> AppResult<Self::Row> {
        let uid = raw
            .get("UID")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Projection("TDX user missing UID".into()))?
            .to_string();

        let mut row = TdxUserRow {
            tdx_user_uid: uid,
            username: trim_or_null(raw.get("Username").and_then(Value::as_str)),
            first_name: trim_or_null(raw.get("FirstName").and_then(Value::as_str)),
            last_name: trim_or_null(raw.get("LastName").and_then(Value::as_str)),
            primary_email: trim_or_null(raw.get("PrimaryEmail").and_then(Value::as_str)),
            is_active: raw.get("IsActive").and_then(Value::as_bool),
            default_account_id: raw.get("DefaultAccountID").map(|v| v.to_string()),
            type_id: raw.get("TypeID").and_then(Value::as_i64),
            security_role_name: trim_or_null(raw.get("SecurityRoleName").and_then(Value::as_str)),
            job_title: trim_or_null(raw.get("Title").and_then(Value::as_str)),
            entity_hash: String::new(),
        };
        row.entity_hash = entity_hash_excluding_metadata(&row);
        Ok(row)
    }

    fn entity_hash(&self, row: &Self::Row) -> String {
        row.entity_hash.clone()
    }

    fn key_of(&self, row: &Self::Row) -> String {
        row.tdx_user_uid.clone()
    }

    async fn upsert_batch(&self, pool: &PgPool, rows: &[Self::Row]) -> AppResult<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        let uids: Vec<&str> = rows.iter().map(|r| r.tdx_user_uid.as_str()).collect();
        let usernames: Vec<Option<&str>> = rows.iter().map(|r| r.username.as_deref()).collect();
        let first_names: Vec<Option<&str>> = rows.iter().map(|r| r.first_name.as_deref()).collect();
        let last_names: Vec<Option<&str>> = rows.iter().map(|r| r.last_name.as_deref()).collect();
        let primary_emails: Vec<Option<&str>> = rows.iter().map(|r| r.primary_email.as_deref()).collect();
        let is_actives: Vec<Option<bool>> = rows.iter().map(|r| r.is_active).collect();
        let default_account_ids: Vec<Option<&str>> =
            rows.iter().map(|r| r.default_account_id.as_deref()).collect();
        let type_ids: Vec<Option<i64>> = rows.iter().map(|r| r.type_id).collect();
        let security_role_names: Vec<Option<&str>> =
            rows.iter().map(|r| r.security_role_name.as_deref()).collect();
        let job_titles: Vec<Option<&str>> = rows.iter().map(|r| r.job_title.as_deref()).collect();
        let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

        let result = sqlx::query(
            "INSERT INTO silver.tdx_users \
                 (tdx_user_uid, username, first_name, last_name, primary_email, is_active, \
                  default_account_id, type_id, security_role_name, job_title, entity_hash) \
             SELECT * FROM UNNEST( \
                 $1::text[], $2::text[], $3::text[], $4::text[], $5::text[], $6::bool[], \
                 $7::text[], $8::bigint[], $9::text[], $10::text[], $11::text[] \
             ) \
             ON CONFLICT (tdx_user_uid) DO UPDATE SET \
                 username = EXCLUDED.username, first_name = EXCLUDED.first_name, \
                 last_name = EXCLUDED.last_name, primary_email = EXCLUDED.primary_email, \
                 is_active = EXCLUDED.is_active, default_account_id = EXCLUDED.default_account_id, \
                 type_id = EXCLUDED.type_id, security_role_name = EXCLUDED.security_role_name, \
                 job_title = EXCLUDED.job_title, entity_hash = EXCLUDED.entity_hash \
             WHERE silver.tdx_users.entity_hash != EXCLUDED.entity_hash",
        )
        .bind(&uids)
        .bind(&usernames)
        .bind(&first_names)
        .bind(&last_names)
        .bind(&primary_emails)
        .bind(&is_actives)
        .bind(&default_account_ids)
        .bind(&type_ids)
        .bind(&security_role_names)
        .bind(&job_titles)
        .bind(&entity_hashes)
        .execute(pool)
        .await?;

        counts.upserted = result.rows_affected() as i64;
        counts.skipped_unchanged = rows.len() as i64 - counts.upserted;
        Ok(counts)
    }
}

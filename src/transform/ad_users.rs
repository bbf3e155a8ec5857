//! Active Directory user-object projection — `is_enabled` from
//! `userAccountControl`, used by user consolidation as the AD source.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::db::silver_source::UpsertCounts;
use crate::error::{AppError, AppResult};
use crate::hashing::trim_or_null;
use crate::sources::ldap::is_enabled_from_uac;
use crate::transform::engine::{entity_hash_excluding_metadata, Projector};

pub fn basic_fields(raw: &Value) -> BTreeMap<&'static str, Value> {
    let mut map = BTreeMap::new();
    for key in [
        "dn",
        "sAMAccountName",
        "givenName",
        "sn",
        "mail",
        "displayName",
        "userAccountControl",
    ] {
        map.insert(key, raw.get(key).cloned().unwrap_or(Value::Null));
    }
    map
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdUserRow {
    pub dn: String,
    pub sam_account_name: Option<String>,
    pub given_name: Option<String>,
    pub sn: Option<String>,
    pub mail: Option<String>,
    pub display_name: Option<String>,
    pub account_disabled: Option<bool>,
    pub entity_hash: String,
}

pub struct AdUserProjector;

#[async_trait]
impl Projector for AdUserProjector {
    type Row = AdUserRow;

    const TABLE: &'static str = "ad_users";
    const KEY_COLUMN: &'static str = "dn";
    const ENTITY_TYPE: &'static str = "user";
    const SOURCE_SYSTEM: &'static str = "ad";

    fn project(&self, raw: &Value) -> AppResult<Self::Row> {
        let dn = raw
            .get("dn")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Projection("AD user missing dn".into()))?
            .to_string();
        let uac = raw.get("userAccountControl").and_then(Value::as_i64);

        let mut row = AdUserRow {
            dn,
            sam_account_name: trim_or_null(raw.get("sAMAccountName").and_then(Value::as_str)),
            given_name: trim_or_null(raw.get("givenName").and_then(Value::as_str)),
            sn: trim_or_null(raw.get("sn").and_then(Value::as_str)),
            mail: trim_or_null(raw.get("mail").and_then(Value::as_str)),
            display_name: trim_or_null(raw.get("displayName").and_then(Value::as_str)),
            account_disabled: is_enabled_from_uac(uac).map(|enabled| !enabled),
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
        let given_names: Vec<Option<&str>> = rows.iter().map(|r| r.given_name.as_deref()).collect();
        let sns: Vec<Option<&str>> = rows.iter().map(|r| r.sn.as_deref()).collect();
        let mails: Vec<Option<&str>> = rows.iter().map(|r| r.mail.as_deref()).collect();
        let display_names: Vec<Option<&str>> = rows.iter().map(|r| r.display_name.as_deref()).collect();
        let account_disableds: Vec<Option<bool>> = rows.iter().map(|r| r.account_disabled).collect();
        let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

        let result = sqlx::query(
            "INSERT INTO silver.ad_users \
                 (dn, sam_account_name, given_name, sn, mail, display_name, account_disabled, entity_hash) \
             SELECT * FROM UNNEST( \
                 $1::text[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[], $7::bool[], $8::text[] \
             ) \
             ON CONFLICT (dn) DO UPDATE SET \
                 sam_account_name = EXCLUDED.sam_account_name, given_name = EXCLUDED.given_name, \
                 sn = EXCLUDED.sn, mail = EXCLUDED.mail, display_name = EXCLUDED.display_name, \
                 account_disabled = EXCLUDED.account_disabled, entity_hash = EXCLUDED.entity_hash \
             WHERE silver.ad_users.entity_hash != EXCLUDED.entity_hash",
        )
        .bind(&dns)
        .bind(&sam_account_names)
        .bind(&given_names)
        .bind(&sns)
        .bind(&mails)
        .bind(&display_names)
        .bind(&account_disableds)
        .bind(&entity_hashes)
        .execute(pool)
        .await?;

        counts.upserted = result.rows_affected() as i64;
        counts.skipped_unchanged = rows.len() as i64 - counts.upserted;
        Ok(counts)
    }
}

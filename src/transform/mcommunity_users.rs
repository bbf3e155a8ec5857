//! MCommunity person-entry projection — display name, job title
//! (`umichTitle`), and affiliation OUs, consumed by user consolidation.

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
    for key in [
        "dn",
        "givenName",
        "displayName",
        "mail",
        "telephoneNumber",
        "umichTitle",
        "ou",
    ] {
        map.insert(key, raw.get(key).cloned().unwrap_or(Value::Null));
    }
    map
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct McommunityUserRow {
    pub dn: String,
    pub given_name: Option<String>,
    pub display_name: Option<String>,
    pub mail: Option<String>,
    pub telephone_number: Option<String>,
    pub job_title: Option<String>,
    pub affiliations: Value,
    pub entity_hash: String,
}

pub struct McommunityUserProjector;

#[async_trait]
impl Projector for McommunityUserProjector {
    type Row = McommunityUserRow;

    const TABLE: &'static str = "mcommunity_users";
    const KEY_COLUMN: &'static str = "dn";
    const ENTITY_TYPE: &'static str = "user";
    const SOURCE_SYSTEM: &'static str = "mcommunity";

    fn project(&self, raw: &Value) -> AppResult<Self::Row> {
        let dn = raw
            .get("dn")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Projection("MCommunity user missing dn".into()))?
            .to_string();

        let mut row = McommunityUserRow {
            dn,
            given_name: trim_or_null(raw.get("givenName").and_then(Value::as_str)),
            display_name: trim_or_null(raw.get("displayName").and_then(Value::as_str)),
            mail: trim_or_null(raw.get("mail").and_then(Value::as_str)),
            telephone_number: trim_or_null(raw.get("telephoneNumber").and_then(Value::as_str)),
            job_title: trim_or_null(raw.get("umichTitle").and_then(Value::as_str)),
            affiliations: Value::Array(to_string_array(raw.get("ou")).into_iter().map(Value::String).collect()),
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
        let given_names: Vec<Option<&str>> = rows.iter().map(|r| r.given_name.as_deref()).collect();
        let display_names: Vec<Option<&str>> = rows.iter().map(|r| r.display_name.as_deref()).collect();
        let mails: Vec<Option<&str>> = rows.iter().map(|r| r.mail.as_deref()).collect();
        let telephone_numbers: Vec<Option<&str>> = rows.iter().map(|r| r.telephone_number.as_deref()).collect();
        let job_titles: Vec<Option<&str>> = rows.iter().map(|r| r.job_title.as_deref()).collect();
        let affiliations: Vec<&Value> = rows.iter().map(|r| &r.affiliations).collect();
        let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

        let result = sqlx::query(
            "INSERT INTO silver.mcommunity_users \
                 (dn, given_name, display_name, mail, telephone_number, job_title, affiliations, entity_hash) \
             SELECT * FROM UNNEST( \
                 $1::text[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[], $7::jsonb[], $8::text[] \
             ) \
             ON CONFLICT (dn) DO UPDATE SET \
                 given_name = EXCLUDED.given_name, display_name = EXCLUDED.display_name, \
                 mail = EXCLUDED.mail, telephone_number = EXCLUDED.telephone_number, \
                 job_title = EXCLUDED.job_title, affiliations = EXCLUDED.affiliations, \
                 entity_hash = EXCLUDED.entity_hash \
             WHERE silver.mcommunity_users.entity_hash != EXCLUDED.entity_hash",
        )
        .bind(&dns)
        .bind(&given_names)
        .bind(&display_names)
        .bind(&mails)
        .bind(&telephone_numbers)
        .bind(&job_titles)
        .bind(&affiliations)
        .bind(&entity_hashes)
        .execute(pool)
        .await?;

        counts.upserted = result.rows_affected() as i64;
        counts.skipped_unchanged = rows.len() as i64 - counts.upserted;
        Ok(counts)
    }
}

//! Lab-awards CSV projection. Near-identity mapping — the composite
//! external_id is already built at ingestion time, so this
//! projector mainly types and trims the CSV's already-tolerant-parsed
//! values.

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
        "AwardID",
        "PersonUniqname",
        "PersonApptDeptID",
        "AwardTitle",
        "SponsorName",
        "AwardAmount",
        "PersonRole",
    ] {
        map.insert(key, raw.get(key).cloned().unwrap_or(Value::Null));
    }
    map
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LabAwardRow {
    pub award_key: String,
    pub award_id: Option<String>,
    pub person_uniqname: Option<String>,
    pub person_appt_dept_id: Option<String>,
    pub award_title: Option<String>,
    pub sponsor_name: Option<String>,
    pub award_amount: Option<f64>,
    pub person_role: Option<String>,
    pub entity_hash: String,
}

pub struct LabAwardProjector;

fn string_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key) {
        Some(Value::String(s)) => trim_or_null(Some(s)),
        Some(other) if !other.is_null() => Some(other.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Projector for LabAwardProjector {
    type Row = LabAwardRow;

    const TABLE: &'static str = "lab_awards";
    const KEY_COLUMN: &'static str = "award_key";
    const ENTITY_TYPE: &'static str = "lab_award";
    const SOURCE_SYSTEM: &'static str = "lab_awards_csv";

    fn project(&self, raw: &Value) -> AppResult<Self::Row> {
        let award_id = string_field(raw, "AwardID")
            .ok_or_else(|| AppError::Projection("lab award missing AwardID".into()))?;
        let uniqname = string_field(raw, "PersonUniqname")
            .ok_or_else(|| AppError::Projection("lab award missing PersonUniqname".into()))?;
        let dept_id = string_field(raw, "PersonApptDeptID")
            .ok_or_else(|| AppError::Projection("lab award missing PersonApptDeptID".into()))?;

        let mut row = LabAwardRow {
            award_key: format!("{award_id}-{uniqname}-{dept_id}"),
            award_id: Some(award_id),
            person_uniqname: Some(uniqname),
            person_appt_dept_id: Some(dept_id),
            award_title: string_field(raw, "AwardTitle"),
            sponsor_name: string_field(raw, "SponsorName"),
            award_amount: raw.get("AwardAmount").and_then(Value::as_f64),
            person_role: string_field(raw, "PersonRole"),
            entity_hash: String::new(),
        };
        row.entity_hash = entity_hash_excluding_metadata(&row);
        Ok(row)
    }

    fn entity_hash(&self, row: &Self::Row) -> String {
        row.entity_hash.clone()
    }

    fn key_of(&self, row: &Self::Row) -> String {
        row.award_key.clone()
    }

    async fn upsert_batch(&self, pool: &PgPool, rows: &[Self::Row]) -> AppResult<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        let award_keys: Vec<&str> = rows.iter().map(|r| r.award_key.as_str()).collect();
        let award_ids: Vec<Option<&str>> = rows.iter().map(|r| r.award_id.as_deref()).collect();
        let person_uniqnames: Vec<Option<&str>> = rows.iter().map(|r| r.person_uniqname.as_deref()).collect();
        let person_appt_dept_ids: Vec<Option<&str>> =
            rows.iter().map(|r| r.person_appt_dept_id.as_deref()).collect();
        let award_titles: Vec<Option<&str>> = rows.iter().map(|r| r.award_title.as_deref()).collect();
        let sponsor_names: Vec<Option<&str>> = rows.iter().map(|r| r.sponsor_name.as_deref()).collect();
        let award_amounts: Vec<Option<f64>> = rows.iter().map(|r| r.award_amount).collect();
        let person_roles: Vec<Option<&str>> = rows.iter().map(|r| r.person_role.as_deref()).collect();
        let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

        let result = sqlx::query(
            "INSERT INTO silver.lab_awards \
                 (award_key, award_id, person_uniqname, person_appt_dept_id, award_title, \
                  sponsor_name, award_amount, person_role, entity_hash) \
             SELECT * FROM UNNEST( \
                 $1::text[], $2::text[], $3::text[], $4::text[], $5::text[], \
                 $6::text[], $7::float8[], $8::text[], $9::text[] \
             ) \
             ON CONFLICT (award_key) DO UPDATE SET \
                 award_id = EXCLUDED.award_id, person_uniqname = EXCLUDED.person_uniqname, \
                 person_appt_dept_id = EXCLUDED.person_appt_dept_id, award_title = EXCLUDED.award_title, \
                 sponsor_name = EXCLUDED.sponsor_name, award_amount = EXCLUDED.award_amount, \
                 person_role = EXCLUDED.person_role, entity_hash = EXCLUDED.entity_hash \
             WHERE silver.lab_awards.entity_hash != EXCLUDED.entity_hash",
        )
        .bind(&award_keys)
        .bind(&award_ids)
        .bind(&person_uniqnames)
        .bind(&person_appt_dept_ids)
        .bind(&award_titles)
        .bind(&sponsor_names)
        .bind(&award_amounts)
        .bind(&person_roles)
        .bind(&entity_hashes)
        .execute(pool)
        .await?;

        counts.upserted = result.rows_affected() as i64;
        counts.skipped_unchanged = rows.len() as i64 - counts.upserted;
        Ok(counts)
    }
}

//! Institutional identity API employment-record projection. One row per
//! `empl_rcd`; aggregation across multiple records for the same uniqname
//! happens in user consolidation, not here.

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
        "uniqname",
        "empl_rcd",
        "first_name",
        "last_name",
        "job_title",
        "department_id",
        "department_name",
        "work_location",
    ] {
        map.insert(key, raw.get(key).cloned().unwrap_or(Value::Null));
    }
    map
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UmapiEmploymentRow {
    pub employment_key: String,
    pub uniqname: Option<String>,
    pub empl_rcd: Option<i32>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub job_title: Option<String>,
    pub department_id: Option<String>,
    pub department_name: Option<String>,
    pub work_location: Value,
    pub entity_hash: String,
}

pub struct UmapiEmploymentProjector;

#[async_trait]
impl Projector for UmapiEmploymentProjector {
    type Row = UmapiEmploymentRow;

    const TABLE: &'static str = "umapi_employment_records";
    const KEY_COLUMN: &'static str = "employment_key";
    const ENTITY_TYPE: &'static str = "user";
    const SOURCE_SYSTEM: &'static str = "identity_api";

    fn project(&self, raw: &Value) -> AppResult<Self::Row> {
        let uniqname = raw
            .get("uniqname")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Projection("identity API employment record missing uniqname".into()))?
            .to_string();
        let empl_rcd = raw.get("empl_rcd").and_then(Value::as_i64).unwrap_or(0);

        let mut row = UmapiEmploymentRow {
            employment_key: format!("{uniqname}-{empl_rcd}"),
            uniqname: Some(uniqname),
            empl_rcd: Some(empl_rcd as i32),
            first_name: trim_or_null(raw.get("first_name").and_then(Value::as_str)),
            last_name: trim_or_null(raw.get("last_name").and_then(Value::as_str)),
            job_title: trim_or_null(raw.get("job_title").and_then(Value::as_str)),
            department_id: raw.get("department_id").and_then(Value::as_str).map(str::to_string),
            department_name: trim_or_null(raw.get("department_name").and_then(Value::as_str)),
            work_location: raw.get("work_location").cloned().unwrap_or(Value::Null),
            entity_hash: String::new(),
        };
        row.entity_hash = entity_hash_excluding_metadata(&row);
        Ok(row)
    }

    fn entity_hash(&self, row: &Self::Row) -> String {
        row.entity_hash.clone()
    }

    fn key_of(&self, row: &Self::Row) -> String {
        row.employment_key.clone()
    }

    async fn upsert_batch(&self, pool: &PgPool, rows: &[Self::Row]) -> AppResult<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        let employment_keys: Vec<&str> = rows.iter().map(|r| r.employment_key.as_str()).collect();
        let uniqnames: Vec<Option<&str>> = rows.iter().map(|r| r.uniqname.as_deref()).collect();
        let empl_rcds: Vec<Option<i32>> = rows.iter().map(|r| r.empl_rcd).collect();
        let first_names: Vec<Option<&str>> = rows.iter().map(|r| r.first_name.as_deref()).collect();
        let last_names: Vec<Option<&str>> = rows.iter().map(|r| r.last_name.as_deref()).collect();
        let job_titles: Vec<Option<&str>> = rows.iter().map(|r| r.job_title.as_deref()).collect();
        let department_ids: Vec<Option<&str>> = rows.iter().map(|r| r.department_id.as_deref()).collect();
        let department_names: Vec<Option<&str>> = rows.iter().map(|r| r.department_name.as_deref()).collect();
        let work_locations: Vec<&Value> = rows.iter().map(|r| &r.work_location).collect();
        let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

        let result = sqlx::query(
            "INSERT INTO silver.umapi_employment_records \
                 (employment_key, uniqname, empl_rcd, first_name, last_name, job_title, \
                  department_id, department_name, work_location, entity_hash) \
             SELECT * FROM UNNEST( \
                 $1::text[], $2::text[], $3::int[], $4::text[], $5::text[], $6::text[], \
                 $7::text[], $8::text[], $9::jsonb[], $10::text[] \
             ) \
             ON CONFLICT (employment_key) DO UPDATE SET \
                 uniqname = EXCLUDED.uniqname, empl_rcd = EXCLUDED.empl_rcd, \
                 first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name, \
                 job_title = EXCLUDED.job_title, department_id = EXCLUDED.department_id, \
                 department_name = EXCLUDED.department_name, work_location = EXCLUDED.work_location, \
                 entity_hash = EXCLUDED.entity_hash \
             WHERE silver.umapi_employment_records.entity_hash != EXCLUDED.entity_hash",
        )
        .bind(&employment_keys)
        .bind(&uniqnames)
        .bind(&empl_rcds)
        .bind(&first_names)
        .bind(&last_names)
        .bind(&job_titles)
        .bind(&department_ids)
        .bind(&department_names)
        .bind(&work_locations)
        .bind(&entity_hashes)
        .execute(pool)
        .await?;

        counts.upserted = result.rows_affected() as i64;
        counts.skipped_unchanged = rows.len() as i64 - counts.upserted;
        Ok(counts)
    }
}

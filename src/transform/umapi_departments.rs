//! Institutional identity API department projection — campus/college/VP-area
//! fields that TDX does not carry, consumed by department consolidation.

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
    for key in ["DeptID", "Description", "Campus", "College", "VpArea"] {
        map.insert(key, raw.get(key).cloned().unwrap_or(Value::Null));
    }
    map
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UmapiDepartmentRow {
    pub dept_id: String,
    pub description: Option<String>,
    pub campus: Option<String>,
    pub college: Option<String>,
    pub vp_area: Option<String>,
    pub entity_hash: String,
}

pub struct UmapiDepartmentProjector;

#[async_trait]
impl Projector for UmapiDepartmentProjector {
    type Row = UmapiDepartmentRow;

    const TABLE: &'static str = "umapi_departments";
    const KEY_COLUMN: &'static str = "dept_id";
    const ENTITY_TYPE: &'static str = "department";
    const SOURCE_SYSTEM: &'static str = "identity_api";

    fn project(&self, raw: &Value) -> AppResult<Self::Row> {
        let dept_id = raw
            .get("DeptID")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Projection("identity API department missing DeptID".into()))?
            .to_string();

        let mut row = UmapiDepartmentRow {
            dept_id,
            description: trim_or_null(raw.get("Description").and_then(Value::as_str)),
            campus: trim_or_null(raw.get("Campus").and_then(Value::as_str)),
            college: trim_or_null(raw.get("College").and_then(Value::as_str)),
            vp_area: trim_or_null(raw.get("VpArea").and_then(Value::as_str)),
            entity_hash: String::new(),
        };
        row.entity_hash = entity_hash_excluding_metadata(&row);
        Ok(row)
    }

    fn entity_hash(&self, row: &Self::Row) -> String {
        row.entity_hash.clone()
    }

    fn key_of(&self, row: &Self::Row) -> String {
        row.dept_id.clone()
    }

    async fn upsert_batch(&self, pool: &PgPool, rows: &[Self::Row]) -> AppResult<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        let dept_ids: Vec<&str> = rows.iter().map(|r| r.dept_id.as_str()).collect();
        let descriptions: Vec<Option<&str>> = rows.iter().map(|r| r.description.as_deref()).collect();
        let campuses: Vec<Option<&str>> = rows.iter().map(|r| r.campus.as_deref()).collect();
        let colleges: Vec<Option<&str>> = rows.iter().map(|r| r.college.as_deref()).collect();
        let vp_areas: Vec<Option<&str>> = rows.iter().map(|r| r.vp_area.as_deref()).collect();
        let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

        let result = sqlx::query(
            "INSERT INTO silver.umapi_departments \
                 (dept_id, description, campus, college, vp_area, entity_hash) \
             SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[]) \
             ON CONFLICT (dept_id) DO UPDATE SET \
                 description = EXCLUDED.description, campus = EXCLUDED.campus, \
                 college = EXCLUDED.college, vp_area = EXCLUDED.vp_area, \
                 entity_hash = EXCLUDED.entity_hash \
             WHERE silver.umapi_departments.entity_hash != EXCLUDED.entity_hash",
        )
        .bind(&dept_ids)
        .bind(&descriptions)
        .bind(&campuses)
        .bind(&colleges)
        .bind(&vp_areas)
        .bind(&entity_hashes)
        .execute(pool)
        .await?;

        counts.upserted = result.rows_affected() as i64;
        counts.skipped_unchanged = rows.len() as i64 - counts.upserted;
        Ok(counts)
    }
}

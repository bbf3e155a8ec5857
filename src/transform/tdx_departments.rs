//! TDX department projection. Field whitelist grounded on the original
//! `_calculate_department_content_hash` significant-field set.

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
    map.insert("ID", raw.get("ID").cloned().unwrap_or(Value::Null));
    map.insert("Name", trimmed(raw, "Name"));
    map.insert("Code", trimmed(raw, "Code"));
    map.insert("Notes", trimmed(raw, "Notes"));
    map.insert("IsActive", raw.get("IsActive").cloned().unwrap_or(Value::Null));
    map.insert("ParentID", raw.get("ParentID").cloned().unwrap_or(Value::Null));
    map.insert("ManagerUID", raw.get("ManagerUID").cloned().unwrap_or(Value::Null));
    map
}

/// Detail-only field the per-department TDX endpoint adds: `Attributes`,
/// a custom-field array the list endpoint omits.
pub fn detail_fields(detail: &Value) -> BTreeMap<&'static str, Value> {
    let mut map = BTreeMap::new();
    map.insert("Attributes", detail.get("Attributes").cloned().unwrap_or(Value::Array(vec![])));
    map
}

fn trimmed(raw: &Value, key: &str) -> Value {
    match trim_or_null(raw.get(key).and_then(Value::as_str)) {
        Some(v) => Value::String(v),
        None => Value::Null,
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TdxDepartmentRow {
    pub tdx_department_id: String,
    pub name: Option<String>,
    pub code: Option<String>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
    pub parent_id: Option<String>,
    pub manager_uid: Option<String>,
    pub entity_hash: String,
}

pub struct TdxDepartmentProjector;

#[async_trait]
impl Projector for TdxDepartmentProjector {
    type Row = TdxDepartmentRow;

    const TABLE: &'static str = "tdx_departments";
    const KEY_COLUMN: &'static str = "tdx_department_id";
    const ENTITY_TYPE: &'static str = "department";
    const SOURCE_SYSTEM: &'static str = "tdx";

    fn project(&self, raw: &Value) -> AppResult<Self::Row> {
        let id = raw
            .get("ID")
            .ok_or_else(|| AppError::Projection("TDX department missing ID".into()))?
            .to_string();

        let mut row = TdxDepartmentRow {
            tdx_department_id: id,
            name: trim_or_null(raw.get("Name").and_then(Value::as_str)),
            code: trim_or_null(raw.get("Code").and_then(Value::as_str)),
            notes: trim_or_null(raw.get("Notes").and_then(Value::as_str)),
            is_active: raw.get("IsActive").and_then(Value::as_bool),
            parent_id: raw.get("ParentID").map(|v| v.to_string()),
            manager_uid: raw.get("ManagerUID").and_then(Value::as_str).map(str::to_string),
            entity_hash: String::new(),
        };
        row.entity_hash = entity_hash_excluding_metadata(&row);
        Ok(row)
    }

    fn entity_hash(&self, row: &Self::Row) -> String {
        row.entity_hash.clone()
    }

    fn key_of(&self, row: &Self::Row) -> String {
        row.tdx_department_id.clone()
    }

    async fn upsert_batch(&self, pool: &PgPool, rows: &[Self::Row]) -> AppResult<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        let ids: Vec<&str> = rows.iter().map(|r| r.tdx_department_id.as_str()).collect();
        let names: Vec<Option<&str>> = rows.iter().map(|r| r.name.as_deref()).collect();
        let codes: Vec<Option<&str>> = rows.iter().map(|r| r.code.as_deref()).collect();
        let notes: Vec<Option<&str>> = rows.iter().map(|r| r.notes.as_deref()).collect();
        let is_actives: Vec<Option<bool>> = rows.iter().map(|r| r.is_active).collect();
        let parent_ids: Vec<Option<&str>> = rows.iter().map(|r| r.parent_id.as_deref()).collect();
        let manager_uids: Vec<Option<&str>> = rows.iter().map(|r| r.manager_uid.as_deref()).collect();
        let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

        let result = sqlx::query(
            "INSERT INTO silver.tdx_departments \
                 (tdx_department_id, name, code, notes, is_active, parent_id, manager_uid, entity_hash) \
             SELECT * FROM UNNEST( \
                 $1::text[], $2::text[], $3::text[], $4::text[], $5::bool[], $6::text[], $7::text[], $8::text[] \
             ) \
             ON CONFLICT (tdx_department_id) DO UPDATE SET \
                 name = EXCLUDED.name, code = EXCLUDED.code, notes = EXCLUDED.notes, \
                 is_active = EXCLUDED.is_active, parent_id = EXCLUDED.parent_id, \
                 manager_uid = EXCLUDED.manager_uid, entity_hash = EXCLUDED.entity_hash \
             WHERE silver.tdx_departments.entity_hash != EXCLUDED.entity_hash",
        )
        .bind(&ids)
        .bind(&names)
        .bind(&codes)
        .bind(&notes)
        .bind(&is_actives)
        .bind(&parent_ids)
        .bind(&manager_uids)
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
    fn basic_fields_excludes_modified_date() {
        let raw = json!({"ID": 1, "Name": "Bio", "ModifiedDate": "2024-01-01T00:00:00Z"});
        let fields = basic_fields(&raw);
        assert!(!fields.contains_key("ModifiedDate"));
        assert_eq!(fields.get("Name"), Some(&json!("Bio")));
    }

    #[test]
    fn project_rejects_missing_id() {
        let projector = TdxDepartmentProjector;
        let err = projector.project(&json!({"Name": "No ID"})).unwrap_err();
        assert!(matches!(err, AppError::Projection(_)));
    }
}

//! Department consolidation: TDX is the hierarchy/manager source of
//! truth; the identity API is the campus/college/VP-area source of truth.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgPool;

use crate::consolidate::precedence::join_non_null;
use crate::db::silver_consolidated;
use crate::error::AppResult;
use crate::hashing::entity_hash;
use crate::run_ledger::{self, RunCounts};
use crate::transform::tdx_departments::TdxDepartmentRow;
use crate::transform::umapi_departments::UmapiDepartmentRow;

const ENTITY_TYPE: &str = "department";
const SOURCE_SYSTEM: &str = "consolidated";

#[derive(Debug, Default, Clone)]
pub struct ConsolidateStats {
    pub candidates: i64,
    pub upserted: i64,
    pub skipped_unchanged: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConsolidatedDepartmentRow {
    pub department_id: String,
    pub name: Option<String>,
    pub code: Option<String>,
    pub campus: Option<String>,
    pub college: Option<String>,
    pub vp_area: Option<String>,
    pub manager_uid: Option<String>,
    pub parent_id: Option<String>,
    pub hierarchical_path: String,
    pub is_active: Option<bool>,
    pub source_system: String,
    pub entity_hash: String,
}

fn merge(
    tdx: Option<&TdxDepartmentRow>,
    umapi: Option<&UmapiDepartmentRow>,
) -> ConsolidatedDepartmentRow {
    let mut sources = Vec::new();
    if tdx.is_some() {
        sources.push("tdx");
    }
    if umapi.is_some() {
        sources.push("identity_api");
    }

    // Canonical id = identity-API DeptID when present, else TDX id.
    let department_id = umapi
        .map(|r| r.dept_id.clone())
        .or_else(|| tdx.map(|r| r.tdx_department_id.clone()))
        .unwrap_or_default();

    let name = tdx
        .and_then(|r| r.name.clone())
        .or_else(|| umapi.and_then(|r| r.description.clone()));
    let description = umapi.and_then(|r| r.description.as_deref());

    let hierarchical_path = join_non_null(
        &[
            umapi.and_then(|r| r.campus.as_deref()),
            umapi.and_then(|r| r.vp_area.as_deref()),
            umapi.and_then(|r| r.college.as_deref()),
            description,
        ],
        "/",
    );

    let mut row = ConsolidatedDepartmentRow {
        department_id,
        name,
        code: tdx.and_then(|r| r.code.clone()),
        campus: umapi.and_then(|r| r.campus.clone()),
        college: umapi.and_then(|r| r.college.clone()),
        vp_area: umapi.and_then(|r| r.vp_area.clone()),
        manager_uid: tdx.and_then(|r| r.manager_uid.clone()),
        parent_id: tdx.and_then(|r| r.parent_id.clone()),
        hierarchical_path,
        is_active: tdx.and_then(|r| r.is_active),
        source_system: sources.join("+"),
        entity_hash: String::new(),
    };
    row.entity_hash = entity_hash(&row, &["entity_hash", "created_at", "updated_at"]);
    row
}

pub async fn consolidate(pool: &PgPool, dry_run: bool) -> AppResult<ConsolidateStats> {
    let mut stats = ConsolidateStats::default();

    let run_id = if dry_run {
        uuid::Uuid::nil()
    } else {
        run_ledger::begin(pool, SOURCE_SYSTEM, ENTITY_TYPE, serde_json::json!({})).await?
    };

    let tdx_rows: Vec<TdxDepartmentRow> = sqlx::query_as(
        "SELECT tdx_department_id, name, code, notes, is_active, parent_id, manager_uid, entity_hash \
         FROM silver.tdx_departments",
    )
    .fetch_all(pool)
    .await?;
    let umapi_rows: Vec<UmapiDepartmentRow> = sqlx::query_as(
        "SELECT dept_id, description, campus, college, vp_area, entity_hash FROM silver.umapi_departments",
    )
    .fetch_all(pool)
    .await?;

    let mut by_dept_id: HashMap<String, (Option<&TdxDepartmentRow>, Option<&UmapiDepartmentRow>)> =
        HashMap::new();
    for row in &tdx_rows {
        by_dept_id
            .entry(row.tdx_department_id.clone())
            .or_default()
            .0 = Some(row);
    }
    for row in &umapi_rows {
        by_dept_id.entry(row.dept_id.clone()).or_default().1 = Some(row);
    }

    stats.candidates = by_dept_id.len() as i64;

    for (tdx, umapi) in by_dept_id.values() {
        let row = merge(*tdx, *umapi);

        if !dry_run {
            let existing =
                silver_consolidated::existing_entity_hash(pool, "departments", "department_id", &row.department_id)
                    .await?;
            if existing.as_deref() == Some(row.entity_hash.as_str()) {
                stats.skipped_unchanged += 1;
                continue;
            }
            upsert(pool, &row).await?;
        }
        stats.upserted += 1;
    }

    if !dry_run {
        run_ledger::complete(
            pool,
            run_id,
            RunCounts {
                processed: stats.candidates,
                created: stats.upserted,
                updated: 0,
            },
            None,
        )
        .await?;
    }

    Ok(stats)
}

async fn upsert(pool: &PgPool, row: &ConsolidatedDepartmentRow) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO silver.departments \
             (department_id, name, code, campus, college, vp_area, manager_uid, parent_id, \
              hierarchical_path, is_active, source_system, entity_hash) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (department_id) DO UPDATE SET \
             name = EXCLUDED.name, code = EXCLUDED.code, campus = EXCLUDED.campus, \
             college = EXCLUDED.college, vp_area = EXCLUDED.vp_area, manager_uid = EXCLUDED.manager_uid, \
             parent_id = EXCLUDED.parent_id, hierarchical_path = EXCLUDED.hierarchical_path, \
             is_active = EXCLUDED.is_active, source_system = EXCLUDED.source_system, \
             entity_hash = EXCLUDED.entity_hash \
         WHERE silver.departments.entity_hash != EXCLUDED.entity_hash",
    )
    .bind(&row.department_id)
    .bind(&row.name)
    .bind(&row.code)
    .bind(&row.campus)
    .bind(&row.college)
    .bind(&row.vp_area)
    .bind(&row.manager_uid)
    .bind(&row.parent_id)
    .bind(&row.hierarchical_path)
    .bind(row.is_active)
    .bind(&row.source_system)
    .bind(&row.entity_hash)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_api_dept_id_wins_over_tdx_when_both_present() {
        let tdx = TdxDepartmentRow {
            tdx_department_id: "9999".to_string(),
            name: Some("Chemistry".to_string()),
            code: Some("CHEM".to_string()),
            notes: None,
            is_active: Some(true),
            parent_id: None,
            manager_uid: None,
            entity_hash: String::new(),
        };
        let umapi = UmapiDepartmentRow {
            dept_id: "1000".to_string(),
            description: Some("Chemistry".to_string()),
            campus: Some("Ann Arbor".to_string()),
            college: Some("LSA".to_string()),
            vp_area: None,
            entity_hash: String::new(),
        };
        let row = merge(Some(&tdx), Some(&umapi));
        assert_eq!(row.department_id, "1000");
        assert_eq!(row.hierarchical_path, "Ann Arbor/LSA/Chemistry");
    }
}

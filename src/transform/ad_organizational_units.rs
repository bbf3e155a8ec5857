//! Active Directory organizational-unit object projection. Unlike every
//! other AD projector, the object's own RDN is itself an `OU=` component,
//! so `parse_ou_path` is called with `is_ou_object = true`. PI
//! determination (`consolidate::users`) reads this table for lab OUs deep
//! enough in the hierarchy to be named by uniqname.

use std::collections::BTreeMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::db::silver_source::UpsertCounts;
use crate::error::{AppError, AppResult};
use crate::transform::engine::{entity_hash_excluding_metadata, Projector};
use crate::transform::ou_parser::parse_ou_path;

pub fn basic_fields(raw: &Value) -> BTreeMap<&'static str, Value> {
    let mut map = BTreeMap::new();
    map.insert("dn", raw.get("dn").cloned().unwrap_or(Value::Null));
    map
}

/// A leaf OU named by a lone uniqname (3-8 lowercase alphanumerics,
/// starting with a letter) rather than a descriptive lab/department name —
/// the convention lab OUs use several levels below the college/division
/// structure.
static UNIQNAME_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[a-z][a-z0-9]{2,7}$").expect("static pattern"));

fn extract_uniqname(leaf_ou: Option<&str>) -> Option<String> {
    let leaf = leaf_ou?;
    if UNIQNAME_LIKE.is_match(leaf) {
        Some(leaf.to_lowercase())
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdOrganizationalUnitRow {
    pub dn: String,
    pub ou_full_path: Value,
    pub ou_depth: i32,
    pub parent_ou_dn: Option<String>,
    pub extracted_uniqname: Option<String>,
    pub entity_hash: String,
}

pub struct AdOrganizationalUnitProjector;

#[async_trait]
impl Projector for AdOrganizationalUnitProjector {
    type Row = AdOrganizationalUnitRow;

    const TABLE: &'static str = "ad_organizational_units";
    const KEY_COLUMN: &'static str = "dn";
    const ENTITY_TYPE: &'static str = "organizational_unit";
    const SOURCE_SYSTEM: &'static str = "ad";

    fn project(&self, raw: &Value) -> AppResult<Self::Row> {
        let dn = raw
            .get("dn")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Projection("AD organizational unit missing dn".into()))?
            .to_string();

        let ou_path = parse_ou_path(&dn, true);
        // `full_path[0]` is the object's own OU (per the `is_ou_object`
        // convention); the uniqname extraction looks at the leaf, which
        // for an OU object is its own name, not its parent's.
        let own_ou = dn
            .split(',')
            .next()
            .and_then(|rdn| rdn.strip_prefix("OU="));
        let parent_ou_dn = dn.find(',').map(|idx| dn[idx + 1..].to_string());

        let mut row = AdOrganizationalUnitRow {
            dn: dn.clone(),
            ou_full_path: Value::Array(ou_path.full_path.into_iter().map(Value::String).collect()),
            ou_depth: ou_path.depth as i32,
            parent_ou_dn,
            extracted_uniqname: extract_uniqname(own_ou),
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
        let ou_full_paths: Vec<&Value> = rows.iter().map(|r| &r.ou_full_path).collect();
        let ou_depths: Vec<i32> = rows.iter().map(|r| r.ou_depth).collect();
        let parent_ou_dns: Vec<Option<&str>> = rows.iter().map(|r| r.parent_ou_dn.as_deref()).collect();
        let extracted_uniqnames: Vec<Option<&str>> =
            rows.iter().map(|r| r.extracted_uniqname.as_deref()).collect();
        let entity_hashes: Vec<&str> = rows.iter().map(|r| r.entity_hash.as_str()).collect();

        let result = sqlx::query(
            "INSERT INTO silver.ad_organizational_units \
                 (dn, ou_full_path, ou_depth, parent_ou_dn, extracted_uniqname, entity_hash) \
             SELECT * FROM UNNEST($1::text[], $2::jsonb[], $3::int[], $4::text[], $5::text[], $6::text[]) \
             ON CONFLICT (dn) DO UPDATE SET \
                 ou_full_path = EXCLUDED.ou_full_path, ou_depth = EXCLUDED.ou_depth, \
                 parent_ou_dn = EXCLUDED.parent_ou_dn, extracted_uniqname = EXCLUDED.extracted_uniqname, \
                 entity_hash = EXCLUDED.entity_hash \
             WHERE silver.ad_organizational_units.entity_hash != EXCLUDED.entity_hash",
        )
        .bind(&dns)
        .bind(&ou_full_paths)
        .bind(&ou_depths)
        .bind(&parent_ou_dns)
        .bind(&extracted_uniqnames)
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

    #[test]
    fn leaf_ou_matching_uniqname_pattern_is_extracted() {
        let dn = "OU=jdoe,OU=Labs,OU=Chemistry,OU=Departments,OU=LSA,OU=UM,DC=umich,DC=edu";
        let row = AdOrganizationalUnitProjector.project(&serde_json::json!({"dn": dn})).unwrap();
        assert_eq!(row.extracted_uniqname, Some("jdoe".to_string()));
        assert_eq!(row.ou_full_path.as_array().unwrap()[0], "jdoe");
    }

    #[test]
    fn descriptive_leaf_ou_name_is_not_extracted_as_uniqname() {
        let dn = "OU=Research Computing,OU=Departments,OU=LSA,OU=UM,DC=umich,DC=edu";
        let row = AdOrganizationalUnitProjector.project(&serde_json::json!({"dn": dn})).unwrap();
        assert_eq!(row.extracted_uniqname, None);
    }
}

//! Group consolidation. AD and MCommunity are disjoint directories — no
//! group identity spans both — so consolidation is a union keyed by `dn`
//! rather than a field-by-field merge, unlike users/departments/computers.

use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::db::silver_consolidated;
use crate::error::AppResult;
use crate::hashing::entity_hash;
use crate::quality;
use crate::run_ledger::{self, RunCounts};
use crate::transform::ad_groups::AdGroupRow;
use crate::transform::mcommunity_groups::McommunityGroupRow;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const ENTITY_TYPE: &str = "group";
const SOURCE_SYSTEM: &str = "consolidated";

#[derive(Debug, Default, Clone)]
pub struct ConsolidateStats {
    pub candidates: i64,
    pub upserted: i64,
    pub skipped_unchanged: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConsolidatedGroupRow {
    pub dn: String,
    pub cn: Option<String>,
    pub description: Option<String>,
    pub members: Value,
    pub direct_members: Option<Value>,
    pub owners: Value,
    pub source_system: String,
    pub quality_score: Decimal,
    pub quality_flags: Value,
    pub entity_hash: String,
}

fn from_ad(row: &AdGroupRow) -> ConsolidatedGroupRow {
    let cn = row.sam_account_name.clone();
    let mut out = ConsolidatedGroupRow {
        dn: row.dn.clone(),
        cn,
        description: row.description.clone(),
        members: row.members.clone(),
        direct_members: None,
        owners: row.owners.clone(),
        source_system: "ad".to_string(),
        quality_score: Decimal::ZERO,
        quality_flags: Value::Array(vec![]),
        entity_hash: String::new(),
    };
    score_and_hash(&mut out);
    out
}

fn from_mcommunity(row: &McommunityGroupRow) -> ConsolidatedGroupRow {
    let mut out = ConsolidatedGroupRow {
        dn: row.dn.clone(),
        cn: row.cn.clone(),
        description: row.description.clone(),
        members: row.members.clone(),
        direct_members: Some(row.direct_members.clone()),
        owners: row.owners.clone(),
        source_system: "mcommunity".to_string(),
        quality_score: Decimal::ZERO,
        quality_flags: Value::Array(vec![]),
        entity_hash: String::new(),
    };
    score_and_hash(&mut out);
    out
}

fn score_and_hash(row: &mut ConsolidatedGroupRow) {
    let member_count = row.members.as_array().map(Vec::len).unwrap_or(0);
    let (score, flags) = quality::score(
        dec!(1.00),
        &[
            (row.cn.is_none(), dec!(-0.20), "missing_cn"),
            (row.description.is_none(), dec!(-0.10), "missing_description"),
            (member_count == 0, dec!(-0.30), "no_members"),
            (row.owners.as_array().map(Vec::is_empty).unwrap_or(true), dec!(-0.10), "no_owners"),
        ],
    );
    row.quality_score = score;
    row.quality_flags = Value::Array(flags.into_iter().map(Value::String).collect());
    row.entity_hash = entity_hash(row, &["quality_score", "quality_flags", "entity_hash", "created_at", "updated_at"]);
}

pub async fn consolidate(pool: &PgPool, dry_run: bool) -> AppResult<ConsolidateStats> {
    let mut stats = ConsolidateStats::default();

    let run_id = if dry_run {
        uuid::Uuid::nil()
    } else {
        run_ledger::begin(pool, SOURCE_SYSTEM, ENTITY_TYPE, serde_json::json!({})).await?
    };

    let ad_rows: Vec<AdGroupRow> = sqlx::query_as(
        "SELECT dn, sam_account_name, description, members, owners, ou_root, ou_full_path, entity_hash \
         FROM silver.ad_groups",
    )
    .fetch_all(pool)
    .await?;
    let mcom_rows: Vec<McommunityGroupRow> = sqlx::query_as(
        "SELECT dn, cn, description, members, direct_members, owners, entity_hash \
         FROM silver.mcommunity_groups",
    )
    .fetch_all(pool)
    .await?;

    let mut rows: Vec<ConsolidatedGroupRow> = Vec::with_capacity(ad_rows.len() + mcom_rows.len());
    rows.extend(ad_rows.iter().map(from_ad));
    rows.extend(mcom_rows.iter().map(from_mcommunity));

    stats.candidates = rows.len() as i64;

    for row in &rows {
        if !dry_run {
            let existing = silver_consolidated::existing_entity_hash(pool, "groups", "dn", &row.dn).await?;
            if existing.as_deref() == Some(row.entity_hash.as_str()) {
                stats.skipped_unchanged += 1;
                continue;
            }
            upsert(pool, row).await?;
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

async fn upsert(pool: &PgPool, row: &ConsolidatedGroupRow) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO silver.groups \
             (dn, cn, description, members, direct_members, owners, source_system, \
              quality_score, quality_flags, entity_hash) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (dn) DO UPDATE SET \
             cn = EXCLUDED.cn, description = EXCLUDED.description, members = EXCLUDED.members, \
             direct_members = EXCLUDED.direct_members, owners = EXCLUDED.owners, \
             source_system = EXCLUDED.source_system, quality_score = EXCLUDED.quality_score, \
             quality_flags = EXCLUDED.quality_flags, entity_hash = EXCLUDED.entity_hash \
         WHERE silver.groups.entity_hash != EXCLUDED.entity_hash",
    )
    .bind(&row.dn)
    .bind(&row.cn)
    .bind(&row.description)
    .bind(&row.members)
    .bind(&row.direct_members)
    .bind(&row.owners)
    .bind(&row.source_system)
    .bind(row.quality_score)
    .bind(&row.quality_flags)
    .bind(&row.entity_hash)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_group_with_no_members_gets_no_members_penalty() {
        let ad = AdGroupRow {
            dn: "CN=lsa-research,OU=Groups,DC=umich,DC=edu".to_string(),
            sam_account_name: Some("lsa-research".to_string()),
            description: None,
            members: Value::Array(vec![]),
            owners: Value::Array(vec![]),
            ou_root: None,
            ou_full_path: Value::Array(vec![]),
            entity_hash: String::new(),
        };
        let row = from_ad(&ad);
        assert_eq!(row.source_system, "ad");
        assert!(row.quality_flags.as_array().unwrap().iter().any(|f| f == "no_members"));
        assert!(row.quality_flags.as_array().unwrap().iter().any(|f| f == "no_owners"));
    }

    #[test]
    fn mcommunity_group_carries_direct_members_distinction() {
        let mcom = McommunityGroupRow {
            dn: "CN=lsa-chem-staff,OU=User Groups,DC=umich,DC=edu".to_string(),
            cn: Some("lsa-chem-staff".to_string()),
            description: Some("Chemistry staff".to_string()),
            members: Value::Array(vec![Value::String("uid=jdoe,OU=People,DC=umich,DC=edu".to_string())]),
            direct_members: Value::Array(vec![Value::String("uid=jdoe,OU=People,DC=umich,DC=edu".to_string())]),
            owners: Value::Array(vec![Value::String("uid=asmith,OU=People,DC=umich,DC=edu".to_string())]),
            entity_hash: String::new(),
        };
        let row = from_mcommunity(&mcom);
        assert_eq!(row.source_system, "mcommunity");
        assert!(row.direct_members.is_some());
        assert!(row.quality_flags.as_array().unwrap().is_empty());
    }
}

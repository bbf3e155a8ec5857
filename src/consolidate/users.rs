//! User consolidation. Merges TDX, AD, MCommunity, and identity-API
//! (UMAPI) Silver-source rows into one canonical `silver.users` row per
//! uniqname, grounded on the original `_merge_user_records` /
//! `_calculate_data_quality` field precedence and scoring rules.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::consolidate::precedence::pick_first_non_empty;
use crate::db::silver_consolidated;
use crate::error::AppResult;
use crate::hashing::{entity_hash, normalize_uniqname};
use crate::quality;
use crate::run_ledger::{self, RunCounts};
use crate::transform::ad_users::AdUserRow;
use crate::transform::mcommunity_users::McommunityUserRow;
use crate::transform::tdx_users::TdxUserRow;
use crate::transform::umapi_employment::UmapiEmploymentRow;

const ENTITY_TYPE: &str = "user";
const SOURCE_SYSTEM: &str = "consolidated";

#[derive(Debug, Default, Clone)]
pub struct ConsolidateStats {
    pub candidates: i64,
    pub upserted: i64,
    pub skipped_unchanged: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConsolidatedUserRow {
    pub uniqname: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub primary_email: Option<String>,
    pub work_phone: Option<String>,
    pub department_id: Option<String>,
    pub department_name: Option<String>,
    pub job_title: Option<String>,
    pub is_active: bool,
    pub is_employee: bool,
    pub is_pi: bool,
    pub ad_account_disabled: Option<bool>,
    pub source_system: String,
    pub quality_score: Decimal,
    pub quality_flags: Value,
    pub entity_hash: String,
}

/// Loads the uniqname set for which `is_pi` is true: the union of
/// lab-awards rows tagged with a Principal Investigator role and AD
/// organizational units deep enough in the hierarchy to be named by
/// uniqname rather than a department name. Computed once per run rather
/// than per-row — doing it per-row would make consolidation quadratic in
/// the number of PI-tagged rows.
async fn load_pi_uniqnames(pool: &PgPool) -> AppResult<HashSet<String>> {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT uniqname FROM ( \
             SELECT DISTINCT person_uniqname AS uniqname FROM silver.lab_awards \
             WHERE person_uniqname IS NOT NULL AND person_role ILIKE '%Principal Investigator%' \
             UNION \
             SELECT DISTINCT extracted_uniqname AS uniqname FROM silver.ad_organizational_units \
             WHERE extracted_uniqname IS NOT NULL AND ou_depth >= 8 \
         ) pis",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|u| normalize_uniqname(&u)).collect())
}

fn mcommunity_cn(dn: &str) -> Option<String> {
    dn.split(',').next()?.strip_prefix("CN=").map(str::to_string)
}

/// A candidate is alumni-only when MCommunity is its sole source and one of
/// its affiliation OUs names "alumni" — an opt-in CLI filter, not an
/// enshrined policy (spec.md's alumni open question).
fn is_alumni_only(
    tdx: Option<&TdxUserRow>,
    ad: Option<&AdUserRow>,
    mcom: Option<&McommunityUserRow>,
    umapi: &[&UmapiEmploymentRow],
) -> bool {
    let Some(mcom) = mcom else { return false };
    if tdx.is_some() || ad.is_some() || !umapi.is_empty() {
        return false;
    }
    mcom.affiliations
        .as_array()
        .map(|ous| ous.iter().any(|v| v.as_str().unwrap_or("").to_lowercase().contains("alumni")))
        .unwrap_or(false)
}

fn merge(
    uniqname: &str,
    tdx: Option<&TdxUserRow>,
    ad: Option<&AdUserRow>,
    mcom: Option<&McommunityUserRow>,
    umapi: &[&UmapiEmploymentRow],
    pi_uniqnames: &HashSet<String>,
) -> ConsolidatedUserRow {
    let mut sources = Vec::new();
    if tdx.is_some() {
        sources.push("tdx");
    }
    if ad.is_some() {
        sources.push("ad");
    }
    if !umapi.is_empty() {
        sources.push("umapi");
    }
    if mcom.is_some() {
        sources.push("mcom");
    }
    sources.sort_unstable();

    // Lowest empl_rcd wins scalar UMAPI fields ("min empl_rcd
    // wins scalars" aggregation rule.
    let primary_umapi = umapi.iter().min_by_key(|r| r.empl_rcd.unwrap_or(i32::MAX));

    let first_name = pick_first_non_empty(&[
        ("tdx", tdx.and_then(|r| r.first_name.as_deref())),
        ("umapi", primary_umapi.and_then(|r| r.first_name.as_deref())),
        ("mcom", mcom.and_then(|r| r.given_name.as_deref())),
        ("ad", ad.and_then(|r| r.given_name.as_deref())),
    ]);
    let last_name = pick_first_non_empty(&[
        ("tdx", tdx.and_then(|r| r.last_name.as_deref())),
        ("umapi", primary_umapi.and_then(|r| r.last_name.as_deref())),
        ("ad", ad.and_then(|r| r.sn.as_deref())),
    ]);
    let display_name = pick_first_non_empty(&[
        ("mcom", mcom.and_then(|r| r.display_name.as_deref())),
        ("ad", ad.and_then(|r| r.display_name.as_deref())),
    ]);
    let primary_email = pick_first_non_empty(&[
        ("tdx", tdx.and_then(|r| r.primary_email.as_deref())),
        ("mcom", mcom.and_then(|r| r.mail.as_deref())),
        ("ad", ad.and_then(|r| r.mail.as_deref())),
    ]);
    let work_phone = pick_first_non_empty(&[
        ("mcom", mcom.and_then(|r| r.telephone_number.as_deref())),
    ]);

    let department_id = primary_umapi
        .and_then(|r| r.department_id.clone())
        .or_else(|| tdx.and_then(|r| r.default_account_id.clone()));
    let department_name = primary_umapi.and_then(|r| r.department_name.clone());

    let job_title = pick_first_non_empty(&[
        ("umapi", primary_umapi.and_then(|r| r.job_title.as_deref())),
        ("mcom", mcom.and_then(|r| r.job_title.as_deref())),
        ("tdx", tdx.and_then(|r| r.job_title.as_deref())),
    ]);

    let mut is_active = false;
    if tdx.map(|r| r.is_active.unwrap_or(false)).unwrap_or(false) {
        is_active = true;
    }
    if let Some(ad) = ad {
        if !ad.account_disabled.unwrap_or(false) {
            is_active = true;
        }
    }
    if !umapi.is_empty() || mcom.is_some() {
        is_active = true;
    }

    let is_employee = !umapi.is_empty() || tdx.map(|r| r.type_id == Some(1)).unwrap_or(false);
    let is_pi = pi_uniqnames.contains(uniqname);
    let ad_account_disabled = ad.and_then(|r| r.account_disabled);

    let mut row = ConsolidatedUserRow {
        uniqname: uniqname.to_string(),
        first_name,
        last_name,
        display_name,
        primary_email,
        work_phone,
        department_id,
        department_name,
        job_title,
        is_active,
        is_employee,
        is_pi,
        ad_account_disabled,
        source_system: sources.join("+"),
        quality_score: Decimal::ZERO,
        quality_flags: Value::Array(vec![]),
        entity_hash: String::new(),
    };

    let (score, flags) = quality::score(
        dec!(1.00),
        &[
            (row.primary_email.is_none(), dec!(-0.25), "missing_email"),
            (row.first_name.is_none() || row.last_name.is_none(), dec!(-0.20), "missing_name"),
            (row.department_id.is_none(), dec!(-0.15), "missing_department"),
            (row.job_title.is_none() && !row.is_pi, dec!(-0.10), "missing_job_title"),
            (!row.is_employee, dec!(-0.10), "not_umapi_employee"),
            (row.ad_account_disabled.unwrap_or(false), dec!(-0.10), "ad_disabled"),
            (!row.source_system.contains("tdx"), dec!(-0.05), "no_tdx_record"),
            (row.source_system == "mcom", dec!(-0.15), "mcom_only"),
        ],
    );
    let score = if sources.len() == 4 { (score + dec!(0.10)).min(dec!(1.00)) } else { score };

    row.quality_score = score;
    row.quality_flags = Value::Array(flags.into_iter().map(Value::String).collect());
    row.entity_hash = entity_hash(
        &row,
        &["quality_score", "quality_flags", "entity_hash", "created_at", "updated_at"],
    );
    row
}

pub async fn consolidate(pool: &PgPool, dry_run: bool, exclude_alumni: bool) -> AppResult<ConsolidateStats> {
    let mut stats = ConsolidateStats::default();

    let run_id = if dry_run {
        uuid::Uuid::nil()
    } else {
        run_ledger::begin(pool, SOURCE_SYSTEM, ENTITY_TYPE, serde_json::json!({})).await?
    };

    let pi_uniqnames = load_pi_uniqnames(pool).await?;

    let tdx_rows: Vec<TdxUserRow> = sqlx::query_as(
        "SELECT tdx_user_uid, username, first_name, last_name, primary_email, is_active, \
                default_account_id, type_id, security_role_name, job_title, entity_hash \
         FROM silver.tdx_users",
    )
    .fetch_all(pool)
    .await?;
    let ad_rows: Vec<AdUserRow> = sqlx::query_as(
        "SELECT dn, sam_account_name, given_name, sn, mail, display_name, account_disabled, entity_hash \
         FROM silver.ad_users",
    )
    .fetch_all(pool)
    .await?;
    let mcom_rows: Vec<McommunityUserRow> = sqlx::query_as(
        "SELECT dn, given_name, display_name, mail, telephone_number, job_title, affiliations, entity_hash \
         FROM silver.mcommunity_users",
    )
    .fetch_all(pool)
    .await?;
    let umapi_rows: Vec<UmapiEmploymentRow> = sqlx::query_as(
        "SELECT employment_key, uniqname, empl_rcd, first_name, last_name, job_title, \
                department_id, department_name, work_location, entity_hash \
         FROM silver.umapi_employment_records",
    )
    .fetch_all(pool)
    .await?;

    let mut by_uniqname: HashMap<String, (
        Option<&TdxUserRow>,
        Option<&AdUserRow>,
        Option<&McommunityUserRow>,
        Vec<&UmapiEmploymentRow>,
    )> = HashMap::new();

    for row in &tdx_rows {
        if let Some(username) = &row.username {
            by_uniqname.entry(normalize_uniqname(username)).or_default().0 = Some(row);
        }
    }
    for row in &ad_rows {
        if let Some(sam) = &row.sam_account_name {
            by_uniqname.entry(normalize_uniqname(sam)).or_default().1 = Some(row);
        }
    }
    for row in &mcom_rows {
        if let Some(cn) = mcommunity_cn(&row.dn) {
            by_uniqname.entry(normalize_uniqname(&cn)).or_default().2 = Some(row);
        }
    }
    for row in &umapi_rows {
        if let Some(uniqname) = &row.uniqname {
            by_uniqname.entry(normalize_uniqname(uniqname)).or_default().3.push(row);
        }
    }

    stats.candidates = by_uniqname.len() as i64;

    for (uniqname, (tdx, ad, mcom, umapi)) in &by_uniqname {
        if exclude_alumni && is_alumni_only(*tdx, *ad, mcom.as_deref(), umapi) {
            continue;
        }
        let row = merge(uniqname, *tdx, *ad, mcom.as_deref(), umapi, &pi_uniqnames);

        if !dry_run {
            let existing = silver_consolidated::existing_entity_hash(pool, "users", "uniqname", uniqname).await?;
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

async fn upsert(pool: &PgPool, row: &ConsolidatedUserRow) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO silver.users \
             (uniqname, first_name, last_name, display_name, primary_email, work_phone, \
              department_id, department_name, job_title, is_active, is_employee, is_pi, \
              ad_account_disabled, source_system, quality_score, quality_flags, entity_hash) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
         ON CONFLICT (uniqname) DO UPDATE SET \
             first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name, \
             display_name = EXCLUDED.display_name, primary_email = EXCLUDED.primary_email, \
             work_phone = EXCLUDED.work_phone, department_id = EXCLUDED.department_id, \
             department_name = EXCLUDED.department_name, job_title = EXCLUDED.job_title, \
             is_active = EXCLUDED.is_active, is_employee = EXCLUDED.is_employee, is_pi = EXCLUDED.is_pi, \
             ad_account_disabled = EXCLUDED.ad_account_disabled, source_system = EXCLUDED.source_system, \
             quality_score = EXCLUDED.quality_score, quality_flags = EXCLUDED.quality_flags, \
             entity_hash = EXCLUDED.entity_hash \
         WHERE silver.users.entity_hash != EXCLUDED.entity_hash",
    )
    .bind(&row.uniqname)
    .bind(&row.first_name)
    .bind(&row.last_name)
    .bind(&row.display_name)
    .bind(&row.primary_email)
    .bind(&row.work_phone)
    .bind(&row.department_id)
    .bind(&row.department_name)
    .bind(&row.job_title)
    .bind(row.is_active)
    .bind(row.is_employee)
    .bind(row.is_pi)
    .bind(row.ad_account_disabled)
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
    fn mcom_only_user_gets_mcom_only_penalty() {
        let mcom = McommunityUserRow {
            dn: "CN=jdoe,OU=People,DC=umich,DC=edu".to_string(),
            given_name: Some("Jane".to_string()),
            display_name: Some("Jane Doe".to_string()),
            mail: Some("jdoe@umich.edu".to_string()),
            telephone_number: None,
            job_title: None,
            affiliations: Value::Array(vec![]),
            entity_hash: String::new(),
        };
        let pi = HashSet::new();
        let row = merge("jdoe", None, None, Some(&mcom), &[], &pi);
        assert_eq!(row.source_system, "mcom");
        assert!(row.quality_flags.as_array().unwrap().iter().any(|f| f == "mcom_only"));
    }

    #[test]
    fn all_four_sources_present_earns_quality_bonus() {
        let tdx = TdxUserRow {
            tdx_user_uid: "1".to_string(),
            username: Some("jdoe".to_string()),
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            primary_email: Some("jdoe@umich.edu".to_string()),
            is_active: Some(true),
            default_account_id: Some("1000".to_string()),
            type_id: Some(1),
            security_role_name: None,
            job_title: Some("Research Scientist".to_string()),
            entity_hash: String::new(),
        };
        let ad = AdUserRow {
            dn: "CN=Jane Doe,OU=People,DC=umich,DC=edu".to_string(),
            sam_account_name: Some("jdoe".to_string()),
            given_name: Some("Jane".to_string()),
            sn: Some("Doe".to_string()),
            mail: Some("jdoe@umich.edu".to_string()),
            display_name: Some("Jane Doe".to_string()),
            account_disabled: Some(false),
            entity_hash: String::new(),
        };
        let mcom = McommunityUserRow {
            dn: "CN=jdoe,OU=People,DC=umich,DC=edu".to_string(),
            given_name: Some("Jane".to_string()),
            display_name: Some("Jane Doe".to_string()),
            mail: Some("jdoe@umich.edu".to_string()),
            telephone_number: Some("555-1212".to_string()),
            job_title: Some("Research Scientist".to_string()),
            affiliations: Value::Array(vec![]),
            entity_hash: String::new(),
        };
        let umapi = UmapiEmploymentRow {
            employment_key: "jdoe-0".to_string(),
            uniqname: Some("jdoe".to_string()),
            empl_rcd: Some(0),
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            job_title: Some("Research Scientist".to_string()),
            department_id: Some("1000".to_string()),
            department_name: Some("Chemistry".to_string()),
            work_location: Value::Null,
            entity_hash: String::new(),
        };
        let pi = HashSet::new();
        let row = merge("jdoe", Some(&tdx), Some(&ad), Some(&mcom), &[&umapi], &pi);
        assert_eq!(row.quality_score, dec!(1.00));
    }
}

//! In-memory caches the associator matches against. `silver.labs` and
//! `silver.lab_members` are not ingested entities in their own right — they
//! are derived here, once per run, from `silver.lab_awards` PI rows (the
//! `is_pi` definition) — lookup sets built once rather than re-queried per
//! candidate.

use std::collections::{HashMap, HashSet};

use sqlx::PgPool;

use crate::error::AppResult;

#[derive(Debug, Clone)]
pub struct ComputerInfo {
    pub computer_id: String,
    pub name: Option<String>,
    pub ad_dn: Option<String>,
    pub owner_uniqname: Option<String>,
    pub financial_owner_uniqname: Option<String>,
    pub function_id: Option<String>,
    /// Distinct from `owner_uniqname` in the original system (last *logged
    /// in* user vs. asset-record owner); no ingested source in this
    /// pipeline surfaces it separately yet, so it is always `None` here.
    /// `discover_by_last_user_member` is fully implemented against it.
    pub last_user_uniqname: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LabInfo {
    pub lab_id: String,
    pub pi_uniqname: String,
    pub ad_ou_dn: Option<String>,
}

pub struct ComputersCache(pub Vec<ComputerInfo>);
pub struct LabsCache(pub Vec<LabInfo>);
pub struct LabMembersCache(pub HashMap<String, HashSet<String>>);

pub async fn load_computers(pool: &PgPool) -> AppResult<ComputersCache> {
    let rows: Vec<(String, Option<String>, Option<String>, Option<String>, Option<String>, Option<String>)> =
        sqlx::query_as(
            "SELECT computer_id, name, ad_dn, owner_uniqname, financial_owner_uniqname, function_id \
             FROM silver.computers",
        )
        .fetch_all(pool)
        .await?;
    let computers = rows
        .into_iter()
        .map(
            |(computer_id, name, ad_dn, owner_uniqname, financial_owner_uniqname, function_id)| ComputerInfo {
                computer_id,
                name,
                ad_dn,
                owner_uniqname,
                financial_owner_uniqname,
                function_id,
                last_user_uniqname: None,
            },
        )
        .collect();
    Ok(ComputersCache(computers))
}

/// One lab per `person_appt_dept_id` that has at least one PI-role award
/// row; ties among multiple PIs in the same department resolved by minimum
/// uniqname for determinism. `ad_ou_dn` is left unset — labs have no AD OU
/// of their own in this pipeline's source set, so `discover_by_ad_ou`
/// degrades to finding nothing rather than guessing.
pub async fn load_labs(pool: &PgPool) -> AppResult<(LabsCache, LabMembersCache)> {
    let pi_rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT person_appt_dept_id, person_uniqname FROM silver.lab_awards \
         WHERE person_role ILIKE '%PI%' AND person_appt_dept_id IS NOT NULL AND person_uniqname IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    let mut pi_by_dept: HashMap<String, String> = HashMap::new();
    for (dept_id, uniqname) in pi_rows {
        pi_by_dept
            .entry(dept_id)
            .and_modify(|existing| {
                if uniqname < *existing {
                    *existing = uniqname.clone();
                }
            })
            .or_insert(uniqname);
    }

    let labs: Vec<LabInfo> = pi_by_dept
        .iter()
        .map(|(dept_id, pi_uniqname)| LabInfo {
            lab_id: dept_id.clone(),
            pi_uniqname: pi_uniqname.clone(),
            ad_ou_dn: None,
        })
        .collect();

    let member_rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT person_appt_dept_id, person_uniqname FROM silver.lab_awards \
         WHERE person_appt_dept_id = ANY($1) AND person_uniqname IS NOT NULL",
    )
    .bind(pi_by_dept.keys().cloned().collect::<Vec<_>>())
    .fetch_all(pool)
    .await?;

    let mut members: HashMap<String, HashSet<String>> = HashMap::new();
    for (dept_id, uniqname) in member_rows {
        members.entry(dept_id).or_default().insert(uniqname);
    }

    Ok((LabsCache(labs), LabMembersCache(members)))
}

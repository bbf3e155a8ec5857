//! Orchestrates the six discovery methods into the full association run:
//! dedup by `(computer_id, lab_id)`, additive scoring, primary selection,
//! and the `TRUNCATE` + chunked `INSERT` refresh of `silver.lab_computers`
//! plus the propagated summary columns on `silver.computers`.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::db::link_tables;
use crate::error::AppResult;
use crate::lab_computers::cache::{self, ComputerInfo, LabInfo};
use crate::lab_computers::discovery::{self, Candidate};
use crate::lab_computers::scoring::{self, CriteriaFlags, QualityFlags};

const CHUNK_SIZE: usize = 1000;

#[derive(Debug, Default, Clone)]
pub struct AssociateStats {
    pub candidates_discovered: i64,
    pub associations_written: i64,
    pub computers_with_primary_lab: i64,
}

struct ScoredAssociation {
    computer_id: String,
    lab_id: String,
    method: &'static str,
    confidence: rust_decimal::Decimal,
    criteria: CriteriaFlags,
    quality: QualityFlags,
    is_primary: bool,
}

fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut best: HashMap<(String, String), Candidate> = HashMap::new();
    for candidate in candidates {
        let key = (candidate.computer_id.clone(), candidate.lab_id.clone());
        best.entry(key)
            .and_modify(|existing| {
                if candidate.base_confidence > existing.base_confidence {
                    *existing = candidate.clone();
                }
            })
            .or_insert(candidate);
    }
    best.into_values().collect()
}

pub async fn associate(pool: &PgPool, dry_run: bool) -> AppResult<AssociateStats> {
    let mut stats = AssociateStats::default();

    let computers = cache::load_computers(pool).await?;
    let (labs, members) = cache::load_labs(pool).await?;

    let computers_by_id: HashMap<&str, &ComputerInfo> =
        computers.0.iter().map(|c| (c.computer_id.as_str(), c)).collect();
    let labs_by_id: HashMap<&str, &LabInfo> = labs.0.iter().map(|l| (l.lab_id.as_str(), l)).collect();

    let mut raw_candidates = Vec::new();
    raw_candidates.extend(discovery::discover_by_ad_ou(&computers, &labs));
    raw_candidates.extend(discovery::discover_by_owner_pi(&computers, &labs));
    raw_candidates.extend(discovery::discover_by_financial_owner_pi(&computers, &labs));
    raw_candidates.extend(discovery::discover_by_name_pattern_pi(&computers, &labs));
    raw_candidates.extend(discovery::discover_by_owner_member(&computers, &labs, &members));
    raw_candidates.extend(discovery::discover_by_last_user_member(&computers, &labs, &members));
    stats.candidates_discovered = raw_candidates.len() as i64;

    let deduped = dedupe(raw_candidates);

    let mut scored: HashMap<String, Vec<ScoredAssociation>> = HashMap::new();
    for candidate in &deduped {
        let (Some(computer), Some(lab)) = (
            computers_by_id.get(candidate.computer_id.as_str()),
            labs_by_id.get(candidate.lab_id.as_str()),
        ) else {
            continue;
        };
        let (confidence, criteria) = scoring::score(candidate, computer, lab, &members);
        let quality = scoring::quality_flags(confidence, computer, &criteria);
        scored.entry(candidate.computer_id.clone()).or_default().push(ScoredAssociation {
            computer_id: candidate.computer_id.clone(),
            lab_id: candidate.lab_id.clone(),
            method: candidate.method.as_str(),
            confidence,
            criteria,
            quality,
            is_primary: false,
        });
    }

    let mut all_rows = Vec::new();
    for associations in scored.values_mut() {
        associations.sort_by(|a, b| {
            b.confidence.cmp(&a.confidence).then_with(|| a.lab_id.cmp(&b.lab_id))
        });
        if let Some(primary) = associations.first_mut() {
            primary.is_primary = true;
        }
        stats.computers_with_primary_lab += 1;
        all_rows.append(associations);
    }
    stats.associations_written = all_rows.len() as i64;

    if dry_run {
        return Ok(stats);
    }

    let mut tx = link_tables::begin_rebuild(pool).await?;
    link_tables::truncate(&mut tx, "lab_computers").await?;

    for chunk in all_rows.chunks(CHUNK_SIZE) {
        for row in chunk {
            sqlx::query(
                "INSERT INTO silver.lab_computers \
                     (computer_id, lab_id, association_method, confidence, is_primary, \
                      owner_is_pi, fin_owner_is_pi, owner_is_member, fin_owner_is_member, \
                      function_is_research, function_is_classroom, \
                      low_confidence, high_confidence, fully_pi_owned, owner_not_affiliated, \
                      fin_owner_not_affiliated, admin_function, dev_function, no_function) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
            )
            .bind(&row.computer_id)
            .bind(&row.lab_id)
            .bind(row.method)
            .bind(row.confidence)
            .bind(row.is_primary)
            .bind(row.criteria.owner_is_pi)
            .bind(row.criteria.fin_owner_is_pi)
            .bind(row.criteria.owner_is_member)
            .bind(row.criteria.fin_owner_is_member)
            .bind(row.criteria.function_is_research)
            .bind(row.criteria.function_is_classroom)
            .bind(row.quality.low_confidence)
            .bind(row.quality.high_confidence)
            .bind(row.quality.fully_pi_owned)
            .bind(row.quality.owner_not_affiliated)
            .bind(row.quality.fin_owner_not_affiliated)
            .bind(row.quality.admin_function)
            .bind(row.quality.dev_function)
            .bind(row.quality.no_function)
            .execute(&mut *tx)
            .await?;
        }
    }

    for associations in scored.values() {
        let primary = associations.iter().find(|a| a.is_primary);
        let primary_lab_id = primary.map(|p| p.lab_id.as_str());
        let primary_method = primary.map(|p| p.method);
        let count = associations.len() as i64;
        if let Some(computer_id) = associations.first().map(|a| a.computer_id.as_str()) {
            sqlx::query(
                "UPDATE silver.computers \
                 SET primary_lab_id = $2, primary_lab_method = $3, lab_association_count = $4 \
                 WHERE computer_id = $1",
            )
            .bind(computer_id)
            .bind(primary_lab_id)
            .bind(primary_method)
            .bind(count)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(stats)
}

//! Group relationship extraction: classifies every member/owner
//! identifier across both directories, dedupes, and rebuilds the
//! `group_members` / `group_owners` link tables.

use std::collections::HashSet;

use serde_json::Value;
use sqlx::PgPool;

use crate::db::link_tables;
use crate::error::AppResult;
use crate::relationships::identifier_parser::{classify, MemberKind};

#[derive(Debug, Default, Clone)]
pub struct ExtractStats {
    pub groups_scanned: i64,
    pub member_edges: i64,
    pub owner_edges: i64,
}

struct GroupRow {
    dn: String,
    source_system: String,
    members: Vec<String>,
    direct_members: Option<Vec<String>>,
    owners: Vec<String>,
}

#[derive(Debug, Clone)]
struct MemberEdge {
    group_dn: String,
    source_system: String,
    member_id: String,
    member_kind: String,
    is_direct: bool,
}

#[derive(Debug, Clone)]
struct OwnerEdge {
    group_dn: String,
    source_system: String,
    owner_id: String,
    owner_kind: String,
}

fn kind_str(kind: MemberKind) -> &'static str {
    match kind {
        MemberKind::User => "user",
        MemberKind::Group => "group",
        MemberKind::Unknown => "unknown",
    }
}

async fn load_groups(pool: &PgPool) -> AppResult<Vec<GroupRow>> {
    let rows: Vec<(String, String, Value, Option<Value>, Value)> = sqlx::query_as(
        "SELECT dn, source_system, members, direct_members, owners FROM silver.groups",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(dn, source_system, members, direct_members, owners)| GroupRow {
            dn,
            source_system,
            members: to_strings(&members),
            direct_members: direct_members.as_ref().map(to_strings),
            owners: to_strings(&owners),
        })
        .collect())
}

fn to_strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

pub async fn extract(pool: &PgPool, dry_run: bool) -> AppResult<ExtractStats> {
    let groups = load_groups(pool).await?;
    let mut stats = ExtractStats::default();

    let mut seen_members: HashSet<(String, String, String, String)> = HashSet::new();
    let mut seen_owners: HashSet<(String, String, String)> = HashSet::new();
    let mut member_edges = Vec::new();
    let mut owner_edges = Vec::new();

    for group in &groups {
        stats.groups_scanned += 1;

        for identifier in &group.members {
            let (member_id, kind) = classify(identifier);
            if kind == MemberKind::Unknown {
                continue;
            }
            // AD memberships are always direct; MCommunity memberships are
            // direct only when the identifier also appears in
            // `direct_members` (nested-group expansion otherwise).
            let is_direct = match &group.direct_members {
                None => true,
                Some(direct) => direct.iter().any(|d| classify(d).0 == member_id),
            };
            let key = (
                group.dn.clone(),
                group.source_system.clone(),
                member_id.clone(),
                kind_str(kind).to_string(),
            );
            if seen_members.insert(key) {
                member_edges.push(MemberEdge {
                    group_dn: group.dn.clone(),
                    source_system: group.source_system.clone(),
                    member_id,
                    member_kind: kind_str(kind).to_string(),
                    is_direct,
                });
            }
        }

        for identifier in &group.owners {
            let (owner_id, kind) = classify(identifier);
            if kind == MemberKind::Unknown {
                continue;
            }
            let key = (group.dn.clone(), group.source_system.clone(), owner_id.clone());
            if seen_owners.insert(key) {
                owner_edges.push(OwnerEdge {
                    group_dn: group.dn.clone(),
                    source_system: group.source_system.clone(),
                    owner_id,
                    owner_kind: kind_str(kind).to_string(),
                });
            }
        }
    }

    stats.member_edges = member_edges.len() as i64;
    stats.owner_edges = owner_edges.len() as i64;

    if dry_run {
        return Ok(stats);
    }

    const CHUNK: usize = 5000;
    let mut tx = link_tables::begin_rebuild(pool).await?;
    link_tables::truncate(&mut tx, "group_members").await?;
    link_tables::truncate(&mut tx, "group_owners").await?;

    for chunk in member_edges.chunks(CHUNK) {
        for edge in chunk {
            sqlx::query(
                "INSERT INTO silver.group_members \
                     (group_dn, source_system, member_id, member_kind, is_direct) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&edge.group_dn)
            .bind(&edge.source_system)
            .bind(&edge.member_id)
            .bind(&edge.member_kind)
            .bind(edge.is_direct)
            .execute(&mut *tx)
            .await?;
        }
    }

    for chunk in owner_edges.chunks(CHUNK) {
        for edge in chunk {
            sqlx::query(
                "INSERT INTO silver.group_owners (group_dn, source_system, owner_id, owner_kind) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&edge.group_dn)
            .bind(&edge.source_system)
            .bind(&edge.owner_id)
            .bind(&edge.owner_kind)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(stats)
}

//! Content-hash and entity-hash primitives. Every ingester and every
//! consolidator goes through the helpers here so the "same field set"
//! invariant between ingester and enricher (and between Silver-source
//! producer and consumer) holds by construction rather than by convention.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Sentinel UUID TDX (and others) use in place of a real null foreign key.
pub const NULL_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// SHA-256 over a sorted-key, compact-separator JSON document built from a
/// whitelisted field subset. The `BTreeMap` key ordering gives us sorted
/// keys for free; `serde_json::to_vec` is already compact (no pretty print).
pub fn hash_fields(fields: &BTreeMap<&str, Value>) -> String {
    let bytes = serde_json::to_vec(fields).expect("BTreeMap<&str, Value> always serializes");
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

/// Extends a basic field map with enrichment-only fields and hashes the
/// union. The caller is responsible for building `detail_fields` from the
/// same record the basic hash was computed from.
pub fn hash_enriched<'a>(
    basic_fields: &BTreeMap<&'a str, Value>,
    detail_fields: &BTreeMap<&'a str, Value>,
) -> String {
    let mut merged = basic_fields.clone();
    merged.extend(detail_fields.iter().map(|(k, v)| (*k, v.clone())));
    hash_fields(&merged)
}

/// SHA-256 over a typed Silver row minus bookkeeping columns. `exclude`
/// names fields that are metadata, never business data (`raw_id`,
/// `entity_hash`, `ingestion_run_id`, timestamps, `source_system`).
pub fn entity_hash<T: Serialize>(row: &T, exclude: &[&str]) -> String {
    let value = serde_json::to_value(row).expect("Silver row types are always serializable");
    let mut map = match value {
        Value::Object(map) => map,
        other => panic!("entity_hash requires a struct/object, got {other:?}"),
    };
    for key in exclude {
        map.remove(*key);
    }
    let sorted: BTreeMap<&str, Value> = map.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    hash_fields(&sorted)
}

/// Trims whitespace; treats the empty string and a single-space string as
/// null, per the normalization rules.
pub fn trim_or_null(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Uppercases and strips common MAC-address separators (`:`, `-`) so two
/// differently-formatted representations of the same address compare equal.
pub fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(|c| !matches!(c, ':' | '-'))
        .collect::<String>()
        .to_uppercase()
}

/// Lowercases a uniqname or email local-part for cross-source comparison.
pub fn normalize_uniqname(value: &str) -> String {
    value.trim().to_lowercase()
}

/// True when the value is the well-known null-UUID sentinel.
pub fn is_null_uuid(value: &str) -> bool {
    value == NULL_UUID
}

/// `Some(value)` unless `value` is the null-UUID sentinel, in which case
/// `None` — TDX `OwningCustomerID` and similar FK-shaped fields use this.
pub fn uuid_or_null_if_sentinel(value: Option<&str>) -> Option<String> {
    let value = trim_or_null(value)?;
    if is_null_uuid(&value) {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_stable_regardless_of_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("Name", json!("Bio"));
        a.insert("Code", json!("B"));

        let mut b = BTreeMap::new();
        b.insert("Code", json!("B"));
        b.insert("Name", json!("Bio"));

        assert_eq!(hash_fields(&a), hash_fields(&b));
    }

    #[test]
    fn hash_changes_when_a_whitelisted_field_changes() {
        let mut a = BTreeMap::new();
        a.insert("Name", json!("Bio"));
        let mut b = BTreeMap::new();
        b.insert("Name", json!("Biology"));
        assert_ne!(hash_fields(&a), hash_fields(&b));
    }

    #[test]
    fn normalize_mac_strips_separators_and_uppercases() {
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee:ff"), "AABBCCDDEEFF");
        assert_eq!(normalize_mac("AA-BB-CC-DD-EE-FF"), "AABBCCDDEEFF");
    }

    #[test]
    fn trim_or_null_treats_blank_and_single_space_as_null() {
        assert_eq!(trim_or_null(Some(" ")), None);
        assert_eq!(trim_or_null(Some("")), None);
        assert_eq!(trim_or_null(Some(" x ")), Some("x".to_string()));
        assert_eq!(trim_or_null(None), None);
    }

    #[test]
    fn null_uuid_sentinel_is_recognized() {
        assert_eq!(uuid_or_null_if_sentinel(Some(NULL_UUID)), None);
        assert_eq!(
            uuid_or_null_if_sentinel(Some("abc")),
            Some("abc".to_string())
        );
    }

    #[derive(Serialize)]
    struct Row {
        key: String,
        value: i32,
        raw_id: i64,
        entity_hash: String,
        updated_at: String,
    }

    #[test]
    fn entity_hash_excludes_metadata_fields() {
        let a = Row {
            key: "k".into(),
            value: 1,
            raw_id: 1,
            entity_hash: "old".into(),
            updated_at: "2024-01-01".into(),
        };
        let b = Row {
            key: "k".into(),
            value: 1,
            raw_id: 2,
            entity_hash: "new".into(),
            updated_at: "2024-02-02".into(),
        };
        let exclude = ["raw_id", "entity_hash", "updated_at"];
        assert_eq!(entity_hash(&a, &exclude), entity_hash(&b, &exclude));
    }
}

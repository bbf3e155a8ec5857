//! Table-driven field projection. A `FieldMapping` array
//! drives each source's column mapping instead of hand-written per-field
//! assignment, so adding a column is a data change, not a code change.

use serde_json::Value;

use crate::error::AppError;
use crate::sources::ldap::parse_ad_generalized_time;

#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub source_key: &'static str,
    pub dest_field: &'static str,
    pub converter: fn(Option<&Value>) -> Result<Value, AppError>,
}

/// TDX's zero-date sentinel (`0001-01-01T00:00:00Z`) represents null.
pub fn iso8601_or_null(value: Option<&Value>) -> Result<Value, AppError> {
    match value.and_then(Value::as_str) {
        Some(s) if s.starts_with("0001-01-01") => Ok(Value::Null),
        Some(s) => Ok(Value::String(s.to_string())),
        None => Ok(Value::Null),
    }
}

pub fn ad_generalized_time_or_null(value: Option<&Value>) -> Result<Value, AppError> {
    match value.and_then(Value::as_str) {
        Some(s) => match parse_ad_generalized_time(s) {
            Some(ts) => Ok(Value::String(ts.to_rfc3339())),
            None => Ok(Value::Null),
        },
        None => Ok(Value::Null),
    }
}

pub fn string_array_from_single_or_list(value: Option<&Value>) -> Result<Value, AppError> {
    use crate::sources::ldap::to_string_array;
    Ok(Value::Array(
        to_string_array(value).into_iter().map(Value::String).collect(),
    ))
}

pub fn uuid_or_null_if_sentinel(value: Option<&Value>) -> Result<Value, AppError> {
    use crate::hashing::uuid_or_null_if_sentinel as normalize;
    let s = value.and_then(Value::as_str);
    Ok(match normalize(s) {
        Some(v) => Value::String(v),
        None => Value::Null,
    })
}

pub fn passthrough(value: Option<&Value>) -> Result<Value, AppError> {
    Ok(value.cloned().unwrap_or(Value::Null))
}

pub fn trimmed_string_or_null(value: Option<&Value>) -> Result<Value, AppError> {
    use crate::hashing::trim_or_null;
    Ok(match trim_or_null(value.and_then(Value::as_str)) {
        Some(v) => Value::String(v),
        None => Value::Null,
    })
}

/// Applies a field-mapping table to a raw JSON object, producing a
/// destination-keyed object. Missing source keys map through the converter
/// with `None`, so every converter must define sensible null behavior.
pub fn apply(mappings: &[FieldMapping], raw: &Value) -> Result<Value, AppError> {
    let mut out = serde_json::Map::new();
    for mapping in mappings {
        let source_value = raw.get(mapping.source_key);
        let converted = (mapping.converter)(source_value)?;
        out.insert(mapping.dest_field.to_string(), converted);
    }
    Ok(Value::Object(out))
}

/// Locates a TDX asset attribute entry by its field id within the
/// `Attributes` array (`[{"ID": ..., "Value": ...}, ...]`).
pub fn find_attribute<'a>(attributes: &'a Value, field_id: i64) -> Option<&'a Value> {
    attributes.as_array()?.iter().find(|attr| {
        attr.get("ID").and_then(Value::as_i64) == Some(field_id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_date_maps_to_null() {
        assert_eq!(
            iso8601_or_null(Some(&json!("0001-01-01T00:00:00Z"))).unwrap(),
            Value::Null
        );
        assert_eq!(
            iso8601_or_null(Some(&json!("2024-05-01T00:00:00Z"))).unwrap(),
            json!("2024-05-01T00:00:00Z")
        );
    }

    #[test]
    fn find_attribute_matches_by_field_id() {
        let attrs = json!([{"ID": 101, "Value": "x"}, {"ID": 202, "Value": "y"}]);
        assert_eq!(
            find_attribute(&attrs, 202).and_then(|a| a.get("Value")),
            Some(&json!("y"))
        );
        assert!(find_attribute(&attrs, 999).is_none());
    }
}

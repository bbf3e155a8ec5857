use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use ldap3::{LdapConnAsync, Scope, SearchEntry};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};

use super::{RawRecord, SourceClient};

pub struct LdapConfig {
    pub host: String,
    pub bind_dn: String,
    pub bind_password: String,
    pub base_dn: String,
    pub filter: String,
    pub attributes: Vec<String>,
}

/// Shared AD / MCommunity directory client. Both directories return the
/// same shape (DN + single/multi-valued attributes); the distinction
/// between them is entirely in `LdapConfig` (bind credentials, base DN,
/// filter) supplied by the caller.
pub struct LdapDirectoryClient {
    config: LdapConfig,
}

impl LdapDirectoryClient {
    pub fn new(config: LdapConfig) -> Self {
        Self { config }
    }

    fn attrs_to_json(entry: &SearchEntry) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("dn".to_string(), json!(entry.dn));
        for (key, values) in &entry.attrs {
            if values.len() == 1 {
                map.insert(key.clone(), json!(values[0]));
            } else {
                map.insert(key.clone(), json!(values));
            }
        }
        Value::Object(map)
    }
}

#[async_trait]
impl SourceClient for LdapDirectoryClient {
    async fn fetch_candidates(
        &self,
        since: Option<DateTime<Utc>>,
        full_sync: bool,
    ) -> AppResult<Vec<RawRecord>> {
        let (conn, mut ldap) = LdapConnAsync::new(&self.config.host)
            .await
            .map_err(|e| AppError::Message(format!("LDAP connect failed: {e}")))?;
        ldap3::drive!(conn);

        ldap.simple_bind(&self.config.bind_dn, &self.config.bind_password)
            .await
            .map_err(|e| AppError::Message(format!("LDAP bind failed: {e}")))?
            .success()
            .map_err(|e| AppError::Message(format!("LDAP bind rejected: {e}")))?;

        let (entries, _res) = ldap
            .search(
                &self.config.base_dn,
                Scope::Subtree,
                &self.config.filter,
                self.config.attributes.clone(),
            )
            .await
            .map_err(|e| AppError::Message(format!("LDAP search failed: {e}")))?
            .success()
            .map_err(|e| AppError::Message(format!("LDAP search rejected: {e}")))?;

        let mut out = Vec::with_capacity(entries.len());
        for raw_entry in entries {
            let entry = SearchEntry::construct(raw_entry);
            let external_id = entry.dn.clone();
            let data = Self::attrs_to_json(&entry);
            let modified_at = data
                .get("whenChanged")
                .and_then(Value::as_str)
                .and_then(parse_ad_generalized_time);

            // Most directories cannot filter server-side on modification
            // time; apply the watermark client-side.
            if !full_sync {
                if let (Some(since), Some(modified_at)) = (since, modified_at) {
                    if modified_at <= since {
                        continue;
                    }
                }
            }

            out.push(RawRecord {
                external_id,
                modified_at,
                data,
            });
        }

        let _ = ldap.unbind().await;
        Ok(out)
    }
}

/// Parses AD generalized time (`YYYYMMDDHHMMSSZ`) into a UTC timestamp.
pub fn parse_ad_generalized_time(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim_end_matches('Z');
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y%m%d%H%M%S").ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Normalizes an LDAP attribute that may be a single string or a list into
/// a string array.
pub fn to_string_array(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// `userAccountControl` bit 2 (`ACCOUNTDISABLE`, value `0x2`) — the account
/// is enabled when the bit is clear.
pub fn is_enabled_from_uac(uac: Option<i64>) -> Option<bool> {
    uac.map(|value| value & 0x2 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uac_bit_two_clear_means_enabled() {
        assert_eq!(is_enabled_from_uac(Some(512)), Some(true));
        assert_eq!(is_enabled_from_uac(Some(514)), Some(false));
        assert_eq!(is_enabled_from_uac(None), None);
    }

    #[test]
    fn generalized_time_parses() {
        let parsed = parse_ad_generalized_time("20240715120000Z").unwrap();
        assert_eq!(parsed.to_string(), "2024-07-15 12:00:00 UTC");
    }

    #[test]
    fn string_array_normalizes_single_and_multi() {
        assert_eq!(to_string_array(Some(&json!("a"))), vec!["a".to_string()]);
        assert_eq!(
            to_string_array(Some(&json!(["a", "b"]))),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(to_string_array(None), Vec::<String>::new());
    }
}

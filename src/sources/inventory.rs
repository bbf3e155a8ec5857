use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{AppError, AppResult};

use super::{RawRecord, SourceClient};

/// Inventory agent client. The endpoint returns one row per NIC, keyed by
/// `(Name, OEM SN)` — several rows can describe the same physical machine.
/// Consolidation of those rows into one computer happens in the Silver
/// transform's pre-pass, not here; Bronze stores rows as received.
pub struct InventoryAgentClient {
    http: reqwest::Client,
    endpoint: String,
}

impl InventoryAgentClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    fn external_id_of(record: &Value) -> AppResult<String> {
        let name = record
            .get("Name")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Projection("inventory row missing Name".into()))?;
        let mac = record
            .get("MAC Address")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Projection("inventory row missing MAC Address".into()))?;
        Ok(format!("{name}|{mac}"))
    }

    fn last_session_of(record: &Value) -> Option<DateTime<Utc>> {
        record
            .get("Last Session")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[async_trait]
impl SourceClient for InventoryAgentClient {
    async fn fetch_candidates(
        &self,
        since: Option<DateTime<Utc>>,
        full_sync: bool,
    ) -> AppResult<Vec<RawRecord>> {
        let body: Value = self
            .http
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let records = body
            .as_array()
            .cloned()
            .ok_or_else(|| AppError::Projection("inventory agent response was not an array".into()))?;

        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let modified_at = Self::last_session_of(&record);
            // The inventory agent has no server-side modification filter;
            // apply the watermark client-side against Last Session.
            if !full_sync {
                if let (Some(since), Some(modified_at)) = (since, modified_at) {
                    if modified_at <= since {
                        continue;
                    }
                }
            }
            out.push(RawRecord {
                external_id: Self::external_id_of(&record)?,
                modified_at,
                data: record,
            });
        }
        Ok(out)
    }
}

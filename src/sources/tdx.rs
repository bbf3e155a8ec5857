use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{AppError, AppResult};

use super::{DetailClient, RawRecord, SourceClient};

/// TeamDynamix REST client. One instance is shared per entity (users,
/// departments, assets) — `list_path` and `detail_path_prefix` select the
/// endpoint family.
pub struct TdxClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    app_id: String,
    list_path: String,
    detail_path_prefix: Option<String>,
    modified_date_field: &'static str,
}

impl TdxClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        app_id: impl Into<String>,
        list_path: impl Into<String>,
        detail_path_prefix: Option<String>,
        modified_date_field: &'static str,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_token: api_token.into(),
            app_id: app_id.into(),
            list_path: list_path.into(),
            detail_path_prefix,
            modified_date_field,
        }
    }

    fn list_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.list_path)
    }

    async fn get_json(&self, url: &str) -> AppResult<Value> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.api_token)
            .header("X-TDX-AppId", &self.app_id)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<Value>().await?)
    }

    fn external_id_of(record: &Value) -> AppResult<String> {
        record
            .get("ID")
            .map(|v| v.to_string())
            .ok_or_else(|| AppError::Projection("TDX record missing ID".into()))
    }

    fn modified_at_of(&self, record: &Value) -> Option<DateTime<Utc>> {
        record
            .get(self.modified_date_field)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[async_trait]
impl SourceClient for TdxClient {
    async fn fetch_candidates(
        &self,
        since: Option<DateTime<Utc>>,
        full_sync: bool,
    ) -> AppResult<Vec<RawRecord>> {
        let body = self.get_json(&self.list_url()).await?;
        let records = body
            .as_array()
            .cloned()
            .ok_or_else(|| AppError::Projection("TDX list response was not an array".into()))?;

        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let modified_at = self.modified_at_of(&record);
            // TDX's list endpoints do not reliably support server-side
            // modification filters for every entity, so we filter
            // client-side when not doing a full sync.
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

#[async_trait]
impl DetailClient for TdxClient {
    async fn fetch_detail(&self, external_id: &str) -> AppResult<Value> {
        let prefix = self.detail_path_prefix.as_ref().ok_or_else(|| {
            AppError::Projection("this TdxClient has no detail endpoint configured".into())
        })?;
        let url = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            prefix,
            external_id
        );
        self.get_json(&url).await
    }
}

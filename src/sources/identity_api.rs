use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};

use super::{RawRecord, SourceClient};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Institutional identity API client — department and employment lookups.
/// `resource` selects `departments` or `employment-records`; `key_field` is
/// the record's natural key (`DeptID` or `uniqname`).
pub struct IdentityApiClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    resource: String,
    key_field: &'static str,
}

impl IdentityApiClient {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        resource: impl Into<String>,
        key_field: &'static str,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            resource: resource.into(),
            key_field,
        }
    }

    async fn access_token(&self) -> AppResult<String> {
        let resp = self
            .http
            .post(format!("{}/oauth/token", self.base_url.trim_end_matches('/')))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<TokenResponse>()
            .await?;
        Ok(resp.access_token)
    }

    /// Empty and whitespace-only strings represent null in this API's
    /// payloads — normalize them the same way the typed projector does.
    fn is_blank(value: &str) -> bool {
        value.trim().is_empty()
    }
}

#[async_trait]
impl SourceClient for IdentityApiClient {
    async fn fetch_candidates(
        &self,
        _since: Option<DateTime<Utc>>,
        _full_sync: bool,
    ) -> AppResult<Vec<RawRecord>> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.resource
        );
        let body: Value = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let records = body
            .as_array()
            .cloned()
            .ok_or_else(|| AppError::Projection("identity API response was not an array".into()))?;

        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let key = record
                .get(self.key_field)
                .and_then(Value::as_str)
                .filter(|v| !Self::is_blank(v))
                .ok_or_else(|| {
                    AppError::Projection(format!("identity API record missing {}", self.key_field))
                })?;
            out.push(RawRecord {
                external_id: key.to_string(),
                modified_at: None,
                data: record,
            });
        }
        Ok(out)
    }
}

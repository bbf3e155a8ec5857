//! Upstream source collaborators: TDX, LDAP
//! directories, the institutional identity API, the inventory agent, and
//! CSV exports. These are deliberately thin — the hard engineering is the
//! ingestion/enrichment/transformation engines that consume them through
//! the [`SourceClient`] / [`DetailClient`] contracts, not the clients
//! themselves.

pub mod csv_source;
pub mod identity_api;
pub mod inventory;
pub mod ldap;
pub mod tdx;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::AppResult;

/// One candidate record as seen by an ingester, before hashing.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub external_id: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub data: Value,
}

/// A source that can list candidate records, optionally scoped to changes
/// since a watermark. Sources that cannot filter server-side on
/// modification time (most LDAP directories, the inventory agent) filter
/// client-side using their own modified-date field.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch_candidates(
        &self,
        since: Option<DateTime<Utc>>,
        full_sync: bool,
    ) -> AppResult<Vec<RawRecord>>;
}

/// A source with a per-record detail endpoint, used by the Bronze enricher.
#[async_trait]
pub trait DetailClient: Send + Sync {
    async fn fetch_detail(&self, external_id: &str) -> AppResult<Value>;
}

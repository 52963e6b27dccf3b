use chrono::{DateTime, Utc};
use gridfeed_core::{OperationId, ResultRow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// One cached result set.
///
/// Multiple entries may exist per operation id; readers take the newest
/// non-expired one. `expires_at` is always strictly after `created_at` for
/// any positive TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub id: Uuid,
    pub operation_id: OperationId,
    pub rows: Vec<ResultRow>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    #[must_use]
    pub fn new(operation_id: OperationId, rows: Vec<ResultRow>, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let ttl = chrono::Duration::milliseconds(ttl.as_millis().min(i64::MAX as u128) as i64);
        let expires_at = created_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id: Uuid::new_v4(),
            operation_id,
            rows,
            created_at,
            expires_at,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

//! Audit recorder: durable, append-only records of every
//! authentication/authorization decision.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::AuditEntry;
use crate::services::{Database, ServiceError};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

/// Filters for the audit query surface.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub event_type: Option<String>,
    pub user_id: Option<Uuid>,
    pub success: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditFilter {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Audit recording service.
#[derive(Clone)]
pub struct AuditService {
    db: Database,
}

impl AuditService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record an entry synchronously. Used where the record must be durable
    /// before the operation reports back.
    pub async fn record(&self, entry: AuditEntry) -> Result<(), ServiceError> {
        tracing::debug!(
            event_type = %entry.event_type,
            success = entry.success,
            "Audit event"
        );
        self.db.insert_audit_entry(&entry).await
    }

    /// Record an entry without blocking the caller. Failures are logged, not
    /// propagated: a denial response must not turn into a 500 because the
    /// audit insert raced a restart.
    pub fn record_async(&self, entry: AuditEntry) {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(e) = db.insert_audit_entry(&entry).await {
                tracing::error!(
                    error = %e,
                    event_type = %entry.event_type,
                    "Failed to write audit entry"
                );
            }
        });
    }

    /// Query entries, newest first. Read-only surface for the administrative
    /// reporting layer.
    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, ServiceError> {
        self.db.query_audit_entries(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped_to_page_bounds() {
        let filter = AuditFilter {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(filter.limit(), MAX_PAGE_SIZE);

        let filter = AuditFilter {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(filter.limit(), 1);

        let filter = AuditFilter::default();
        assert_eq!(filter.limit(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn negative_offset_is_floored() {
        let filter = AuditFilter {
            offset: Some(-5),
            ..Default::default()
        };
        assert_eq!(filter.offset(), 0);
    }
}

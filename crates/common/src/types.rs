// Core domain types shared across all Folio crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An advisory, time-bounded editing lease on one document.
///
/// At most one non-expired lease exists per document. The lease gates `save`
/// only; rollback, tagging and reads never consult it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lease {
    pub document_id: Uuid,
    pub holder_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// One immutable entry in a document's version chain.
///
/// `version_number` starts at 1 and is strictly increasing with no gaps.
/// Only the `tag` field may be rewritten after creation (last write wins).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Version {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_number: i64,
    /// Content address (sha-256 hex) into the blob store.
    pub content_ref: String,
    pub message: String,
    pub author_id: String,
    #[serde(default)]
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The wire summary of a version, as returned by save/rollback/list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionSummary {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_number: i64,
    pub message: String,
    pub author_id: String,
    #[serde(default)]
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Version> for VersionSummary {
    fn from(version: Version) -> Self {
        Self {
            id: version.id,
            document_id: version.document_id,
            version_number: version.version_number,
            message: version.message,
            author_id: version.author_id,
            tag: version.tag,
            created_at: version.created_at,
        }
    }
}

/// One page of a document's version listing, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionPage {
    pub items: Vec<VersionSummary>,
    pub total: u64,
}

/// Lock status as reported to callers.
///
/// `remaining_sec` and `expiring_soon` are present only while a lease is
/// active; `expiring_soon` flips once the remaining time drops under the
/// configured warning threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockStatus {
    pub lease: Option<Lease>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiring_soon: Option<bool>,
}

impl LockStatus {
    pub fn absent() -> Self {
        Self { lease: None, remaining_sec: None, expiring_soon: None }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{Lease, LockStatus, Version, VersionSummary};

    fn ts(seconds: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("timestamp should be valid")
    }

    #[test]
    fn lease_expiry_is_inclusive_at_the_boundary() {
        let now = ts(1_700_000_000);
        let lease = Lease {
            document_id: Uuid::new_v4(),
            holder_id: "alice".into(),
            acquired_at: now,
            expires_at: now + Duration::seconds(900),
        };

        assert!(!lease.is_expired_at(now));
        assert!(!lease.is_expired_at(now + Duration::seconds(899)));
        assert!(lease.is_expired_at(now + Duration::seconds(900)));
    }

    #[test]
    fn version_summary_preserves_fields() {
        let version = Version {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            version_number: 7,
            content_ref: "ab".repeat(32),
            message: "tighten intro".into(),
            author_id: "agent-1".into(),
            tag: Some("approved".into()),
            created_at: ts(1_700_000_100),
        };

        let summary = VersionSummary::from(version.clone());
        assert_eq!(summary.id, version.id);
        assert_eq!(summary.version_number, 7);
        assert_eq!(summary.tag.as_deref(), Some("approved"));
    }

    #[test]
    fn absent_lock_status_serializes_without_optional_fields() {
        let encoded = serde_json::to_value(LockStatus::absent()).expect("status should encode");
        assert_eq!(encoded, serde_json::json!({ "lease": null }));
    }
}

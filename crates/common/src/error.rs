// Error taxonomy for the document editing core.
//
// Collaboration conflicts (`LockConflict`, `Unauthorized`) surface to the
// caller unchanged; only `StorageFailure` is retried inside the daemon, and
// only a bounded number of times before it lands here.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

// JSON-RPC application error codes (the -32000..-32099 server range).
pub const LOCK_CONFLICT: i32 = -32001;
pub const LOCK_NOT_FOUND: i32 = -32002;
pub const UNAUTHORIZED: i32 = -32003;
pub const VERSION_NOT_FOUND: i32 = -32004;
pub const STORAGE_FAILURE: i32 = -32005;

/// Failures the editing core can report to a caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("document {document_id} is locked by {holder_id} until {expires_at}")]
    LockConflict { document_id: Uuid, holder_id: String, expires_at: DateTime<Utc> },

    #[error("no active lease on document {document_id} held by {holder_id}")]
    LockNotFound { document_id: Uuid, holder_id: String },

    #[error("save on document {document_id} requires a valid lease held by {holder_id}")]
    Unauthorized { document_id: Uuid, holder_id: String },

    #[error("version {version_id} does not belong to document {document_id}")]
    VersionNotFound { document_id: Uuid, version_id: Uuid },

    #[error("storage failure on document {document_id}: {reason}")]
    StorageFailure { document_id: Uuid, reason: String },
}

impl EditError {
    /// JSON-RPC application error code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            Self::LockConflict { .. } => LOCK_CONFLICT,
            Self::LockNotFound { .. } => LOCK_NOT_FOUND,
            Self::Unauthorized { .. } => UNAUTHORIZED,
            Self::VersionNotFound { .. } => VERSION_NOT_FOUND,
            Self::StorageFailure { .. } => STORAGE_FAILURE,
        }
    }

    /// Whether retrying the same call can ever succeed without a human or
    /// calling-agent decision first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageFailure { .. })
    }

    /// Structured context for the error payload, enough for the caller to
    /// decide between retry and abort.
    pub fn data(&self) -> serde_json::Value {
        match self {
            Self::LockConflict { document_id, holder_id, expires_at } => serde_json::json!({
                "document_id": document_id,
                "holder_id": holder_id,
                "expires_at": expires_at,
            }),
            Self::LockNotFound { document_id, holder_id }
            | Self::Unauthorized { document_id, holder_id } => serde_json::json!({
                "document_id": document_id,
                "holder_id": holder_id,
            }),
            Self::VersionNotFound { document_id, version_id } => serde_json::json!({
                "document_id": document_id,
                "version_id": version_id,
            }),
            Self::StorageFailure { document_id, reason } => serde_json::json!({
                "document_id": document_id,
                "reason": reason,
            }),
        }
    }
}

/// Result type alias for editing-core operations.
pub type EditResult<T> = std::result::Result<T, EditError>;

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::{EditError, LOCK_CONFLICT, STORAGE_FAILURE, UNAUTHORIZED};

    #[test]
    fn codes_are_stable_per_variant() {
        let doc = Uuid::new_v4();
        let conflict = EditError::LockConflict {
            document_id: doc,
            holder_id: "bob".into(),
            expires_at: Utc.timestamp_opt(1_700_000_000, 0).single().expect("valid timestamp"),
        };
        let unauthorized = EditError::Unauthorized { document_id: doc, holder_id: "bob".into() };
        let storage = EditError::StorageFailure { document_id: doc, reason: "disk full".into() };

        assert_eq!(conflict.code(), LOCK_CONFLICT);
        assert_eq!(unauthorized.code(), UNAUTHORIZED);
        assert_eq!(storage.code(), STORAGE_FAILURE);
    }

    #[test]
    fn only_storage_failures_are_retryable() {
        let doc = Uuid::new_v4();
        assert!(EditError::StorageFailure { document_id: doc, reason: "busy".into() }
            .is_retryable());
        assert!(!EditError::Unauthorized { document_id: doc, holder_id: "a".into() }
            .is_retryable());
        assert!(!EditError::LockNotFound { document_id: doc, holder_id: "a".into() }
            .is_retryable());
    }

    #[test]
    fn error_data_carries_caller_context() {
        let document_id = Uuid::new_v4();
        let version_id = Uuid::new_v4();
        let error = EditError::VersionNotFound { document_id, version_id };

        let data = error.data();
        assert_eq!(data["document_id"], serde_json::json!(document_id));
        assert_eq!(data["version_id"], serde_json::json!(version_id));
    }
}

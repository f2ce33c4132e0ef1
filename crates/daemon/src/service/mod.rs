// Document editing orchestration: locks, saves, version chain, diffs.
//
// The service owns the stores and enforces the collaboration rules:
// - `save` requires the caller to hold an unexpired lease on the document
// - every version-creating operation serializes through the per-document
//   allocator guard, so version numbers stay gapless
// - transient storage errors get a bounded retry; contention errors
//   (`LockConflict`, `Unauthorized`) always surface immediately

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use folio_common::diff::{line_diff, DiffEntry};
use folio_common::error::{EditError, EditResult};
use folio_common::types::{Lease, LockStatus, Version, VersionPage};

use crate::config::{GlobalConfig, LeaseConfig, StorageConfig};
use crate::lock::LockManager;
use crate::store::blobs::BlobStore;
use crate::store::meta_db::MetaDb;
use crate::store::versions::{VersionAllocator, VersionStore};

pub const DEFAULT_PAGE_LIMIT: u64 = 50;

pub struct DocumentEditingService {
    meta_db: Arc<Mutex<MetaDb>>,
    blobs: BlobStore,
    locks: Arc<Mutex<LockManager>>,
    allocator: VersionAllocator,
    lease_cfg: LeaseConfig,
    storage_cfg: StorageConfig,
}

impl DocumentEditingService {
    pub fn new(
        meta_db: MetaDb,
        blobs: BlobStore,
        locks: LockManager,
        config: &GlobalConfig,
    ) -> Self {
        Self {
            meta_db: Arc::new(Mutex::new(meta_db)),
            blobs,
            locks: Arc::new(Mutex::new(locks)),
            allocator: VersionAllocator::default(),
            lease_cfg: config.lease.clone(),
            storage_cfg: config.storage.clone(),
        }
    }

    /// Open all stores under `state_dir` and load persisted leases.
    pub fn open(state_dir: impl AsRef<Path>, config: &GlobalConfig) -> Result<Self> {
        let state_dir = state_dir.as_ref();
        let meta_db = MetaDb::open(state_dir.join("meta.db"))?;
        let blobs = BlobStore::new(state_dir)?;
        let locks = LockManager::new(meta_db.connection(), Utc::now())
            .context("failed to load persisted leases")?;
        Ok(Self::new(meta_db, blobs, locks, config))
    }

    // ── Locking ────────────────────────────────────────────────────

    pub fn acquire_lock(
        &self,
        doc_id: Uuid,
        holder_id: &str,
        now: DateTime<Utc>,
    ) -> EditResult<Lease> {
        let lease = self.with_lock_storage(doc_id, |conn, locks| {
            locks.acquire(conn, doc_id, holder_id, now, self.lease_cfg.ttl())
        })?;
        info!(doc_id = %doc_id, holder_id, expires_at = %lease.expires_at, "lock acquired");
        Ok(lease)
    }

    pub fn release_lock(
        &self,
        doc_id: Uuid,
        holder_id: &str,
        now: DateTime<Utc>,
    ) -> EditResult<()> {
        self.with_lock_storage(doc_id, |conn, locks| locks.release(conn, doc_id, holder_id, now))?;
        info!(doc_id = %doc_id, holder_id, "lock released");
        Ok(())
    }

    pub fn lock_status(&self, doc_id: Uuid, now: DateTime<Utc>) -> EditResult<LockStatus> {
        let lease =
            self.with_lock_storage(doc_id, |conn, locks| locks.status(conn, doc_id, now))?;

        Ok(match lease {
            Some(lease) => {
                let remaining = lease.expires_at.signed_duration_since(now);
                LockStatus {
                    lease: Some(lease),
                    remaining_sec: Some(remaining.num_seconds()),
                    expiring_soon: Some(remaining <= self.lease_cfg.warn_threshold()),
                }
            }
            None => LockStatus::absent(),
        })
    }

    // ── Versioning ─────────────────────────────────────────────────

    /// Save new content as the next version of the document.
    ///
    /// Requires the caller's unexpired lease; without it nothing is
    /// written and `Unauthorized` surfaces.
    pub fn save(
        &self,
        doc_id: Uuid,
        holder_id: &str,
        content: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> EditResult<Version> {
        let lease =
            self.with_lock_storage(doc_id, |conn, locks| locks.status(conn, doc_id, now))?;
        let held = lease.map(|lease| lease.holder_id == holder_id).unwrap_or(false);
        if !held {
            return Err(EditError::Unauthorized {
                document_id: doc_id,
                holder_id: holder_id.to_string(),
            });
        }

        let version = self.create_version(doc_id, content, message, holder_id, now)?;
        info!(
            doc_id = %doc_id,
            holder_id,
            version_number = version.version_number,
            "document saved"
        );
        Ok(version)
    }

    pub fn list_versions(
        &self,
        doc_id: Uuid,
        page: u64,
        limit: u64,
    ) -> EditResult<VersionPage> {
        let limit = if limit == 0 { DEFAULT_PAGE_LIMIT } else { limit };
        let offset = page.saturating_mul(limit);

        let (items, total) = self.with_meta_storage(doc_id, |conn| {
            VersionStore::list(conn, doc_id, offset, limit)
        })?;

        Ok(VersionPage { items: items.into_iter().map(Into::into).collect(), total })
    }

    pub fn get_version_content(&self, doc_id: Uuid, version_id: Uuid) -> EditResult<String> {
        let version = self.require_version(doc_id, version_id)?;
        let content = self
            .blobs
            .get(&version.content_ref)
            .map_err(|e| storage_failure(doc_id, &e))?
            .ok_or_else(|| EditError::StorageFailure {
                document_id: doc_id,
                reason: format!("blob `{}` missing for version {}", version.content_ref, version_id),
            })?;
        Ok(content)
    }

    pub fn tag_version(&self, doc_id: Uuid, version_id: Uuid, tag: &str) -> EditResult<()> {
        let tagged = self.with_meta_storage(doc_id, |conn| {
            VersionStore::set_tag(conn, doc_id, version_id, tag)
        })?;
        if !tagged {
            return Err(EditError::VersionNotFound { document_id: doc_id, version_id });
        }
        info!(doc_id = %doc_id, version_id = %version_id, tag, "version tagged");
        Ok(())
    }

    /// Restore an older version's content as a brand-new head version.
    ///
    /// No lease is required; the operation is race-safe through the
    /// allocator guard.
    pub fn rollback(
        &self,
        doc_id: Uuid,
        version_id: Uuid,
        author_id: &str,
        now: DateTime<Utc>,
    ) -> EditResult<Version> {
        let target = self.require_version(doc_id, version_id)?;
        let content = self.get_version_content(doc_id, version_id)?;
        let message = format!("rollback to v{}", target.version_number);

        let version = self.create_version(doc_id, &content, &message, author_id, now)?;
        info!(
            doc_id = %doc_id,
            target_version = target.version_number,
            version_number = version.version_number,
            "document rolled back"
        );
        Ok(version)
    }

    /// Line diff between two versions of the same document.
    pub fn diff(
        &self,
        doc_id: Uuid,
        version_a: Uuid,
        version_b: Uuid,
    ) -> EditResult<Vec<DiffEntry>> {
        let old_text = self.get_version_content(doc_id, version_a)?;
        let new_text = self.get_version_content(doc_id, version_b)?;
        Ok(line_diff(&old_text, &new_text))
    }

    // ── Internals ──────────────────────────────────────────────────

    /// Allocate the next gapless number and append, under the document's
    /// allocator guard.
    fn create_version(
        &self,
        doc_id: Uuid,
        content: &str,
        message: &str,
        author_id: &str,
        now: DateTime<Utc>,
    ) -> EditResult<Version> {
        let guard = self.allocator.guard_for(doc_id).map_err(|e| storage_failure(doc_id, &e))?;
        let _serialized = guard.lock().map_err(|_| EditError::StorageFailure {
            document_id: doc_id,
            reason: "version allocator guard poisoned".to_string(),
        })?;

        let content_ref =
            self.blobs.put(content).map_err(|e| storage_failure(doc_id, &e))?;

        self.with_storage_retry(doc_id, || {
            let db = self.meta_db.lock().map_err(|_| anyhow::anyhow!("meta db lock poisoned"))?;
            let next_number = VersionStore::head_number(db.connection(), doc_id)? + 1;
            let version = Version {
                id: Uuid::new_v4(),
                document_id: doc_id,
                version_number: next_number,
                content_ref: content_ref.clone(),
                message: message.to_string(),
                author_id: author_id.to_string(),
                tag: None,
                created_at: now,
            };
            VersionStore::append(db.connection(), &version)?;
            Ok(version)
        })
    }

    fn require_version(&self, doc_id: Uuid, version_id: Uuid) -> EditResult<Version> {
        self.with_meta_storage(doc_id, |conn| VersionStore::get(conn, doc_id, version_id))?
            .ok_or(EditError::VersionNotFound { document_id: doc_id, version_id })
    }

    fn with_lock_storage<T>(
        &self,
        doc_id: Uuid,
        f: impl FnOnce(&rusqlite::Connection, &mut LockManager) -> EditResult<T>,
    ) -> EditResult<T> {
        let db = self.meta_db.lock().map_err(|_| EditError::StorageFailure {
            document_id: doc_id,
            reason: "meta db lock poisoned".to_string(),
        })?;
        let mut locks = self.locks.lock().map_err(|_| EditError::StorageFailure {
            document_id: doc_id,
            reason: "lock manager lock poisoned".to_string(),
        })?;
        f(db.connection(), &mut locks)
    }

    fn with_meta_storage<T>(
        &self,
        doc_id: Uuid,
        f: impl FnMut(&rusqlite::Connection) -> Result<T>,
    ) -> EditResult<T> {
        let mut f = f;
        self.with_storage_retry(doc_id, || {
            let db = self.meta_db.lock().map_err(|_| anyhow::anyhow!("meta db lock poisoned"))?;
            f(db.connection())
        })
    }

    /// Bounded retry for transient SQLite busy/locked failures. Anything
    /// else fails on the first attempt.
    fn with_storage_retry<T>(
        &self,
        doc_id: Uuid,
        mut op: impl FnMut() -> Result<T>,
    ) -> EditResult<T> {
        let attempts = self.storage_cfg.retry_max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match op() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let transient = is_transient_sqlite(&error);
                    last_error = Some(error);
                    if !transient || attempt == attempts {
                        break;
                    }
                    std::thread::sleep(self.storage_cfg.retry_backoff());
                }
            }
        }

        let error = last_error.unwrap_or_else(|| anyhow::anyhow!("storage operation failed"));
        Err(storage_failure(doc_id, &error))
    }
}

fn storage_failure(doc_id: Uuid, error: &anyhow::Error) -> EditError {
    EditError::StorageFailure { document_id: doc_id, reason: format!("{error:#}") }
}

fn is_transient_sqlite(error: &anyhow::Error) -> bool {
    for cause in error.chain() {
        if let Some(rusqlite::Error::SqliteFailure(failure, _)) =
            cause.downcast_ref::<rusqlite::Error>()
        {
            if matches!(
                failure.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return true;
            }
        }
    }
    false
}

// Advisory editing lease storage (in-memory + SQLite).
//
// Leases are TTL-driven only:
// - acquire grants or refreshes a lease with `expires_at = now + ttl`
// - a repeat acquire by the current holder extends the same lease
// - expired leases are pruned lazily from memory and SQLite
//
// One lease per document, exclusive. The lock is advisory: it gates
// `doc.save` and nothing else.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use folio_common::error::{EditError, EditResult};
use folio_common::types::Lease;

/// Lease store with in-memory fast path and SQLite durability.
#[derive(Debug, Default)]
pub struct LockManager {
    leases: HashMap<Uuid, Lease>,
}

impl LockManager {
    /// Load active leases from SQLite into memory.
    pub fn new(conn: &Connection, now: DateTime<Utc>) -> Result<Self> {
        let mut manager = Self::default();
        manager.prune_expired(conn, now)?;
        manager.load_from_sqlite(conn, now)?;
        Ok(manager)
    }

    /// Number of currently loaded active leases.
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    /// Acquire or renew the lease on a document.
    ///
    /// A repeat acquire by the current holder extends expiry by a full
    /// TTL window. A different active holder fails fast with
    /// `LockConflict`; callers never queue behind a held lock.
    pub fn acquire(
        &mut self,
        conn: &Connection,
        doc_id: Uuid,
        holder_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> EditResult<Lease> {
        self.prune_expired(conn, now).map_err(|e| storage_failure(doc_id, &e))?;

        if let Some(existing) = self.leases.get(&doc_id) {
            if !existing.is_expired_at(now) && existing.holder_id != holder_id {
                return Err(EditError::LockConflict {
                    document_id: doc_id,
                    holder_id: existing.holder_id.clone(),
                    expires_at: existing.expires_at,
                });
            }
        }

        let acquired_at = match self.leases.get(&doc_id) {
            Some(existing) if !existing.is_expired_at(now) => existing.acquired_at,
            _ => now,
        };
        let lease =
            Lease { document_id: doc_id, holder_id: holder_id.to_string(), acquired_at, expires_at: now + ttl };

        upsert_lease(conn, &lease).map_err(|e| storage_failure(doc_id, &e))?;
        self.leases.insert(doc_id, lease.clone());

        Ok(lease)
    }

    /// Release the holder's own lease.
    ///
    /// Releasing a lock that is absent, expired, or held by someone else
    /// is `LockNotFound` and has no side effect.
    pub fn release(
        &mut self,
        conn: &Connection,
        doc_id: Uuid,
        holder_id: &str,
        now: DateTime<Utc>,
    ) -> EditResult<()> {
        self.prune_expired(conn, now).map_err(|e| storage_failure(doc_id, &e))?;

        match self.leases.get(&doc_id) {
            Some(lease) if lease.holder_id == holder_id && !lease.is_expired_at(now) => {}
            _ => {
                return Err(EditError::LockNotFound {
                    document_id: doc_id,
                    holder_id: holder_id.to_string(),
                });
            }
        }

        delete_lease(conn, doc_id).map_err(|e| storage_failure(doc_id, &e))?;
        self.leases.remove(&doc_id);
        Ok(())
    }

    /// Current active lease on a document, if any.
    pub fn status(
        &mut self,
        conn: &Connection,
        doc_id: Uuid,
        now: DateTime<Utc>,
    ) -> EditResult<Option<Lease>> {
        self.prune_expired(conn, now).map_err(|e| storage_failure(doc_id, &e))?;
        Ok(self.leases.get(&doc_id).filter(|lease| !lease.is_expired_at(now)).cloned())
    }

    /// True when `holder_id` holds an unexpired lease on the document.
    pub fn is_held_by(&self, doc_id: Uuid, holder_id: &str, now: DateTime<Utc>) -> bool {
        self.leases
            .get(&doc_id)
            .map(|lease| lease.holder_id == holder_id && !lease.is_expired_at(now))
            .unwrap_or(false)
    }

    /// Remove expired leases from memory and SQLite.
    pub fn prune_expired(&mut self, conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
        let before = self.leases.len();
        self.leases.retain(|_, lease| !lease.is_expired_at(now));
        let removed = before.saturating_sub(self.leases.len());

        conn.execute(
            "DELETE FROM document_leases WHERE expires_at <= ?1",
            params![now.to_rfc3339()],
        )
        .context("failed to delete expired leases from sqlite")?;

        Ok(removed)
    }

    fn load_from_sqlite(&mut self, conn: &Connection, now: DateTime<Utc>) -> Result<()> {
        let mut stmt = conn
            .prepare(
                "SELECT doc_id, holder_id, acquired_at, expires_at \
                 FROM document_leases \
                 WHERE expires_at > ?1",
            )
            .context("failed to prepare active lease query")?;
        let rows = stmt
            .query_map(params![now.to_rfc3339()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("failed to query active leases from sqlite")?;

        for row in rows {
            let (doc_raw, holder_id, acquired_raw, expires_raw) =
                row.context("failed to decode lease row from sqlite")?;

            let document_id = doc_raw
                .parse::<Uuid>()
                .with_context(|| format!("invalid doc_id `{doc_raw}` in lease row"))?;
            let acquired_at = acquired_raw.parse::<DateTime<Utc>>().with_context(|| {
                format!("invalid acquired_at timestamp `{acquired_raw}` in lease row")
            })?;
            let expires_at = expires_raw.parse::<DateTime<Utc>>().with_context(|| {
                format!("invalid expires_at timestamp `{expires_raw}` in lease row")
            })?;

            self.leases
                .insert(document_id, Lease { document_id, holder_id, acquired_at, expires_at });
        }

        Ok(())
    }
}

fn upsert_lease(conn: &Connection, lease: &Lease) -> Result<()> {
    conn.execute(
        "INSERT INTO document_leases (doc_id, holder_id, acquired_at, expires_at) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(doc_id) DO UPDATE SET \
           holder_id = excluded.holder_id, \
           acquired_at = excluded.acquired_at, \
           expires_at = excluded.expires_at",
        params![
            lease.document_id.to_string(),
            lease.holder_id,
            lease.acquired_at.to_rfc3339(),
            lease.expires_at.to_rfc3339(),
        ],
    )
    .context("failed to upsert lease in sqlite")?;
    Ok(())
}

fn delete_lease(conn: &Connection, doc_id: Uuid) -> Result<()> {
    conn.execute("DELETE FROM document_leases WHERE doc_id = ?1", params![doc_id.to_string()])
        .context("failed to delete lease from sqlite")?;
    Ok(())
}

fn storage_failure(doc_id: Uuid, error: &anyhow::Error) -> EditError {
    EditError::StorageFailure { document_id: doc_id, reason: format!("{error:#}") }
}

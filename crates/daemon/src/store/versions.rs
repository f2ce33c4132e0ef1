// Version chain storage: append-only rows plus a per-document head.
//
// Version numbers are gapless per document, starting at 1. Allocation
// happens under a per-document allocator guard so concurrent saves
// serialize instead of racing for the same number.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use folio_common::types::Version;

/// Current head of a document's version chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadRecord {
    pub doc_id: Uuid,
    pub current_version_id: Uuid,
    pub current_version_number: i64,
    pub updated_at: DateTime<Utc>,
}

/// Serializes version-number allocation per document.
///
/// Two concurrent saves to the same document contend on one guard; saves
/// to different documents never block each other.
#[derive(Debug, Default)]
pub struct VersionAllocator {
    guards: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl VersionAllocator {
    /// Guard for `doc_id`. Hold its lock across read-head + insert.
    pub fn guard_for(&self, doc_id: Uuid) -> Result<Arc<Mutex<()>>> {
        let mut guards =
            self.guards.lock().map_err(|_| anyhow!("version allocator map lock poisoned"))?;
        Ok(Arc::clone(guards.entry(doc_id).or_default()))
    }
}

/// CRUD operations for `document_versions` and `document_heads`.
pub struct VersionStore;

impl VersionStore {
    /// Current head version number for a document, 0 if it has no versions.
    pub fn head_number(conn: &Connection, doc_id: Uuid) -> Result<i64> {
        conn.query_row(
            "SELECT COALESCE(MAX(current_version_number), 0) FROM document_heads WHERE doc_id = ?1",
            params![doc_id.to_string()],
            |row| row.get(0),
        )
        .context("failed to read document head number")
    }

    /// Current head row for a document.
    pub fn head(conn: &Connection, doc_id: Uuid) -> Result<Option<HeadRecord>> {
        let mut stmt = conn
            .prepare(
                "SELECT doc_id, current_version_id, current_version_number, updated_at \
                 FROM document_heads \
                 WHERE doc_id = ?1",
            )
            .context("failed to prepare document head query")?;

        let mut rows = stmt
            .query_map(params![doc_id.to_string()], row_to_head)
            .context("failed to query document head")?;

        match rows.next() {
            Some(row) => Ok(Some(row.context("failed to decode document head row")?)),
            None => Ok(None),
        }
    }

    /// Append a version and advance the head in one transaction.
    ///
    /// The UNIQUE (doc_id, version_number) constraint backstops the
    /// allocator: if two writers ever race past it, the second insert
    /// fails instead of forking the chain.
    pub fn append(conn: &Connection, version: &Version) -> Result<()> {
        let tx = conn.unchecked_transaction().context("failed to start version transaction")?;

        tx.execute(
            "INSERT INTO document_versions \
             (version_id, doc_id, version_number, content_ref, message, author_id, tag, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                version.id.to_string(),
                version.document_id.to_string(),
                version.version_number,
                version.content_ref,
                version.message,
                version.author_id,
                version.tag.as_deref(),
                version.created_at.to_rfc3339(),
            ],
        )
        .context("failed to insert document version row")?;

        tx.execute(
            "INSERT INTO document_heads \
             (doc_id, current_version_id, current_version_number, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(doc_id) DO UPDATE SET \
               current_version_id = excluded.current_version_id, \
               current_version_number = excluded.current_version_number, \
               updated_at = excluded.updated_at",
            params![
                version.document_id.to_string(),
                version.id.to_string(),
                version.version_number,
                version.created_at.to_rfc3339(),
            ],
        )
        .context("failed to advance document head")?;

        tx.commit().context("failed to commit version transaction")
    }

    /// Fetch one version of a document by version id.
    pub fn get(conn: &Connection, doc_id: Uuid, version_id: Uuid) -> Result<Option<Version>> {
        let mut stmt = conn
            .prepare(
                "SELECT version_id, doc_id, version_number, content_ref, message, \
                        author_id, tag, created_at \
                 FROM document_versions \
                 WHERE doc_id = ?1 AND version_id = ?2",
            )
            .context("failed to prepare version by id query")?;

        let mut rows = stmt
            .query_map(params![doc_id.to_string(), version_id.to_string()], row_to_version)
            .context("failed to query version by id")?;

        match rows.next() {
            Some(row) => Ok(Some(row.context("failed to decode version row")?)),
            None => Ok(None),
        }
    }

    /// Fetch one version of a document by chain number.
    pub fn get_by_number(conn: &Connection, doc_id: Uuid, number: i64) -> Result<Option<Version>> {
        let mut stmt = conn
            .prepare(
                "SELECT version_id, doc_id, version_number, content_ref, message, \
                        author_id, tag, created_at \
                 FROM document_versions \
                 WHERE doc_id = ?1 AND version_number = ?2",
            )
            .context("failed to prepare version by number query")?;

        let mut rows = stmt
            .query_map(params![doc_id.to_string(), number], row_to_version)
            .context("failed to query version by number")?;

        match rows.next() {
            Some(row) => Ok(Some(row.context("failed to decode version row")?)),
            None => Ok(None),
        }
    }

    /// List versions newest-first with an offset/limit window, plus the
    /// total chain length for paging.
    pub fn list(
        conn: &Connection,
        doc_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Version>, u64)> {
        let total: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM document_versions WHERE doc_id = ?1",
                params![doc_id.to_string()],
                |row| row.get(0),
            )
            .context("failed to count document versions")?;

        let mut stmt = conn
            .prepare(
                "SELECT version_id, doc_id, version_number, content_ref, message, \
                        author_id, tag, created_at \
                 FROM document_versions \
                 WHERE doc_id = ?1 \
                 ORDER BY version_number DESC \
                 LIMIT ?2 OFFSET ?3",
            )
            .context("failed to prepare version list query")?;

        let rows = stmt
            .query_map(params![doc_id.to_string(), limit as i64, offset as i64], row_to_version)
            .context("failed to query version list")?;

        let versions = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to collect version rows")?;

        Ok((versions, total as u64))
    }

    /// Overwrite the tag on a version, last write wins. Tag names are not
    /// unique across versions; two versions of a document may carry the
    /// same tag.
    ///
    /// Returns `false` when the version does not exist for this document.
    pub fn set_tag(conn: &Connection, doc_id: Uuid, version_id: Uuid, tag: &str) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE document_versions SET tag = ?1 \
                 WHERE doc_id = ?2 AND version_id = ?3",
                params![tag, doc_id.to_string(), version_id.to_string()],
            )
            .context("failed to set version tag")?;
        Ok(changed > 0)
    }
}

fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<Version> {
    let id = parse_uuid_column(row, 0)?;
    let document_id = parse_uuid_column(row, 1)?;
    let created_at = parse_timestamp_column(row, 7)?;

    Ok(Version {
        id,
        document_id,
        version_number: row.get(2)?,
        content_ref: row.get(3)?,
        message: row.get(4)?,
        author_id: row.get(5)?,
        tag: row.get(6)?,
        created_at,
    })
}

fn row_to_head(row: &rusqlite::Row<'_>) -> rusqlite::Result<HeadRecord> {
    Ok(HeadRecord {
        doc_id: parse_uuid_column(row, 0)?,
        current_version_id: parse_uuid_column(row, 1)?,
        current_version_number: row.get(2)?,
        updated_at: parse_timestamp_column(row, 3)?,
    })
}

fn parse_uuid_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(index)?;
    raw.parse::<Uuid>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp_column(
    row: &rusqlite::Row<'_>,
    index: usize,
) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    raw.parse::<DateTime<Utc>>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

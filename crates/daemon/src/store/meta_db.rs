use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE document_heads (
    doc_id                  TEXT PRIMARY KEY,
    current_version_id      TEXT NOT NULL,
    current_version_number  INTEGER NOT NULL,
    updated_at              TEXT NOT NULL
);

CREATE TABLE document_versions (
    version_id      TEXT PRIMARY KEY,
    doc_id          TEXT NOT NULL,
    version_number  INTEGER NOT NULL,
    content_ref     TEXT NOT NULL,
    message         TEXT NOT NULL,
    author_id       TEXT NOT NULL,
    tag             TEXT NULL,
    created_at      TEXT NOT NULL,
    UNIQUE (doc_id, version_number)
);

CREATE INDEX document_versions_chain_idx
    ON document_versions (doc_id, version_number DESC);

CREATE TABLE document_leases (
    doc_id      TEXT PRIMARY KEY,
    holder_id   TEXT NOT NULL,
    acquired_at TEXT NOT NULL,
    expires_at  TEXT NOT NULL
);

CREATE INDEX document_leases_expires_idx
    ON document_leases (expires_at);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL)];

#[derive(Debug)]
pub struct MetaDb {
    conn: Connection,
}

impl MetaDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create meta.db parent directory `{}`", parent.display())
            })?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("failed to open meta.db at `{}`", path.display()))?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 250;
            ",
        )
        .context("failed to configure sqlite pragmas for meta.db")?;

        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> Result<i64> {
        current_schema_version(&self.conn)
    }
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
        .context("failed to read current schema version")
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    let mut current_version = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply meta.db migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        current_version = *version;
    }

    Ok(())
}

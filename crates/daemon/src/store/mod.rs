// Persistence: SQLite meta.db, content-addressed blobs, version chain.

pub mod blobs;
pub mod meta_db;
pub mod versions;

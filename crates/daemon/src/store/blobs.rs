use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::security::{ensure_owner_only_dir, ensure_owner_only_file, open_private_truncate};

const BLOB_FILE_EXT: &str = "blob";

/// Content-addressed document blobs at `blobs/{sha256}.blob`.
///
/// A blob is written once and never mutated; identical contents share a
/// single file. `put` returns the hex digest used as the `content_ref`
/// recorded in the version chain.
#[derive(Debug, Clone)]
pub struct BlobStore {
    blobs_dir: PathBuf,
}

impl BlobStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Result<Self> {
        let blobs_dir = state_dir.as_ref().join("blobs");
        fs::create_dir_all(&blobs_dir).with_context(|| {
            format!("failed to create blobs directory `{}`", blobs_dir.display())
        })?;
        ensure_owner_only_dir(&blobs_dir)?;
        Ok(Self { blobs_dir })
    }

    /// Store `content` and return its content reference (sha256 hex).
    pub fn put(&self, content: &str) -> Result<String> {
        let content_ref = content_ref_for(content);
        let target_path = self.blob_path(&content_ref);
        if target_path.exists() {
            // Already stored under the same digest.
            return Ok(content_ref);
        }

        let tmp_path = self.temp_path_for(&content_ref);
        {
            use std::io::Write;

            let mut file = open_private_truncate(&tmp_path)
                .with_context(|| format!("failed to open temp blob `{}`", tmp_path.display()))?;
            ensure_owner_only_file(&tmp_path)?;
            file.write_all(content.as_bytes()).context("failed to write blob contents")?;
            file.sync_data().context("failed to fsync blob file")?;
        }

        fs::rename(&tmp_path, &target_path).with_context(|| {
            format!(
                "failed to atomically move blob `{}` to `{}`",
                tmp_path.display(),
                target_path.display()
            )
        })?;
        ensure_owner_only_file(&target_path)?;

        Ok(content_ref)
    }

    /// Load the content stored under `content_ref`, if any.
    pub fn get(&self, content_ref: &str) -> Result<Option<String>> {
        let path = self.blob_path(content_ref);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read blob `{}`", path.display()))?;
        Ok(Some(content))
    }

    pub fn blob_path(&self, content_ref: &str) -> PathBuf {
        self.blobs_dir.join(format!("{content_ref}.{BLOB_FILE_EXT}"))
    }

    fn temp_path_for(&self, content_ref: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should be after unix epoch")
            .as_nanos();
        self.blobs_dir.join(format!("{content_ref}.tmp.{nonce}"))
    }
}

/// sha256 hex digest of `content`, used as the version chain's content_ref.
pub fn content_ref_for(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

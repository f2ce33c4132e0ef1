// Filesystem permission hardening for daemon state files.
//
// All daemon state (database, blobs, socket directory) is owner-only.

use std::fs::{self, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};

pub fn ensure_owner_only_file(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(path)
            .with_context(|| format!("failed to read metadata for `{}`", path.display()))?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o600 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to set owner-only mode on `{}`", path.display()))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

pub fn ensure_owner_only_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(path)
            .with_context(|| format!("failed to read metadata for `{}`", path.display()))?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o700 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))
                .with_context(|| format!("failed to set owner-only mode on `{}`", path.display()))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

pub fn open_private_truncate(path: &Path) -> std::io::Result<std::fs::File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        OpenOptions::new().create(true).write(true).truncate(true).mode(0o600).open(path)
    }
    #[cfg(not(unix))]
    {
        OpenOptions::new().create(true).write(true).truncate(true).open(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[cfg(unix)]
    #[test]
    fn owner_only_helpers_apply_expected_modes() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().expect("tempdir should be created");
        let dir_path = tmp.path().join("private-dir");
        let file_path = dir_path.join("private.bin");

        fs::create_dir_all(&dir_path).expect("directory should be created");
        fs::write(&file_path, b"state").expect("file should be created");

        fs::set_permissions(&dir_path, fs::Permissions::from_mode(0o755))
            .expect("directory permissions should be set");
        fs::set_permissions(&file_path, fs::Permissions::from_mode(0o644))
            .expect("file permissions should be set");

        ensure_owner_only_dir(&dir_path).expect("directory mode should be tightened");
        ensure_owner_only_file(&file_path).expect("file mode should be tightened");

        let dir_mode =
            fs::metadata(&dir_path).expect("directory metadata should load").permissions().mode()
                & 0o777;
        let file_mode =
            fs::metadata(&file_path).expect("file metadata should load").permissions().mode()
                & 0o777;
        assert_eq!(dir_mode, 0o700);
        assert_eq!(file_mode, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn private_truncate_creates_owner_only_files() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("private.tmp");

        let file = open_private_truncate(&path).expect("file should open");
        drop(file);

        let mode =
            fs::metadata(&path).expect("file metadata should load").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}

// Daemon startup: PID file, Unix socket creation, readiness signaling.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::net::UnixListener;
use tracing::info;

use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};

/// Default socket path: ~/.folio/daemon.sock
const SOCKET_NAME: &str = "daemon.sock";
/// PID file: ~/.folio/daemon.pid (diagnostics only)
const PID_FILE_NAME: &str = "daemon.pid";

/// Resolved paths for daemon runtime files. `base_dir` also holds the
/// persistent state (meta.db and the blob store).
pub struct DaemonPaths {
    pub base_dir: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
}

impl DaemonPaths {
    /// Resolve paths under `~/.folio/`.
    pub fn resolve() -> Result<Self> {
        let base = dirs_path()?;
        Ok(Self {
            socket_path: base.join(SOCKET_NAME),
            pid_path: base.join(PID_FILE_NAME),
            base_dir: base,
        })
    }
}

/// Write the current process PID to `~/.folio/daemon.pid`.
pub fn write_pid_file(path: &Path) -> Result<()> {
    let pid = std::process::id();
    let mut file = fs::File::create(path).context("failed to create PID file")?;
    write!(file, "{pid}").context("failed to write PID")?;
    ensure_owner_only_file(path)?;
    info!(pid, path = %path.display(), "wrote PID file");
    Ok(())
}

/// Remove the PID file on shutdown.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, "failed to remove PID file");
        }
    }
}

/// Remove stale socket file and bind a new Unix listener.
/// The daemon signals readiness by accepting connections on this socket.
pub async fn bind_socket(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        fs::remove_file(path).context("failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(path).context("failed to bind Unix socket")?;
    info!(path = %path.display(), "daemon socket ready");
    Ok(listener)
}

/// Ensure the `~/.folio/` directory exists with owner-only permissions.
fn dirs_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let folio_dir = home.join(".folio");
    fs::create_dir_all(&folio_dir).context("failed to create ~/.folio/")?;
    ensure_owner_only_dir(&folio_dir)?;
    Ok(folio_dir)
}

/// Check if a daemon is already running by connecting to the socket.
/// Returns true if connection succeeds (daemon is alive).
pub async fn is_daemon_running(socket_path: &Path) -> bool {
    tokio::net::UnixStream::connect(socket_path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_paths(tmp: &TempDir) -> DaemonPaths {
        let base = tmp.path().to_path_buf();
        DaemonPaths {
            socket_path: base.join("daemon.sock"),
            pid_path: base.join("daemon.pid"),
            base_dir: base,
        }
    }

    #[test]
    fn write_and_read_pid_file() {
        let tmp = TempDir::new().unwrap();
        let paths = setup_test_paths(&tmp);

        write_pid_file(&paths.pid_path).unwrap();

        let contents = fs::read_to_string(&paths.pid_path).unwrap();
        let pid: u32 = contents.parse().unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn remove_pid_file_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let paths = setup_test_paths(&tmp);

        write_pid_file(&paths.pid_path).unwrap();
        assert!(paths.pid_path.exists());

        remove_pid_file(&paths.pid_path);
        assert!(!paths.pid_path.exists());
    }

    #[test]
    fn remove_nonexistent_pid_file_is_harmless() {
        let tmp = TempDir::new().unwrap();
        let paths = setup_test_paths(&tmp);
        remove_pid_file(&paths.pid_path);
    }

    #[tokio::test]
    async fn bind_socket_creates_listener() {
        let tmp = TempDir::new().unwrap();
        let paths = setup_test_paths(&tmp);

        let listener = bind_socket(&paths.socket_path).await.unwrap();
        assert!(paths.socket_path.exists());
        drop(listener);
    }

    #[tokio::test]
    async fn bind_replaces_stale_socket() {
        let tmp = TempDir::new().unwrap();
        let paths = setup_test_paths(&tmp);

        let listener1 = bind_socket(&paths.socket_path).await.unwrap();
        drop(listener1);

        let _listener2 = bind_socket(&paths.socket_path).await.unwrap();
        assert!(paths.socket_path.exists());
    }

    #[tokio::test]
    async fn daemon_running_check_is_false_without_listener() {
        let tmp = TempDir::new().unwrap();
        let sock_path = tmp.path().join("nonexistent.sock");
        assert!(!is_daemon_running(&sock_path).await);
    }

    #[tokio::test]
    async fn daemon_running_check_is_true_with_listener() {
        let tmp = TempDir::new().unwrap();
        let sock_path = tmp.path().join("test.sock");

        let _listener = bind_socket(&sock_path).await.unwrap();
        assert!(is_daemon_running(&sock_path).await);
    }
}

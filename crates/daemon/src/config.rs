// Local configuration for the daemon.
//
// Global config: `~/.folio/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};

/// Root directory for Folio global state: `~/.folio/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".folio"))
}

/// Path to the global config file: `~/.folio/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Global daemon configuration at `~/.folio/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct GlobalConfig {
    /// Editing lease settings.
    pub lease: LeaseConfig,
    /// Persistence retry settings.
    pub storage: StorageConfig,
    /// HTTP facade settings.
    pub http: HttpConfig,
}

impl GlobalConfig {
    /// Load from `~/.folio/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `~/.folio/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = global_config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
            ensure_owner_only_dir(parent)
                .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io).and_then(|_| {
            ensure_owner_only_file(path)
                .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))
        })
    }
}

/// Editing lease parameters.
///
/// Renewal cadence is a client concern; the server only owns the TTL and
/// the threshold under which `lock.status` reports `expiring_soon`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LeaseConfig {
    /// Lease lifetime in seconds from acquire/renewal.
    pub ttl_sec: u32,
    /// Remaining-time threshold (seconds) for the expiry warning.
    pub warn_threshold_sec: u32,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self { ttl_sec: 900, warn_threshold_sec: 300 }
    }
}

impl LeaseConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.ttl_sec))
    }

    pub fn warn_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.warn_threshold_sec))
    }
}

/// Bounded retry budget for transient persistence errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Attempts per operation before a `StorageFailure` surfaces.
    pub retry_max_attempts: u32,
    /// Base backoff between attempts, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { retry_max_attempts: 3, retry_backoff_ms: 50 }
    }
}

impl StorageConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// HTTP facade settings. The facade only starts when an address is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct HttpConfig {
    /// Listen address, e.g. `127.0.0.1:7317`.
    pub listen_addr: Option<String>,
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_defaults() {
        let cfg = GlobalConfig::default();
        assert_eq!(cfg.lease.ttl_sec, 900);
        assert_eq!(cfg.lease.warn_threshold_sec, 300);
        assert_eq!(cfg.storage.retry_max_attempts, 3);
        assert_eq!(cfg.storage.retry_backoff_ms, 50);
        assert!(cfg.http.listen_addr.is_none());
    }

    #[test]
    fn config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let cfg = GlobalConfig {
            lease: LeaseConfig { ttl_sec: 600, warn_threshold_sec: 120 },
            storage: StorageConfig { retry_max_attempts: 5, retry_backoff_ms: 25 },
            http: HttpConfig { listen_addr: Some("127.0.0.1:7317".into()) },
        };
        cfg.save_to(&path).unwrap();
        let loaded = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn config_parse_from_toml() {
        let toml_str = r#"
[lease]
ttl_sec = 1200
warn_threshold_sec = 240

[http]
listen_addr = "0.0.0.0:8080"
"#;
        let cfg: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.lease.ttl_sec, 1200);
        assert_eq!(cfg.lease.warn_threshold_sec, 240);
        assert_eq!(cfg.storage.retry_max_attempts, 3); // default
        assert_eq!(cfg.http.listen_addr.as_deref(), Some("0.0.0.0:8080"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let cfg: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, GlobalConfig::default());
    }

    #[test]
    fn load_missing_file_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(GlobalConfig::load_from(&path).is_err());
    }

    #[test]
    fn lease_durations_derive_from_seconds() {
        let lease = LeaseConfig::default();
        assert_eq!(lease.ttl(), chrono::Duration::minutes(15));
        assert_eq!(lease.warn_threshold(), chrono::Duration::minutes(5));
    }

    #[test]
    fn config_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep").join("nested").join("config.toml");

        let cfg = GlobalConfig::default();
        cfg.save_to(&path).unwrap();
        assert!(path.exists());
    }
}

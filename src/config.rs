//! Supervisor configuration.
//!
//! Settings are read from a TOML file, `/etc/ignite/spawn.toml` unless
//! `IGNITE_SPAWN_CONFIG` names another path. Every field is optional.

use crate::constants::DATA_DIR;
use crate::error::{Error, Result};
use crate::network::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "IGNITE_SPAWN_CONFIG";

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ignite/spawn.toml";

/// Supervisor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpawnConfig {
    /// Root of the object store and per-VM runtime directories.
    pub data_dir: PathBuf,

    /// Firecracker binary.
    pub firecracker_bin: PathBuf,

    /// dnsmasq binary.
    pub dnsmasq_bin: PathBuf,

    /// iproute2 `ip` binary.
    pub ip_bin: String,

    /// Pause between network provisioning attempts.
    #[serde(with = "duration")]
    pub poll_interval: Duration,

    /// How long network provisioning may keep retrying.
    #[serde(with = "duration")]
    pub poll_timeout: Duration,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_DIR),
            firecracker_bin: PathBuf::from("firecracker"),
            dnsmasq_bin: PathBuf::from("dnsmasq"),
            ip_bin: "ip".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl SpawnConfig {
    /// Path the configuration is loaded from.
    pub fn path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from [`SpawnConfig::path`].
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::Config {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        toml::from_str(&content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Durations as whole seconds or humantime strings (`"500ms"`, `"2m"`).
mod duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Secs(secs) => Ok(Duration::from_secs(secs)),
            Repr::Text(text) => humantime::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SpawnConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/firecracker"));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.poll_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = SpawnConfig::load_from(&dir.path().join("spawn.toml")).unwrap();
        assert_eq!(config, SpawnConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spawn.toml");
        std::fs::write(
            &path,
            "data_dir = \"/tmp/ignite\"\npoll_interval = \"250ms\"\npoll_timeout = 30\n",
        )
        .unwrap();

        let config = SpawnConfig::load_from(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ignite"));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.poll_timeout, Duration::from_secs(30));
        assert_eq!(config.firecracker_bin, PathBuf::from("firecracker"));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spawn.toml");
        std::fs::write(&path, "poll_timeout = \"soon\"\n").unwrap();
        assert!(matches!(
            SpawnConfig::load_from(&path),
            Err(Error::Config { .. })
        ));

        std::fs::write(&path, "unknown_key = 1\n").unwrap();
        assert!(matches!(
            SpawnConfig::load_from(&path),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_serializes_back_to_toml() {
        let text = toml::to_string(&SpawnConfig::default()).unwrap();
        assert!(text.contains("poll_timeout = \"1m\""));
        let parsed: SpawnConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, SpawnConfig::default());
    }
}

//! IMGAPI configuration, reduced to what the migration reads.
//!
//! The config file is the service's own `imgapi.config.json`; unknown keys
//! are ignored.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::MigrateError;

/// Marker file present on the public images.joyent.com deployment.
const PUBLIC_MARKER: &str = "/root/THIS-IS-IMAGES.JOYENT.COM.txt";
const PUBLIC_CONFIG_PATH: &str = "/root/config/imgapi.config.json";
const SDC_CONFIG_PATH: &str = "/opt/smartdc/imgapi/etc/imgapi.config.json";

/// Where the IMGAPI config lives when no path is given.
pub fn default_config_path() -> PathBuf {
    if Path::new(PUBLIC_MARKER).exists() {
        PathBuf::from(PUBLIC_CONFIG_PATH)
    } else {
        PathBuf::from(SDC_CONFIG_PATH)
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: Option<DatabaseConfig>,
    pub ufds: Option<UfdsConfig>,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub dir: Option<PathBuf>,
}

/// UFDS connection parameters.
#[derive(Clone, Deserialize)]
pub struct UfdsConfig {
    pub url: String,
    #[serde(rename = "bindDN")]
    pub bind_dn: String,
    #[serde(rename = "bindPassword")]
    pub bind_password: String,
}

impl fmt::Debug for UfdsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UfdsConfig")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"<redacted>")
            .finish()
    }
}

/// The storage backend selected by `database.type`.
#[derive(Debug, Clone)]
pub enum Backend {
    Ufds(UfdsConfig),
    Local { dir: PathBuf },
}

impl Config {
    /// Read and parse the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, MigrateError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            MigrateError::Config(format!("invalid JSON in {}: {}", path.display(), e))
        })
    }

    #[cfg(test)]
    pub fn from_json(content: &str) -> Result<Self, MigrateError> {
        serde_json::from_str(content)
            .map_err(|e| MigrateError::Config(format!("invalid config JSON: {}", e)))
    }

    /// Validate the backend selection and its connection parameters.
    pub fn backend(&self) -> Result<Backend, MigrateError> {
        let database = self
            .database
            .as_ref()
            .ok_or_else(|| MigrateError::Config("`database` is missing".to_string()))?;

        match database.kind.as_deref() {
            Some("ufds") => {
                let ufds = self.ufds.clone().ok_or_else(|| {
                    MigrateError::Config(
                        "`ufds` settings are required when `database.type` is \"ufds\"".to_string(),
                    )
                })?;
                Ok(Backend::Ufds(ufds))
            }
            Some("local") => {
                let dir = database.dir.clone().ok_or_else(|| {
                    MigrateError::Config(
                        "`database.dir` is required when `database.type` is \"local\"".to_string(),
                    )
                })?;
                Ok(Backend::Local { dir })
            }
            Some(other) => Err(MigrateError::Config(format!(
                "unknown `database.type` \"{}\" (expected \"ufds\" or \"local\")",
                other
            ))),
            None => Err(MigrateError::Config(
                "`database.type` is missing".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_of(json: &str) -> Result<Backend, MigrateError> {
        Config::from_json(json)?.backend()
    }

    #[test]
    fn test_ufds_backend() {
        let backend = backend_of(
            r#"{
                "port": 8080,
                "database": {"type": "ufds"},
                "ufds": {
                    "url": "ldaps://10.99.99.18",
                    "bindDN": "cn=root",
                    "bindPassword": "secret",
                    "cache": {"size": 1000}
                }
            }"#,
        )
        .unwrap();

        match backend {
            Backend::Ufds(ufds) => {
                assert_eq!(ufds.url, "ldaps://10.99.99.18");
                assert_eq!(ufds.bind_dn, "cn=root");
                assert_eq!(ufds.bind_password, "secret");
            }
            other => panic!("Expected ufds backend, got {:?}", other),
        }
    }

    #[test]
    fn test_local_backend() {
        let backend =
            backend_of(r#"{"database": {"type": "local", "dir": "/var/tmp/images"}}"#).unwrap();
        match backend {
            Backend::Local { dir } => assert_eq!(dir, PathBuf::from("/var/tmp/images")),
            other => panic!("Expected local backend, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_database_is_config_error() {
        let err = backend_of(r#"{"port": 8080}"#).unwrap_err();
        assert!(matches!(err, MigrateError::Config(ref m) if m.contains("`database`")));
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let err = backend_of(r#"{"database": {"type": "moray"}}"#).unwrap_err();
        assert!(matches!(err, MigrateError::Config(ref m) if m.contains("moray")));
    }

    #[test]
    fn test_missing_type_is_config_error() {
        let err = backend_of(r#"{"database": {"dir": "/tmp"}}"#).unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn test_ufds_without_settings_is_config_error() {
        let err = backend_of(r#"{"database": {"type": "ufds"}}"#).unwrap_err();
        assert!(matches!(err, MigrateError::Config(ref m) if m.contains("`ufds`")));
    }

    #[test]
    fn test_local_without_dir_is_config_error() {
        let err = backend_of(r#"{"database": {"type": "local"}}"#).unwrap_err();
        assert!(matches!(err, MigrateError::Config(ref m) if m.contains("database.dir")));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, MigrateError::Config(ref m) if m.contains("failed to read")));
    }

    #[test]
    fn test_debug_redacts_password() {
        let ufds = UfdsConfig {
            url: "ldaps://ufds".to_string(),
            bind_dn: "cn=root".to_string(),
            bind_password: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", ufds).contains("hunter2"));
    }
}

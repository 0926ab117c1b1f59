use std::path::{Path, PathBuf};

use facedb_core::{CommandExtractor, DEFAULT_TOLERANCE};
use serde::Deserialize;

use crate::Error;

/// Runtime configuration.
///
/// Only `db_path` is required; everything else has a default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Command line of the external face extractor, e.g. `python3 encode_faces.py`.
    pub extractor: Option<String>,
    /// Distance at or below which two faces count as a match.
    pub tolerance: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            extractor: None,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Config {
    /// Load configuration from `FACEDB_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load a TOML file, then let `FACEDB_*` environment variables override it.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text)?;
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("FACEDB_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Ok(cmd) = std::env::var("FACEDB_EXTRACTOR") {
            self.extractor = Some(cmd);
        }
        self.tolerance = env_f64("FACEDB_TOLERANCE", self.tolerance);
        self
    }

    /// Build the configured external extractor, if any.
    pub fn command_extractor(&self) -> Option<CommandExtractor> {
        self.extractor
            .as_deref()
            .and_then(CommandExtractor::from_command_line)
    }
}

fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facedb")
        .join("facedb.db")
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/var/lib/facedb/faces.db"
            extractor = "python3 encode_faces.py --cnn"
            tolerance = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/var/lib/facedb/faces.db"));
        assert_eq!(config.tolerance, 0.5);

        let extractor = config.command_extractor().unwrap();
        assert_eq!(extractor.program(), Path::new("python3"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(r#"db_path = "faces.db""#).unwrap();
        assert_eq!(config.db_path, PathBuf::from("faces.db"));
        assert_eq!(config.extractor, None);
        assert_eq!(config.tolerance, DEFAULT_TOLERANCE);
        assert!(config.command_extractor().is_none());
    }

    #[test]
    fn test_blank_extractor_is_none() {
        let config = Config {
            extractor: Some("  ".into()),
            ..Config::default()
        };
        assert!(config.command_extractor().is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigIo { .. }));
    }

    #[test]
    fn test_load_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facedb.toml");
        std::fs::write(&path, "tolerance = \"high\"").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::ConfigParse(_))));
    }
}

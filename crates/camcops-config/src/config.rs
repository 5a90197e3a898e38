//! Persistent configuration for the database layer and its tools.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ConfigResult, Paths};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable that overrides `log_level` at runtime.
pub const LOG_LEVEL_ENV: &str = "CAMCOPS_LOG_LEVEL";

const DEFAULT_DATA_DATABASE_FILENAME: &str = "camcops_data.sqlite";
const DEFAULT_SYSTEM_DATABASE_FILENAME: &str = "camcops_sys.sqlite";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Also write JSON-lines logs under the logs directory.
    pub log_to_file: bool,
    /// Run each database on its own worker thread.
    pub threaded_databases: bool,
    /// VACUUM databases when they are closed.
    pub vacuum_on_close: bool,
    pub data_database_filename: String,
    pub system_database_filename: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_to_file: false,
            threaded_databases: true,
            vacuum_on_close: true,
            data_database_filename: DEFAULT_DATA_DATABASE_FILENAME.to_string(),
            system_database_filename: DEFAULT_SYSTEM_DATABASE_FILENAME.to_string(),
        }
    }
}

impl Config {
    /// Load `config.json` from `paths`, falling back to defaults if it is
    /// absent, then apply environment overrides.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();
        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };
        config.apply_log_level_override(std::env::var(LOG_LEVEL_ENV).ok());
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn apply_log_level_override(&mut self, level: Option<String>) {
        if let Some(level) = level.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) {
            self.log_level = level;
        }
    }

    pub fn data_database_path(&self, paths: &Paths) -> PathBuf {
        paths.database_file(&self.data_database_filename)
    }

    pub fn system_database_path(&self, paths: &Paths) -> PathBuf {
        paths.database_file(&self.system_database_filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.threaded_databases);
        assert!(config.vacuum_on_close);
        assert!(!config.log_to_file);
        assert_eq!(config.data_database_filename, "camcops_data.sqlite");
        assert_eq!(config.system_database_filename, "camcops_sys.sqlite");
    }

    #[test]
    fn test_config_load_from_partial_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{ "log_level": "debug", "threaded_databases": false }"#).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(!config.threaded_databases);
        assert!(config.vacuum_on_close);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            vacuum_on_close: false,
            data_database_filename: "other.sqlite".to_string(),
            ..Config::default()
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.data_database_path(&paths), dir.path().join("other.sqlite"));
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = Config::load(&paths).unwrap();
        assert_eq!(config.data_database_filename, "camcops_data.sqlite");
        assert_eq!(
            config.system_database_path(&paths),
            dir.path().join("camcops_sys.sqlite")
        );
    }

    #[test]
    fn test_config_invalid_json() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "{ not json").unwrap();
        assert!(Config::load_from_file(&config_path).is_err());
    }

    #[test]
    fn test_log_level_override() {
        let mut config = Config::default();
        config.apply_log_level_override(None);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        config.apply_log_level_override(Some("  ".to_string()));
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        config.apply_log_level_override(Some("trace".to_string()));
        assert_eq!(config.log_level, "trace");
    }
}

//! File system locations for CamCOPS data.

use std::path::{Path, PathBuf};

use crate::{ConfigError, ConfigResult};

const APP_DIR_NAME: &str = "camcops";

/// Where databases, configuration and logs live.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// `<platform data dir>/camcops`, e.g. `~/.local/share/camcops`.
    pub fn new() -> ConfigResult<Self> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| ConfigError::Path("Could not determine data directory".to_string()))?;
        Ok(Self {
            base_dir: data_dir.join(APP_DIR_NAME),
        })
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// A database file inside the base directory.
    pub fn database_file(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// JSON-lines log written by [`crate::init_logging`] when file logging is on.
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("camcops.jsonl")
    }

    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

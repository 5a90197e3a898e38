//! Configuration, file locations and logging bootstrap for CamCOPS tools.

mod config;
mod error;
pub mod logging;
mod paths;

pub use config::{Config, DEFAULT_LOG_LEVEL, LOG_LEVEL_ENV};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level, LogConfig};
pub use paths::Paths;

// Configuration loading

pub mod error;
pub mod session;
pub mod settings;

use std::path::PathBuf;

pub use error::ConfigError;
pub use session::{StagedSession, StagedUpload};
pub use settings::Settings;

/// Overrides the directory holding both the settings file and the session.
pub const HOME_ENV: &str = "POLREC_HOME";

fn home_override() -> Option<PathBuf> {
    std::env::var_os(HOME_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Directory for `settings.toml`.
pub fn config_dir() -> PathBuf {
    home_override().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("polrec")
    })
}

/// Directory for the staged session.
pub fn data_dir() -> PathBuf {
    home_override().unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("polrec")
    })
}

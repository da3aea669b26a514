// User settings
// Loaded from <config dir>/polrec/settings.toml

use std::fs;
use std::path::{Path, PathBuf};

use polrec_recon::SourceRegistry;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Custom source registry TOML; the built-in registry when unset.
    pub registry: Option<PathBuf>,

    /// Where outputs land when `-o` is a bare file name.
    pub output_dir: Option<PathBuf>,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: Option<String>,

    /// Worksheet to read from Excel statements.
    pub sheet: Option<String>,
}

impl Settings {
    pub fn config_path() -> PathBuf {
        crate::config_dir().join("settings.toml")
    }

    pub fn try_load() -> Result<Self, ConfigError> {
        Self::try_load_from(&Self::config_path())
    }

    /// A missing file yields defaults. Unreadable or malformed files are
    /// errors; the caller decides whether to fall back.
    pub fn try_load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The registry named by `override_path`, else the configured one, else
    /// the built-in registry.
    pub fn load_registry(&self, override_path: Option<&Path>) -> Result<SourceRegistry, ConfigError> {
        match override_path.or(self.registry.as_deref()) {
            Some(path) => load_registry_file(path),
            None => SourceRegistry::builtin().map_err(|source| ConfigError::Registry {
                path: PathBuf::from("<built-in>"),
                source,
            }),
        }
    }

    /// Resolve an output path: bare file names go under `output_dir`.
    pub fn output_path(&self, requested: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) if requested.parent().map_or(true, |p| p.as_os_str().is_empty()) => {
                dir.join(requested)
            }
            _ => requested.to_path_buf(),
        }
    }
}

pub fn load_registry_file(path: &Path) -> Result<SourceRegistry, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    SourceRegistry::from_toml(&contents).map_err(|source| ConfigError::Registry {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_default() {
        let dir = tempdir().unwrap();
        let settings = Settings::try_load_from(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        for contents in ["log_level = [unterminated", "sheet = 3\n"] {
            fs::write(&path, contents).unwrap();
            assert!(matches!(
                Settings::try_load_from(&path),
                Err(ConfigError::Settings { .. })
            ));
        }
    }

    #[test]
    fn full_file_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "log_level = \"debug\"\nsheet = \"Payout\"\n").unwrap();
        let settings = Settings::try_load_from(&path).unwrap();
        assert_eq!(settings.log_level.as_deref(), Some("debug"));
        assert_eq!(settings.sheet.as_deref(), Some("Payout"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "output_dir = \"/tmp/recon\"\n").unwrap();
        let settings = Settings::try_load_from(&path).unwrap();
        assert_eq!(settings.output_dir, Some(PathBuf::from("/tmp/recon")));
        assert!(settings.registry.is_none());
    }

    #[test]
    fn output_path_joins_bare_names_only() {
        let settings = Settings {
            output_dir: Some(PathBuf::from("/srv/out")),
            ..Settings::default()
        };
        assert_eq!(
            settings.output_path(Path::new("result.xlsx")),
            PathBuf::from("/srv/out/result.xlsx")
        );
        assert_eq!(
            settings.output_path(Path::new("here/result.xlsx")),
            PathBuf::from("here/result.xlsx")
        );
    }

    #[test]
    fn default_registry_is_builtin() {
        let registry = Settings::default().load_registry(None).unwrap();
        assert!(registry.lookup("HDFC").is_ok());
    }

    #[test]
    fn bad_registry_file_is_registry_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[matching]\ncommission_tolerance = \"-1\"\n").unwrap();
        let err = Settings::default().load_registry(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Registry { .. }));
    }

    #[test]
    fn missing_registry_file_is_read_error() {
        let dir = tempdir().unwrap();
        let err = load_registry_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

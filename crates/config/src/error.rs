use std::path::PathBuf;

use polrec_recon::ReconError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse settings {}: {source}", path.display())]
    Settings {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid registry {}: {source}", path.display())]
    Registry {
        path: PathBuf,
        #[source]
        source: ReconError,
    },

    #[error("corrupt session file {}: {source}", path.display())]
    Session {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot serialize session: {0}")]
    SerializeSession(#[from] serde_json::Error),
}

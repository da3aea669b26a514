use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconError {
    /// No schema is registered under this source id.
    #[error("unknown source: '{source_id}'")]
    UnknownSource { source_id: String },
    /// Required raw columns absent from an upload. Fatal for that source only.
    #[error("source '{source_id}': missing required column(s): {}", .missing.join(", "))]
    SchemaMismatch {
        source_id: String,
        missing: Vec<String>,
    },
    /// TOML parse / deserialization error.
    #[error("registry parse error: {0}")]
    ConfigParse(String),
    /// Registry validation error (missing display name, bad rule parameters, etc.).
    #[error("registry validation error: {0}")]
    ConfigValidation(String),
}

impl ReconError {
    /// Source id the error is attributed to, when there is one.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            Self::UnknownSource { source_id } | Self::SchemaMismatch { source_id, .. } => {
                Some(source_id)
            }
            Self::ConfigParse(_) | Self::ConfigValidation(_) => None,
        }
    }
}

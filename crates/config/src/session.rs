// Staged uploads for the multi-step workflow.
// Persisted as JSON at <data dir>/polrec/session.json

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use polrec_recon::{CanonicalRecord, NormalizeStats, Normalized, SourceBatch};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const SESSION_VERSION: u32 = 1;

/// One normalized upload waiting for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedUpload {
    pub source_id: String,
    pub file: PathBuf,
    /// RFC 3339
    pub staged_at: String,
    pub stats: NormalizeStats,
    pub records: Vec<CanonicalRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagedSession {
    pub version: u32,
    pub uploads: Vec<StagedUpload>,
}

impl Default for StagedSession {
    fn default() -> Self {
        Self {
            version: SESSION_VERSION,
            uploads: Vec::new(),
        }
    }
}

impl StagedSession {
    pub fn path() -> PathBuf {
        crate::data_dir().join("session.json")
    }

    /// A missing file is an empty session. A corrupt one is an error: staged
    /// work is never discarded silently.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
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
        let session: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Session {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(
            "loaded {} staged upload(s) from {}",
            session.uploads.len(),
            path.display()
        );
        Ok(session)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("saved {} staged upload(s) to {}", self.uploads.len(), path.display());
        Ok(())
    }

    /// Remove the session file. Returns whether one existed.
    pub fn clear_at(path: &Path) -> Result<bool, ConfigError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ConfigError::Write {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn stage(&mut self, source_id: &str, file: &Path, normalized: Normalized) {
        self.uploads.push(StagedUpload {
            source_id: source_id.to_string(),
            file: file.to_path_buf(),
            staged_at: chrono::Utc::now().to_rfc3339(),
            stats: normalized.stats,
            records: normalized.records,
        });
    }

    /// Drop every upload of a source. Returns how many were removed.
    pub fn unstage(&mut self, source_id: &str) -> usize {
        let before = self.uploads.len();
        self.uploads
            .retain(|u| !u.source_id.trim().eq_ignore_ascii_case(source_id.trim()));
        before - self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.uploads.iter().map(|u| u.records.len()).sum()
    }

    /// Staged uploads as a normalized batch, in staging order.
    pub fn to_batch(&self) -> SourceBatch {
        let mut batch = SourceBatch::default();
        for upload in &self.uploads {
            batch.push(
                &upload.source_id,
                Normalized {
                    records: upload.records.clone(),
                    stats: upload.stats.clone(),
                },
            );
        }
        batch
    }
}

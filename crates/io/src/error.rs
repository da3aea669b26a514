use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
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

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Excel error in {}: {message}", path.display())]
    Excel { path: PathBuf, message: String },

    #[error("cannot write workbook {}: {source}", path.display())]
    Xlsx {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported file type: {} ({reason})", path.display())]
    Unsupported { path: PathBuf, reason: String },

    #[error("{} contains no sheets", path.display())]
    NoSheets { path: PathBuf },

    #[error("sheet '{sheet}' not found in {} (available: {})", path.display(), available.join(", "))]
    SheetNotFound {
        path: PathBuf,
        sheet: String,
        available: Vec<String>,
    },
}

impl IoError {
    pub(crate) fn csv(path: &std::path::Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn xlsx(path: &std::path::Path, source: rust_xlsxwriter::XlsxError) -> Self {
        Self::Xlsx {
            path: path.to_path_buf(),
            source,
        }
    }
}

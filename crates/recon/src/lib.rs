//! `polrec-recon`: insurer commission reconciliation engine.
//!
//! Pure engine crate: receives raw tables already extracted by the caller,
//! returns canonical records and classified reconciliation rows. No CLI or
//! file IO dependencies.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod registry;
pub mod rules;
pub mod summary;

pub use aggregate::aggregate;
pub use config::{ColumnSpec, DedupPolicy, RegistryConfig, TableLayout};
pub use engine::{normalize_sources, reconcile, run, run_normalized, Reconciliation, SourceBatch};
pub use error::ReconError;
pub use model::{
    CanonicalRecord, DifferenceFlag, InsuranceNature, MatchBasis, MatchStatus, NormalizeStats,
    RawRow, RawTable, RawValue, ReconResult, ReconciledRow, SourceFailure, SourceUpload,
    SummaryCounts,
};
pub use normalize::{normalize, Normalized};
pub use registry::{SourceKind, SourceRegistry, SourceSchema};
pub use rules::{canonicalize, IdentifierRule};
pub use summary::{summarize, summarize_by_insurer};

use std::io;
use std::path::PathBuf;

use crate::record::RecordKind;

/// A scan that could not run at all. Per-file problems are not errors; they
/// are reported through [`crate::scan::ScanReport`].
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("cannot access {kind} directory {}: {source}", .path.display())]
    RootUnreadable {
        kind: RecordKind,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{kind} root {} is not a directory", .path.display())]
    NotADirectory { kind: RecordKind, path: PathBuf },
}

impl ScanError {
    pub fn kind(&self) -> RecordKind {
        match self {
            ScanError::RootUnreadable { kind, .. } | ScanError::NotADirectory { kind, .. } => {
                *kind
            }
        }
    }
}

/// Failures surfaced to catalog callers.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("search query must not be empty")]
    EmptyQuery,

    #[error("failed to load {}: {0}", .0.kind().plural())]
    Scan(#[from] ScanError),
}

//! Error types for reggol-core.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReggolError {
    #[error("cannot access {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("tabular columns changed: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("unsupported snapshot format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported snapshot mode: {0}")]
    UnsupportedSnapshotMode(String),

    #[error("no git info for {}: {reason}", directory.display())]
    GitUnavailable { directory: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("binary serialization error: {0}")]
    Binary(#[from] bincode::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ReggolError {
    pub(crate) fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReggolError::FileAccess {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReggolError>;

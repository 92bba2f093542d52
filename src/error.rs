use std::path::PathBuf;

use thiserror::Error;

/// File- and schema-level failures. Any of these aborts the whole merge;
/// cell-level parse problems never surface here and degrade to nulls instead.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Unsupported input format: {path:?}")]
    UnsupportedFormat { path: PathBuf },

    #[error("Input {path:?} has no '{column}' column")]
    MissingKeyColumn { path: PathBuf, column: String },

    #[error("Reading {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid merge layout: {0}")]
    InvalidLayout(String),

    #[error("Merge cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MergeError {
    pub(crate) fn read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        MergeError::Read {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type MergeResult<T> = std::result::Result<T, MergeError>;

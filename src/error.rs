use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("cannot access {}: {reason}", path.display())]
    FileAccess { path: PathBuf, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("worker error: {0}")]
    Worker(String),
}

/// Coarse error category carried by `Failed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidParameter,
    FileAccess,
    Io,
    Internal,
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            AnalysisError::FileAccess { .. } => ErrorKind::FileAccess,
            AnalysisError::Io(_) => ErrorKind::Io,
            AnalysisError::Worker(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn file_access(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AnalysisError::FileAccess {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

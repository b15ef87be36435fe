use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

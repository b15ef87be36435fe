use std::path::PathBuf;

use thiserror::Error;

use crate::manifest::ManifestError;
use crate::media::MediaError;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl From<MediaError> for ConvertError {
    fn from(error: MediaError) -> Self {
        match error {
            MediaError::Io { source, path } => ConvertError::Io { source, path },
        }
    }
}

pub type ConvertResult<T> = Result<T, ConvertError>;

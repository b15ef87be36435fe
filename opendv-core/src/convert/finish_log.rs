use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{ConvertError, ConvertResult};

/// Append-only list of video ids whose conversion finished, one per line.
#[derive(Debug)]
pub struct FinishLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FinishLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every recorded id. A missing file means nothing finished yet.
    pub fn load(&self) -> ConvertResult<HashSet<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(parse_finish_log(&contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
            Err(source) => Err(ConvertError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub async fn append(&self, video_id: &str) -> ConvertResult<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| ConvertError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| ConvertError::Io {
                path: self.path.clone(),
                source,
            })?;
        file.write_all(format!("{video_id}\n").as_bytes())
            .await
            .map_err(|source| ConvertError::Io {
                path: self.path.clone(),
                source,
            })?;
        file.flush().await.map_err(|source| ConvertError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn parse_finish_log(contents: &str) -> HashSet<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        source: serde_json::Error,
        path: PathBuf,
    },
}

pub type ManifestResult<T> = std::result::Result<T, ManifestError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Split {
    Train,
    Val,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "Train",
            Split::Val => "Val",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Split {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "val" => Ok(Split::Val),
            other => Err(serde::de::Error::custom(format!(
                "unknown split `{other}`, expected Train or Val"
            ))),
        }
    }
}

/// One expected dataset item as listed in the meta info file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "videoid")]
    pub video_id: String,
    #[serde(rename = "youtuber")]
    pub channel_name: String,
    pub split: Split,
    #[serde(rename = "length")]
    pub expected_length_seconds: f64,
    #[serde(rename = "start_discard")]
    pub start_discard_seconds: f64,
    #[serde(rename = "end_discard")]
    pub end_discard_seconds: f64,
}

impl ManifestEntry {
    /// Seconds left once both discard windows are cut away.
    pub fn kept_seconds(&self) -> f64 {
        self.expected_length_seconds - self.start_discard_seconds - self.end_discard_seconds
    }

    pub fn expected_frame_count(&self, frame_rate: f64) -> u64 {
        let frames = (self.kept_seconds() * frame_rate).floor();
        if frames.is_finite() && frames > 0.0 {
            frames as u64
        } else {
            0
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.video_id.trim().is_empty() {
            return Err("empty video id".to_string());
        }
        let values = [
            ("length", self.expected_length_seconds),
            ("start_discard", self.start_discard_seconds),
            ("end_discard", self.end_discard_seconds),
        ];
        for (name, value) in values {
            if !value.is_finite() {
                return Err(format!("{name} is not a finite number"));
            }
        }
        if self.start_discard_seconds < 0.0 || self.end_discard_seconds < 0.0 {
            return Err("discard windows must be non-negative".to_string());
        }
        if self.expected_length_seconds <= self.start_discard_seconds + self.end_discard_seconds {
            return Err(format!(
                "length {} does not exceed discards {} + {}",
                self.expected_length_seconds, self.start_discard_seconds, self.end_discard_seconds
            ));
        }
        Ok(())
    }
}

/// Path-safe directory name for a channel.
pub fn channel_dir_name(channel: &str) -> String {
    let normalized: String = channel
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match normalized.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => normalized,
    }
}

/// Parses the meta info JSON. Entries failing `ManifestEntry::validate` are
/// logged and dropped; only unreadable JSON fails the whole file.
pub fn parse_manifest(contents: &str, origin: &Path) -> ManifestResult<Vec<ManifestEntry>> {
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(contents).map_err(|source| ManifestError::Parse {
            source,
            path: origin.to_path_buf(),
        })?;
    let total = entries.len();
    let kept: Vec<ManifestEntry> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match entry.validate() {
            Ok(()) => Some(entry),
            Err(reason) => {
                warn!(
                    target: "manifest",
                    index,
                    video_id = %entry.video_id,
                    %reason,
                    "skipping invalid manifest entry"
                );
                None
            }
        })
        .collect();
    if kept.len() < total {
        warn!(
            target: "manifest",
            path = %origin.display(),
            skipped = total - kept.len(),
            kept = kept.len(),
            "manifest loaded with invalid entries"
        );
    }
    Ok(kept)
}

pub fn load_manifest<P: AsRef<Path>>(path: P) -> ManifestResult<Vec<ManifestEntry>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    parse_manifest(&contents, path)
}

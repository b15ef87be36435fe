use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::filesystem::file_size;

use super::{ReconcileError, ReconcileResult};

/// A video whose probed duration matched the manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub observed_duration: f64,
    pub observed_fps: f64,
}

/// A frame directory holding exactly the expected number of images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameSetRecord {
    pub video_path: PathBuf,
    pub size_bytes: u64,
    pub num_frames: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationStats {
    pub manifest_entries: usize,
    pub downloading_videos: usize,
    pub downloading_bytes: u64,
    pub invalid_videos: usize,
    pub invalid_bytes: u64,
    pub valid_videos: usize,
    pub valid_bytes: u64,
    pub valid_duration_seconds: f64,
    /// Bytes already written into frame directories that are not complete yet.
    pub pending_frame_bytes: u64,
    pub processed_videos: usize,
    pub total_frames: u64,
    pub total_frame_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub generated_at: DateTime<Utc>,
    pub valid_videos: Vec<VideoRecord>,
    pub downloading_videos: Vec<PathBuf>,
    pub invalid_videos: Vec<PathBuf>,
    pub valid_imgs: Vec<FrameSetRecord>,
    pub stats: ReconciliationStats,
}

impl ReconciliationReport {
    pub(crate) fn empty() -> Self {
        Self {
            generated_at: Utc::now(),
            valid_videos: Vec::new(),
            downloading_videos: Vec::new(),
            invalid_videos: Vec::new(),
            valid_imgs: Vec::new(),
            stats: ReconciliationStats::default(),
        }
    }

    /// Folds the classified lists into `stats`. Sizes of downloading and
    /// invalid videos are read from disk now, not at classification time.
    pub(crate) fn summarize(
        &mut self,
        manifest_entries: usize,
        pending_frame_bytes: u64,
        partial_marker: impl Fn(&Path) -> PathBuf,
    ) {
        let stats = &mut self.stats;
        stats.manifest_entries = manifest_entries;
        stats.pending_frame_bytes = pending_frame_bytes;

        stats.valid_videos = self.valid_videos.len();
        stats.valid_bytes = self.valid_videos.iter().map(|v| v.size_bytes).sum();
        stats.valid_duration_seconds = self.valid_videos.iter().map(|v| v.observed_duration).sum();

        stats.processed_videos = self.valid_imgs.len();
        stats.total_frames = self.valid_imgs.iter().map(|f| f.num_frames).sum();
        stats.total_frame_bytes = self.valid_imgs.iter().map(|f| f.size_bytes).sum();

        stats.downloading_videos = self.downloading_videos.len();
        stats.downloading_bytes = self
            .downloading_videos
            .iter()
            .map(|path| file_size(&partial_marker(path)))
            .sum();

        stats.invalid_videos = self.invalid_videos.len();
        stats.invalid_bytes = self.invalid_videos.iter().map(|path| file_size(path)).sum();
    }

    /// Overwrites the JSON snapshot at `path`.
    pub fn write_to(&self, path: &Path) -> ReconcileResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ReconcileError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ReconcileError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

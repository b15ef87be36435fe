use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::config::ProcessingConfig;
use crate::manifest::{channel_dir_name, ManifestEntry};

/// Width of the zero-padded, 1-based frame index in image file names.
pub const FRAME_INDEX_WIDTH: usize = 7;
pub const FRAME_EXTENSION: &str = "jpg";

/// Result of probing the candidate files of one manifest entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoLocation {
    pub found: Option<PathBuf>,
    /// Candidates carrying a partial-download marker, in probe order.
    pub partials: Vec<PathBuf>,
}

/// Answers where a manifest entry lives on disk and what is there.
#[derive(Debug, Clone, Copy)]
pub struct DatasetLayout<'a> {
    config: &'a ProcessingConfig,
}

impl<'a> DatasetLayout<'a> {
    pub fn new(config: &'a ProcessingConfig) -> Self {
        Self { config }
    }

    pub fn channel_dir(&self, root: &Path, channel: &str) -> PathBuf {
        root.join(channel_dir_name(channel))
    }

    pub fn video_candidates(&self, entry: &ManifestEntry) -> Vec<PathBuf> {
        let dir = self.channel_dir(&self.config.video_root, &entry.channel_name);
        self.config
            .video_extensions
            .iter()
            .map(|ext| dir.join(format!("{}.{}", entry.video_id, ext)))
            .collect()
    }

    pub fn partial_marker(&self, video_path: &Path) -> PathBuf {
        let mut raw = video_path.as_os_str().to_owned();
        raw.push(&self.config.partial_suffix);
        PathBuf::from(raw)
    }

    pub fn frame_dir(&self, entry: &ManifestEntry) -> PathBuf {
        self.channel_dir(self.config.frame_root(entry.split), &entry.channel_name)
            .join(&entry.video_id)
    }

    /// Walks the candidates in order and stops at the first final file.
    pub fn locate_video(&self, entry: &ManifestEntry) -> VideoLocation {
        let mut location = VideoLocation::default();
        for candidate in self.video_candidates(entry) {
            if self.partial_marker(&candidate).exists() {
                location.partials.push(candidate.clone());
            }
            if candidate.is_file() {
                location.found = Some(candidate);
                break;
            }
        }
        location
    }
}

/// `%07d.jpg` name of the 1-based frame `index`.
pub fn frame_file_name(index: u64) -> String {
    format!(
        "{index:0width$}.{FRAME_EXTENSION}",
        width = FRAME_INDEX_WIDTH
    )
}

/// Size in bytes, or zero when the file is gone.
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

/// Number of entries directly inside `dir`; zero when it does not exist.
pub fn count_entries(dir: &Path) -> usize {
    match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|entry| entry.ok()).count(),
        Err(_) => 0,
    }
}

/// Total size of the regular files below `dir`.
pub fn directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDirStats {
    pub num_frames: usize,
    pub size_bytes: u64,
}

pub fn frame_dir_stats(dir: &Path) -> FrameDirStats {
    if !dir.is_dir() {
        return FrameDirStats {
            num_frames: 0,
            size_bytes: 0,
        };
    }
    FrameDirStats {
        num_frames: count_entries(dir),
        size_bytes: directory_size(dir),
    }
}

/// Runs `frame_dir_stats` on the blocking pool so large directories do not
/// stall the async workers.
pub async fn scan_frame_dir(dir: PathBuf) -> FrameDirStats {
    let dir_display = dir.display().to_string();
    match tokio::task::spawn_blocking(move || frame_dir_stats(&dir)).await {
        Ok(stats) => stats,
        Err(err) => {
            warn!(
                target: "filesystem",
                dir = %dir_display,
                error = %err,
                "frame directory scan aborted"
            );
            FrameDirStats {
                num_frames: 0,
                size_bytes: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_processing_config;
    use crate::manifest::Split;
    use tempfile::TempDir;

    fn config_for(dir: &Path) -> ProcessingConfig {
        let contents = format!(
            r#"
            [paths]
            base_dir = "{}"
            video_root = "videos"
            train_frame_root = "train"
            val_frame_root = "val"
            meta_info = "meta.json"
            finish_log = "finish.log"

            [conversion]
            frame_rate = 2
            num_workers = 1
            "#,
            dir.display()
        );
        parse_processing_config(&contents).unwrap()
    }

    fn entry(split: Split) -> ManifestEntry {
        ManifestEntry {
            video_id: "abc".into(),
            channel_name: "My Channel".into(),
            split,
            expected_length_seconds: 100.0,
            start_discard_seconds: 10.0,
            end_discard_seconds: 10.0,
        }
    }

    #[test]
    fn frame_names_are_seven_digit_one_based() {
        assert_eq!(frame_file_name(1), "0000001.jpg");
        assert_eq!(frame_file_name(160), "0000160.jpg");
    }

    #[test]
    fn frame_dir_follows_split() {
        let dir = TempDir::new().unwrap();
        let config = config_for(dir.path());
        let layout = DatasetLayout::new(&config);
        assert_eq!(
            layout.frame_dir(&entry(Split::Train)),
            dir.path().join("train/My_Channel/abc")
        );
        assert_eq!(
            layout.frame_dir(&entry(Split::Val)),
            dir.path().join("val/My_Channel/abc")
        );
    }

    #[test]
    fn locate_stops_at_first_existing_extension() {
        let dir = TempDir::new().unwrap();
        let config = config_for(dir.path());
        let layout = DatasetLayout::new(&config);
        let channel = dir.path().join("videos/My_Channel");
        fs::create_dir_all(&channel).unwrap();

        assert_eq!(layout.locate_video(&entry(Split::Train)), VideoLocation::default());

        fs::write(channel.join("abc.mp4.part"), b"partial").unwrap();
        fs::write(channel.join("abc.webm"), b"done").unwrap();
        fs::write(channel.join("abc.mkv"), b"shadowed").unwrap();
        let location = layout.locate_video(&entry(Split::Train));
        assert_eq!(location.found, Some(channel.join("abc.webm")));
        assert_eq!(location.partials, vec![channel.join("abc.mp4")]);
    }

    #[test]
    fn partial_marker_appends_suffix() {
        let dir = TempDir::new().unwrap();
        let config = config_for(dir.path());
        let layout = DatasetLayout::new(&config);
        assert_eq!(
            layout.partial_marker(Path::new("/v/c/abc.mp4")),
            PathBuf::from("/v/c/abc.mp4.part")
        );
    }

    #[test]
    fn frame_dir_stats_count_and_size() {
        let dir = TempDir::new().unwrap();
        let frames = dir.path().join("frames");
        assert_eq!(frame_dir_stats(&frames).num_frames, 0);
        fs::create_dir_all(&frames).unwrap();
        for index in 1..=3 {
            fs::write(frames.join(frame_file_name(index)), vec![0u8; 10]).unwrap();
        }
        let stats = frame_dir_stats(&frames);
        assert_eq!(stats.num_frames, 3);
        assert_eq!(stats.size_bytes, 30);
        assert_eq!(file_size(&frames.join("missing.jpg")), 0);
    }

    #[tokio::test]
    async fn scan_runs_off_the_async_workers() {
        let dir = TempDir::new().unwrap();
        let frames = dir.path().join("frames");
        fs::create_dir_all(&frames).unwrap();
        for index in 1..=5 {
            fs::write(frames.join(frame_file_name(index)), vec![0u8; 2]).unwrap();
        }
        let stats = scan_frame_dir(frames.clone()).await;
        assert_eq!(stats, frame_dir_stats(&frames));
        assert_eq!(stats.num_frames, 5);
        assert_eq!(stats.size_bytes, 10);
        let missing = scan_frame_dir(dir.path().join("absent")).await;
        assert_eq!(missing.num_frames, 0);
    }
}

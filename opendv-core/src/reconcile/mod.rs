mod error;
mod models;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ProcessingConfig;
use crate::filesystem::{file_size, scan_frame_dir, DatasetLayout};
use crate::manifest::ManifestEntry;
use crate::media::MediaInspector;

pub use error::{ReconcileError, ReconcileResult};
pub use models::{FrameSetRecord, ReconciliationReport, ReconciliationStats, VideoRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VideoVerdict {
    Valid,
    Invalid,
}

/// Per-run caches keyed by resolved video path.
#[derive(Debug, Default)]
struct RunState {
    valid_videos: HashMap<PathBuf, usize>,
    invalid_videos: HashSet<PathBuf>,
    downloading: HashSet<PathBuf>,
    frame_sets_checked: HashSet<PathBuf>,
    pending_frame_bytes: u64,
}

/// Compares the manifest against what is on disk and classifies each video
/// and frame directory.
#[derive(Debug)]
pub struct Reconciler {
    config: Arc<ProcessingConfig>,
    inspector: MediaInspector,
}

impl Reconciler {
    pub fn new(config: Arc<ProcessingConfig>, inspector: MediaInspector) -> Self {
        Self { config, inspector }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub async fn reconcile(&self, entries: &[ManifestEntry]) -> ReconciliationReport {
        let layout = DatasetLayout::new(&self.config);
        let mut report = ReconciliationReport::empty();
        let mut state = RunState::default();

        info!(target: "reconcile", entries = entries.len(), "checking started");
        for entry in entries {
            let location = layout.locate_video(entry);
            for partial in location.partials {
                if state.downloading.insert(partial.clone()) {
                    report.downloading_videos.push(partial);
                }
            }
            let Some(video_path) = location.found else {
                continue;
            };

            let verdict = self
                .classify_video(entry, &video_path, &mut state, &mut report)
                .await;
            if verdict == VideoVerdict::Invalid {
                continue;
            }
            if !state.frame_sets_checked.insert(video_path.clone()) {
                continue;
            }
            self.classify_frames(&layout, entry, video_path, &mut state, &mut report)
                .await;
        }

        report.summarize(entries.len(), state.pending_frame_bytes, |path| {
            layout.partial_marker(path)
        });
        info!(
            target: "reconcile",
            valid_videos = report.stats.valid_videos,
            downloading = report.stats.downloading_videos,
            invalid = report.stats.invalid_videos,
            processed = report.stats.processed_videos,
            frames = report.stats.total_frames,
            "checking finished"
        );
        report
    }

    /// Runs `reconcile` and overwrites the configured report file.
    pub async fn reconcile_and_persist(
        &self,
        entries: &[ManifestEntry],
        report_path: &Path,
    ) -> ReconcileResult<ReconciliationReport> {
        let report = self.reconcile(entries).await;
        report.write_to(report_path)?;
        info!(target: "reconcile", path = %report_path.display(), "report written");
        Ok(report)
    }

    async fn classify_video(
        &self,
        entry: &ManifestEntry,
        video_path: &Path,
        state: &mut RunState,
        report: &mut ReconciliationReport,
    ) -> VideoVerdict {
        if state.valid_videos.contains_key(video_path) {
            return VideoVerdict::Valid;
        }
        if state.invalid_videos.contains(video_path) {
            return VideoVerdict::Invalid;
        }

        let size_bytes = file_size(video_path);
        let probe = self.inspector.inspect(video_path).await;
        let deviation = (probe.duration_seconds - entry.expected_length_seconds).abs();
        if deviation > self.config.duration_tolerance_seconds {
            warn!(
                target: "reconcile",
                video_id = %entry.video_id,
                path = %video_path.display(),
                expected = entry.expected_length_seconds,
                observed = probe.duration_seconds,
                "video duration mismatch"
            );
            state.invalid_videos.insert(video_path.to_path_buf());
            report.invalid_videos.push(video_path.to_path_buf());
            return VideoVerdict::Invalid;
        }

        debug!(
            target: "reconcile",
            video_id = %entry.video_id,
            size = size_bytes,
            fps = probe.fps,
            duration = probe.duration_seconds,
            "video valid"
        );
        state
            .valid_videos
            .insert(video_path.to_path_buf(), report.valid_videos.len());
        report.valid_videos.push(VideoRecord {
            path: video_path.to_path_buf(),
            size_bytes,
            observed_duration: probe.duration_seconds,
            observed_fps: probe.fps,
        });
        VideoVerdict::Valid
    }

    async fn classify_frames(
        &self,
        layout: &DatasetLayout<'_>,
        entry: &ManifestEntry,
        video_path: PathBuf,
        state: &mut RunState,
        report: &mut ReconciliationReport,
    ) {
        let frame_dir = layout.frame_dir(entry);
        let expected = entry.expected_frame_count(self.config.frame_rate);
        let stats = scan_frame_dir(frame_dir).await;
        if stats.num_frames as u64 != expected {
            debug!(
                target: "reconcile",
                video_id = %entry.video_id,
                frames = stats.num_frames,
                expected,
                "frame set incomplete"
            );
            state.pending_frame_bytes += stats.size_bytes;
            return;
        }
        report.valid_imgs.push(FrameSetRecord {
            video_path,
            size_bytes: stats.size_bytes,
            num_frames: expected,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_processing_config;
    use crate::manifest::Split;
    use tempfile::TempDir;

    fn config_for(dir: &Path) -> ProcessingConfig {
        parse_processing_config(&format!(
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

            [ffmpeg]
            binary = "/nonexistent/ffmpeg-for-tests"
            "#,
            dir.display()
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn entries_without_video_are_skipped() {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(config_for(dir.path()));
        let reconciler = Reconciler::new(
            Arc::clone(&config),
            MediaInspector::new(config.ffmpeg.clone()),
        );
        let entries = vec![ManifestEntry {
            video_id: "missing".into(),
            channel_name: "chan".into(),
            split: Split::Val,
            expected_length_seconds: 30.0,
            start_discard_seconds: 0.0,
            end_discard_seconds: 0.0,
        }];
        let report = reconciler.reconcile(&entries).await;
        assert!(report.valid_videos.is_empty());
        assert!(report.invalid_videos.is_empty());
        assert!(report.downloading_videos.is_empty());
        assert!(report.valid_imgs.is_empty());
        assert_eq!(report.stats.manifest_entries, 1);
    }

    #[tokio::test]
    async fn unprobeable_video_is_invalid() {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(config_for(dir.path()));
        let channel = dir.path().join("videos/chan");
        std::fs::create_dir_all(&channel).unwrap();
        std::fs::write(channel.join("v1.mp4"), vec![1u8; 64]).unwrap();
        let reconciler = Reconciler::new(
            Arc::clone(&config),
            MediaInspector::new(config.ffmpeg.clone()),
        );
        let entries = vec![ManifestEntry {
            video_id: "v1".into(),
            channel_name: "chan".into(),
            split: Split::Train,
            expected_length_seconds: 30.0,
            start_discard_seconds: 0.0,
            end_discard_seconds: 0.0,
        }];
        let report = reconciler.reconcile(&entries).await;
        assert_eq!(report.invalid_videos, vec![channel.join("v1.mp4")]);
        assert_eq!(report.stats.invalid_bytes, 64);
        assert!(report.valid_imgs.is_empty());
    }
}

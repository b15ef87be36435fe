#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use opendv_core::filesystem::frame_file_name;
use opendv_core::{
    channel_dir_name, parse_processing_config, CommandExecutor, FrameExtractor, ManifestEntry,
    MediaInspector, ProcessingConfig, Split,
};

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
#[cfg(windows)]
use std::os::windows::process::ExitStatusExt;

pub fn exit_status(code: i32) -> ExitStatus {
    #[cfg(unix)]
    return ExitStatus::from_raw(code << 8);
    #[cfg(windows)]
    return ExitStatus::from_raw(code as u32);
}

pub fn banner(duration: f64) -> String {
    let hours = (duration / 3600.0).floor();
    let minutes = ((duration - hours * 3600.0) / 60.0).floor();
    let seconds = duration - hours * 3600.0 - minutes * 60.0;
    format!(
        "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'video.mp4':\n  \
         Duration: {hours:02}:{minutes:02}:{seconds:07.4}, start: 0.000000, bitrate: 4781 kb/s\n  \
         Stream #0:0(und): Video: h264 (High), yuv420p, 1920x1080, 4650 kb/s, 25 fps, 25 tbr\n\
         At least one output file must be specified\n"
    )
}

/// Stands in for ffmpeg: answers probes from a duration table and writes
/// `floor(duration * fps)` empty images for extractions.
#[derive(Default)]
pub struct FakeFfmpeg {
    durations: Mutex<HashMap<PathBuf, f64>>,
    failing_videos: Mutex<HashSet<PathBuf>>,
    probes: Mutex<HashMap<PathBuf, usize>>,
    extractions: Mutex<Vec<(Vec<String>, Vec<(String, String)>)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeFfmpeg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set_duration(&self, path: impl Into<PathBuf>, seconds: f64) {
        self.durations.lock().unwrap().insert(path.into(), seconds);
    }

    pub fn fail_extraction_of(&self, path: impl Into<PathBuf>) {
        self.failing_videos.lock().unwrap().insert(path.into());
    }

    pub fn probe_count(&self, path: &Path) -> usize {
        self.probes
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_probes(&self) -> usize {
        self.probes.lock().unwrap().values().sum()
    }

    pub fn extractions(&self) -> Vec<(Vec<String>, Vec<(String, String)>)> {
        self.extractions.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|arg| arg == flag)
            .and_then(|index| args.get(index + 1))
            .map(String::as_str)
    }

    fn probe(&self, args: &[String]) -> Output {
        let input = PathBuf::from(Self::value_after(args, "-i").unwrap_or_default());
        *self.probes.lock().unwrap().entry(input.clone()).or_insert(0) += 1;
        let stderr = match self.durations.lock().unwrap().get(&input) {
            Some(duration) => banner(*duration),
            None => format!("{}: Invalid data found when processing input\n", input.display()),
        };
        Output {
            status: exit_status(1),
            stdout: Vec::new(),
            stderr: stderr.into_bytes(),
        }
    }

    fn extract(&self, args: &[String]) -> Output {
        let input = PathBuf::from(Self::value_after(args, "-i").unwrap_or_default());
        if self.failing_videos.lock().unwrap().contains(&input) {
            return Output {
                status: exit_status(1),
                stdout: Vec::new(),
                stderr: b"Conversion failed!".to_vec(),
            };
        }
        let duration: f64 = Self::value_after(args, "-t")
            .and_then(|value| value.parse().ok())
            .unwrap_or(0.0);
        let fps: f64 = Self::value_after(args, "-vf")
            .and_then(|value| value.strip_prefix("fps="))
            .and_then(|value| value.parse().ok())
            .unwrap_or(0.0);
        let pattern = PathBuf::from(args.last().cloned().unwrap_or_default());
        let out_dir = pattern.parent().map(Path::to_path_buf).unwrap_or_default();
        let frames = (duration * fps).floor() as u64;
        for index in 1..=frames {
            fs::write(out_dir.join(frame_file_name(index)), b"jpg").unwrap();
        }
        Output {
            status: exit_status(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

#[async_trait]
impl CommandExecutor for FakeFfmpeg {
    async fn run(
        &self,
        _program: &Path,
        args: &[String],
        envs: &[(String, String)],
    ) -> std::io::Result<Output> {
        let is_extraction = args.iter().any(|arg| arg == "-vf");
        if !is_extraction {
            return Ok(self.probe(args));
        }
        self.extractions
            .lock()
            .unwrap()
            .push((args.to_vec(), envs.to_vec()));
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let output = self.extract(args);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(output)
    }
}

pub fn config_for(base: &Path, gpus: &[u32], workers: usize) -> ProcessingConfig {
    let gpus = gpus
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    parse_processing_config(&format!(
        r#"
        [paths]
        base_dir = "{}"
        video_root = "videos"
        train_frame_root = "frames/train"
        val_frame_root = "frames/val"
        meta_info = "meta.json"
        finish_log = "logs/finish.log"
        report = "logs/check_log.json"

        [conversion]
        frame_rate = 2
        num_workers = {workers}
        gpus = [{gpus}]
        "#,
        base.display()
    ))
    .expect("test config parses")
}

pub fn entry(id: &str, channel: &str, split: Split, length: f64) -> ManifestEntry {
    ManifestEntry {
        video_id: id.to_string(),
        channel_name: channel.to_string(),
        split,
        expected_length_seconds: length,
        start_discard_seconds: 10.0,
        end_discard_seconds: 10.0,
    }
}

/// Writes `videos/<channel>/<id>.<ext>` and returns its path.
pub fn write_video(
    config: &ProcessingConfig,
    channel: &str,
    id: &str,
    ext: &str,
    size: usize,
) -> PathBuf {
    let dir = config.video_root.join(channel_dir_name(channel));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{id}.{ext}"));
    fs::write(&path, vec![0u8; size]).unwrap();
    path
}

pub fn write_frames(dir: &Path, count: u64, bytes_each: usize) {
    fs::create_dir_all(dir).unwrap();
    for index in 1..=count {
        fs::write(dir.join(frame_file_name(index)), vec![0u8; bytes_each]).unwrap();
    }
}

pub fn inspector(config: &ProcessingConfig, fake: &Arc<FakeFfmpeg>) -> MediaInspector {
    MediaInspector::new(config.ffmpeg.clone())
        .with_executor(Arc::clone(fake) as Arc<dyn CommandExecutor>)
}

pub fn extractor(config: &ProcessingConfig, fake: &Arc<FakeFfmpeg>) -> FrameExtractor {
    FrameExtractor::new(config.ffmpeg.clone())
        .with_executor(Arc::clone(fake) as Arc<dyn CommandExecutor>)
}

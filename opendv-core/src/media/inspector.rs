use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::FfmpegSettings;

use super::{describe_command, device_env, CommandExecutor, SystemCommandExecutor};

/// Observed duration and frame rate of a video file.
///
/// `MediaProbe::UNKNOWN` stands for "could not determine"; it never matches a
/// positive expected duration, so callers end up classifying the file invalid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MediaProbe {
    pub duration_seconds: f64,
    pub fps: f64,
}

impl MediaProbe {
    pub const UNKNOWN: MediaProbe = MediaProbe {
        duration_seconds: 0.0,
        fps: 0.0,
    };

    pub fn is_known(&self) -> bool {
        *self != Self::UNKNOWN
    }
}

/// Pulls `Duration:` and the video stream `fps` out of ffmpeg's banner.
#[derive(Debug, Clone)]
pub struct ProbeOutputParser {
    duration_regex: Regex,
    fps_regex: Regex,
}

impl Default for ProbeOutputParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeOutputParser {
    pub fn new() -> Self {
        let duration_regex =
            Regex::new(r"Duration:\s*(\d+):(\d{1,2}):(\d{1,2}(?:\.\d+)?)").expect("valid regex");
        let fps_regex = Regex::new(r"(\d+(?:\.\d+)?)\s*fps\b").expect("valid regex");
        Self {
            duration_regex,
            fps_regex,
        }
    }

    pub fn parse(&self, diagnostics: &str) -> Option<MediaProbe> {
        let duration_seconds = self.parse_duration(diagnostics)?;
        let fps = self.parse_fps(diagnostics)?;
        Some(MediaProbe {
            duration_seconds,
            fps,
        })
    }

    fn parse_duration(&self, diagnostics: &str) -> Option<f64> {
        let captures = self.duration_regex.captures(diagnostics)?;
        let hours: f64 = captures.get(1)?.as_str().parse().ok()?;
        let minutes: f64 = captures.get(2)?.as_str().parse().ok()?;
        let seconds: f64 = captures.get(3)?.as_str().parse().ok()?;
        Some(hours * 3600.0 + minutes * 60.0 + seconds)
    }

    fn parse_fps(&self, diagnostics: &str) -> Option<f64> {
        diagnostics
            .lines()
            .filter(|line| line.contains("Stream") && line.contains("Video"))
            .find_map(|line| {
                let captures = self.fps_regex.captures(line)?;
                captures.get(1)?.as_str().parse().ok()
            })
    }
}

/// Convenience wrapper around a default parser.
pub fn parse_probe_output(diagnostics: &str) -> MediaProbe {
    ProbeOutputParser::new()
        .parse(diagnostics)
        .unwrap_or(MediaProbe::UNKNOWN)
}

pub struct MediaInspector {
    settings: FfmpegSettings,
    parser: ProbeOutputParser,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for MediaInspector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaInspector")
            .field("settings", &self.settings)
            .finish()
    }
}

impl MediaInspector {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self {
            settings,
            parser: ProbeOutputParser::new(),
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    fn probe_args(&self, video_path: &Path) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string()];
        if let Some(hwaccel) = &self.settings.hwaccel {
            args.push("-hwaccel".to_string());
            args.push(hwaccel.clone());
        }
        args.push("-i".to_string());
        args.push(video_path.to_string_lossy().to_string());
        args
    }

    /// Never fails: anything that goes wrong collapses into `MediaProbe::UNKNOWN`.
    pub async fn inspect(&self, video_path: &Path) -> MediaProbe {
        let program: PathBuf = self.settings.binary.clone();
        let args = self.probe_args(video_path);
        let envs = device_env(self.settings.probe_unit);
        let execution = timeout(
            self.settings.probe_timeout,
            self.executor.run(&program, &args, &envs),
        );
        // ffmpeg exits non-zero when given no output file; the banner on
        // stderr is still complete, so the status is ignored here.
        let output = match execution.await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(
                    target: "media",
                    command = %describe_command(&program, &args),
                    error = %err,
                    "failed to launch media probe"
                );
                return MediaProbe::UNKNOWN;
            }
            Err(_) => {
                warn!(
                    target: "media",
                    path = %video_path.display(),
                    timeout = ?self.settings.probe_timeout,
                    "media probe timed out"
                );
                return MediaProbe::UNKNOWN;
            }
        };
        let diagnostics = String::from_utf8_lossy(&output.stderr);
        match self.parser.parse(&diagnostics) {
            Some(probe) => {
                debug!(
                    target: "media",
                    path = %video_path.display(),
                    duration = probe.duration_seconds,
                    fps = probe.fps,
                    "probed video"
                );
                probe
            }
            None => {
                warn!(
                    target: "media",
                    path = %video_path.display(),
                    "probe output lacks duration or fps"
                );
                MediaProbe::UNKNOWN
            }
        }
    }
}

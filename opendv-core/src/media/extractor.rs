use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, warn};

use crate::config::FfmpegSettings;
use crate::filesystem::{FRAME_EXTENSION, FRAME_INDEX_WIDTH};

use super::{
    describe_command, device_env, CommandExecutor, MediaError, MediaResult, SystemCommandExecutor,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub video_path: PathBuf,
    pub output_dir: PathBuf,
    pub frame_rate: f64,
    pub start_offset_seconds: f64,
    pub duration_seconds: f64,
    pub unit_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Completed,
    Failed { status: Option<i32>, detail: String },
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Completed)
    }
}

pub struct FrameExtractor {
    settings: FfmpegSettings,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for FrameExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameExtractor")
            .field("settings", &self.settings)
            .finish()
    }
}

impl FrameExtractor {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self {
            settings,
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn build_args(&self, request: &ExtractionRequest) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
        ];
        if let Some(hwaccel) = &self.settings.hwaccel {
            args.push("-hwaccel".to_string());
            args.push(hwaccel.clone());
        }
        let pattern = request
            .output_dir
            .join(format!("%0{FRAME_INDEX_WIDTH}d.{FRAME_EXTENSION}"));
        args.extend([
            "-i".to_string(),
            request.video_path.to_string_lossy().to_string(),
            "-ss".to_string(),
            format_seconds(request.start_offset_seconds),
            "-t".to_string(),
            format_seconds(request.duration_seconds),
            "-vf".to_string(),
            format!("fps={}", format_seconds(request.frame_rate)),
            pattern.to_string_lossy().to_string(),
        ]);
        args
    }

    /// Only output-directory creation can fail; transcoder failures come back
    /// as `ExtractionOutcome::Failed` so a worker pool can keep going.
    pub async fn extract(&self, request: &ExtractionRequest) -> MediaResult<ExtractionOutcome> {
        ensure_dir(&request.output_dir).await?;
        let args = self.build_args(request);
        let envs = device_env(request.unit_id);
        let program = &self.settings.binary;
        debug!(
            target: "media",
            command = %describe_command(program, &args),
            unit = ?request.unit_id,
            "starting frame extraction"
        );
        let outcome = match self.executor.run(program, &args, &envs).await {
            Ok(output) if output.status.success() => ExtractionOutcome::Completed,
            Ok(output) => ExtractionOutcome::Failed {
                status: output.status.code(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            },
            Err(err) => ExtractionOutcome::Failed {
                status: None,
                detail: err.to_string(),
            },
        };
        if let ExtractionOutcome::Failed { status, detail } = &outcome {
            warn!(
                target: "media",
                video = %request.video_path.display(),
                unit = ?request.unit_id,
                status = ?status,
                detail = %detail,
                "frame extraction failed"
            );
        }
        Ok(outcome)
    }
}

async fn ensure_dir(path: &Path) -> MediaResult<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| MediaError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Whole seconds print without a fraction so ffmpeg sees `90`, not `90.0`.
fn format_seconds(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

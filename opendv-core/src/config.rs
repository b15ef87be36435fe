use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::manifest::Split;

pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv"];
pub const DEFAULT_PARTIAL_SUFFIX: &str = ".part";
pub const DEFAULT_DURATION_TOLERANCE_SECONDS: f64 = 2.0;

/// On-disk layout of `opendv.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OpendvConfigFile {
    pub paths: PathsSection,
    pub conversion: ConversionSection,
    #[serde(default)]
    pub reconcile: ReconcileSection,
    #[serde(default)]
    pub ffmpeg: FfmpegSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    /// Relative entries below are resolved against this directory.
    #[serde(default)]
    pub base_dir: Option<String>,
    pub video_root: String,
    pub train_frame_root: String,
    pub val_frame_root: String,
    pub meta_info: String,
    pub finish_log: String,
    #[serde(default = "default_report_path")]
    pub report: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversionSection {
    pub frame_rate: f64,
    pub num_workers: usize,
    #[serde(default)]
    pub gpus: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileSection {
    #[serde(default = "default_extensions")]
    pub video_extensions: Vec<String>,
    #[serde(default = "default_partial_suffix")]
    pub partial_suffix: String,
    #[serde(default = "default_tolerance")]
    pub duration_tolerance_seconds: f64,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            video_extensions: default_extensions(),
            partial_suffix: default_partial_suffix(),
            duration_tolerance_seconds: default_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FfmpegSection {
    #[serde(default = "default_ffmpeg_binary")]
    pub binary: String,
    /// Passed as `-hwaccel <value>` to every invocation when set.
    #[serde(default)]
    pub hwaccel: Option<String>,
    /// Device pinned through `CUDA_VISIBLE_DEVICES` while probing.
    #[serde(default)]
    pub probe_gpu: Option<u32>,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
}

impl Default for FfmpegSection {
    fn default() -> Self {
        Self {
            binary: default_ffmpeg_binary(),
            hwaccel: None,
            probe_gpu: None,
            probe_timeout_seconds: default_probe_timeout(),
        }
    }
}

fn default_report_path() -> String {
    "check_log.json".to_string()
}

fn default_extensions() -> Vec<String> {
    DEFAULT_VIDEO_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_partial_suffix() -> String {
    DEFAULT_PARTIAL_SUFFIX.to_string()
}

fn default_tolerance() -> f64 {
    DEFAULT_DURATION_TOLERANCE_SECONDS
}

fn default_ffmpeg_binary() -> String {
    "ffmpeg".to_string()
}

fn default_probe_timeout() -> u64 {
    30
}

#[derive(Debug, Clone)]
pub struct FfmpegSettings {
    pub binary: PathBuf,
    pub hwaccel: Option<String>,
    pub probe_unit: Option<u32>,
    pub probe_timeout: Duration,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        FfmpegSettings::from(FfmpegSection::default())
    }
}

impl From<FfmpegSection> for FfmpegSettings {
    fn from(section: FfmpegSection) -> Self {
        Self {
            binary: PathBuf::from(section.binary),
            hwaccel: section.hwaccel.filter(|value| !value.trim().is_empty()),
            probe_unit: section.probe_gpu,
            probe_timeout: Duration::from_secs(section.probe_timeout_seconds),
        }
    }
}

/// Validated, read-only settings shared by reconciliation and conversion.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub video_root: PathBuf,
    pub train_frame_root: PathBuf,
    pub val_frame_root: PathBuf,
    pub frame_rate: f64,
    pub worker_count: usize,
    pub processing_unit_ids: Vec<u32>,
    pub finish_log_path: PathBuf,
    pub meta_info_path: PathBuf,
    pub report_path: PathBuf,
    pub video_extensions: Vec<String>,
    pub partial_suffix: String,
    pub duration_tolerance_seconds: f64,
    pub ffmpeg: FfmpegSettings,
}

impl ProcessingConfig {
    pub fn frame_root(&self, split: Split) -> &Path {
        match split {
            Split::Train => &self.train_frame_root,
            Split::Val => &self.val_frame_root,
        }
    }

    /// Unit assigned to the `index`-th emitted work item.
    pub fn unit_for(&self, index: usize) -> Option<u32> {
        if self.processing_unit_ids.is_empty() {
            None
        } else {
            Some(self.processing_unit_ids[index % self.processing_unit_ids.len()])
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(ConfigError::Invalid {
                field: "conversion.frame_rate",
                reason: format!("must be a positive number, got {}", self.frame_rate),
            });
        }
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid {
                field: "conversion.num_workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.video_extensions.is_empty() {
            return Err(ConfigError::Invalid {
                field: "reconcile.video_extensions",
                reason: "at least one extension is required".to_string(),
            });
        }
        if self.partial_suffix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "reconcile.partial_suffix",
                reason: "must not be empty".to_string(),
            });
        }
        if !(self.duration_tolerance_seconds.is_finite() && self.duration_tolerance_seconds >= 0.0)
        {
            return Err(ConfigError::Invalid {
                field: "reconcile.duration_tolerance_seconds",
                reason: format!(
                    "must be a non-negative number, got {}",
                    self.duration_tolerance_seconds
                ),
            });
        }
        Ok(())
    }
}

impl TryFrom<OpendvConfigFile> for ProcessingConfig {
    type Error = ConfigError;

    fn try_from(file: OpendvConfigFile) -> Result<Self> {
        let base = file.paths.base_dir.as_deref().map(PathBuf::from);
        let resolve = |candidate: &str| -> PathBuf {
            let path = Path::new(candidate);
            match &base {
                Some(base) if !path.is_absolute() => base.join(path),
                _ => path.to_path_buf(),
            }
        };
        let video_extensions = file
            .reconcile
            .video_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty())
            .collect();
        let config = Self {
            video_root: resolve(&file.paths.video_root),
            train_frame_root: resolve(&file.paths.train_frame_root),
            val_frame_root: resolve(&file.paths.val_frame_root),
            frame_rate: file.conversion.frame_rate,
            worker_count: file.conversion.num_workers,
            processing_unit_ids: file.conversion.gpus,
            finish_log_path: resolve(&file.paths.finish_log),
            meta_info_path: resolve(&file.paths.meta_info),
            report_path: resolve(&file.paths.report),
            video_extensions,
            partial_suffix: file.reconcile.partial_suffix,
            duration_tolerance_seconds: file.reconcile.duration_tolerance_seconds,
            ffmpeg: FfmpegSettings::from(file.ffmpeg),
        };
        config.validate()?;
        Ok(config)
    }
}

pub fn load_processing_config<P: AsRef<Path>>(path: P) -> Result<ProcessingConfig> {
    let file: OpendvConfigFile = load_toml(path)?;
    ProcessingConfig::try_from(file)
}

pub fn parse_processing_config(contents: &str) -> Result<ProcessingConfig> {
    let file: OpendvConfigFile =
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            source,
            path: PathBuf::from("<inline>"),
        })?;
    ProcessingConfig::try_from(file)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

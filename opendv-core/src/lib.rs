pub mod config;
pub mod convert;
pub mod error;
pub mod filesystem;
pub mod manifest;
pub mod media;
pub mod reconcile;

pub use config::{
    load_processing_config, parse_processing_config, FfmpegSettings, ProcessingConfig,
};
pub use convert::{
    plan_conversion, ConversionScheduler, ConvertError, ConvertResult, ExecutionSummary,
    FinishLog, ResourceFailure, WorkItem,
};
pub use error::{ConfigError, Result};
pub use filesystem::{DatasetLayout, VideoLocation};
pub use manifest::{
    channel_dir_name, load_manifest, ManifestEntry, ManifestError, ManifestResult, Split,
};
pub use media::{
    CommandExecutor, ExtractionOutcome, ExtractionRequest, FrameExtractor, MediaError,
    MediaInspector, MediaProbe, SystemCommandExecutor,
};
pub use reconcile::{
    FrameSetRecord, ReconcileError, ReconcileResult, Reconciler, ReconciliationReport,
    ReconciliationStats, VideoRecord,
};

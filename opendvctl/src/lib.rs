use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use opendv_core::{
    load_manifest, load_processing_config, ConversionScheduler, ExecutionSummary, FrameExtractor,
    ManifestEntry, MediaInspector, ProcessingConfig, Reconciler, ReconciliationStats, WorkItem,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] opendv_core::ConfigError),
    #[error("manifest error: {0}")]
    Manifest(#[from] opendv_core::ManifestError),
    #[error("reconcile error: {0}")]
    Reconcile(#[from] opendv_core::ReconcileError),
    #[error("conversion error: {0}")]
    Convert(#[from] opendv_core::ConvertError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{count} item(s) hit resource errors during conversion")]
    ResourceFailures { count: usize },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "OpenDV dataset reconciliation and frame extraction", long_about = None)]
pub struct Cli {
    /// Path to opendv.toml
    #[arg(long, global = true, default_value = "configs/opendv.toml")]
    pub config: PathBuf,
    /// Meta info JSON overriding paths.meta_info
    #[arg(long, global = true)]
    pub manifest: Option<PathBuf>,
    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check downloaded videos and extracted frames against the manifest
    Check(CheckArgs),
    /// List videos whose frames still need extracting
    Plan(PlanArgs),
    /// Extract frames for every unfinished video
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Where to write the JSON report (defaults to paths.report)
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Maximum number of work items printed
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Worker count overriding conversion.num_workers
    #[arg(long)]
    pub workers: Option<usize>,
    /// Plan only, without invoking ffmpeg
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

pub fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match &cli.command {
        Commands::Check(args) => {
            let summary = runtime.block_on(context.check(args))?;
            render(&summary, cli.format)?;
        }
        Commands::Plan(args) => {
            let listing = context.plan(args)?;
            render(&listing, cli.format)?;
        }
        Commands::Convert(args) => {
            let outcome = runtime.block_on(context.convert(args))?;
            render(&outcome, cli.format)?;
            if let ConvertOutcome::Executed(summary) = &outcome {
                if !summary.resource_errors.is_empty() {
                    return Err(AppError::ResourceFailures {
                        count: summary.resource_errors.len(),
                    });
                }
            }
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: Arc<ProcessingConfig>,
    manifest_path: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_processing_config(&cli.config)?;
        let manifest_path = cli
            .manifest
            .clone()
            .unwrap_or_else(|| config.meta_info_path.clone());
        Ok(Self {
            config: Arc::new(config),
            manifest_path,
        })
    }

    fn manifest(&self) -> Result<Vec<ManifestEntry>> {
        Ok(load_manifest(&self.manifest_path)?)
    }

    async fn check(&self, args: &CheckArgs) -> Result<CheckSummary> {
        let entries = self.manifest()?;
        let report_path = args
            .report
            .clone()
            .unwrap_or_else(|| self.config.report_path.clone());
        let reconciler = Reconciler::new(
            Arc::clone(&self.config),
            MediaInspector::new(self.config.ffmpeg.clone()),
        );
        let report = reconciler
            .reconcile_and_persist(&entries, &report_path)
            .await?;
        Ok(CheckSummary {
            report_path,
            stats: report.stats,
        })
    }

    fn scheduler(&self) -> ConversionScheduler {
        ConversionScheduler::new(
            Arc::clone(&self.config),
            FrameExtractor::new(self.config.ffmpeg.clone()),
        )
    }

    fn plan(&self, args: &PlanArgs) -> Result<PlanListing> {
        let entries = self.manifest()?;
        let mut items = self.scheduler().plan(&entries)?;
        let total = items.len();
        if let Some(limit) = args.limit {
            items.truncate(limit);
        }
        Ok(PlanListing { total, items })
    }

    async fn convert(&self, args: &ConvertArgs) -> Result<ConvertOutcome> {
        let entries = self.manifest()?;
        let scheduler = self.scheduler();
        let items = scheduler.plan(&entries)?;
        if args.dry_run {
            return Ok(ConvertOutcome::DryRun(PlanListing {
                total: items.len(),
                items,
            }));
        }
        let workers = args.workers.unwrap_or(self.config.worker_count);
        let summary = scheduler.execute(items, workers).await?;
        Ok(ConvertOutcome::Executed(summary))
    }
}

#[derive(Debug, Serialize)]
pub struct CheckSummary {
    pub report_path: PathBuf,
    pub stats: ReconciliationStats,
}

impl DisplayFallback for CheckSummary {
    fn display(&self) -> String {
        let stats = &self.stats;
        [
            format!("Full Dataset: {}", stats.manifest_entries),
            format!("Downloading Videos: {}", stats.downloading_videos),
            format!(
                "Downloading Videos Size: {}",
                format_bytes(stats.downloading_bytes)
            ),
            format!("Invalid Videos: {}", stats.invalid_videos),
            format!("Invalid Videos Size: {}", format_bytes(stats.invalid_bytes)),
            format!("Valid Videos: {}", stats.valid_videos),
            format!("Valid Videos Size: {}", format_bytes(stats.valid_bytes)),
            format!(
                "Valid Videos Duration: {}",
                format_hms(stats.valid_duration_seconds)
            ),
            format!("Processing Size: {}", format_bytes(stats.pending_frame_bytes)),
            format!("Processed Videos: {}", stats.processed_videos),
            format!("Total Frames: {}", stats.total_frames),
            format!("Total Frames Size: {}", format_bytes(stats.total_frame_bytes)),
            format!("Report: {}", self.report_path.display()),
        ]
        .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct PlanListing {
    pub total: usize,
    pub items: Vec<WorkItem>,
}

impl DisplayFallback for PlanListing {
    fn display(&self) -> String {
        if self.total == 0 {
            return "Nothing left to convert".to_string();
        }
        let mut lines = vec![format!("{} unfinished video(s)", self.total)];
        for item in &self.items {
            let unit = item
                .assigned_unit_id
                .map(|unit| unit.to_string())
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "{id} | gpu={unit} | {video} -> {out}",
                id = item.video_id,
                video = item.video_path.display(),
                out = item.output_dir.display(),
            ));
        }
        if self.items.len() < self.total {
            lines.push(format!("... {} more", self.total - self.items.len()));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConvertOutcome {
    DryRun(PlanListing),
    Executed(ExecutionSummary),
}

impl DisplayFallback for ConvertOutcome {
    fn display(&self) -> String {
        match self {
            ConvertOutcome::DryRun(listing) => listing.display(),
            ConvertOutcome::Executed(summary) => {
                let mut lines = vec![format!(
                    "Converted {}/{} video(s), {} failed",
                    summary.completed, summary.total, summary.failed
                )];
                for failure in &summary.resource_errors {
                    lines.push(format!("  ! {}: {}", failure.video_id, failure.message));
                }
                lines.join("\n")
            }
        }
    }
}

pub fn format_bytes(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

pub fn format_hms(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!(
        "{}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

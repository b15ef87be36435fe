mod error;
mod finish_log;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ProcessingConfig;
use crate::filesystem::{count_entries, DatasetLayout};
use crate::manifest::ManifestEntry;
use crate::media::{ExtractionOutcome, ExtractionRequest, FrameExtractor};

pub use error::{ConvertError, ConvertResult};
pub use finish_log::{parse_finish_log, FinishLog};

/// One pending frame extraction, fixed at planning time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkItem {
    pub video_id: String,
    pub video_path: PathBuf,
    pub output_dir: PathBuf,
    pub frame_rate: f64,
    pub start_discard: f64,
    pub end_discard: f64,
    pub length: f64,
    pub assigned_unit_id: Option<u32>,
}

impl WorkItem {
    pub fn extraction_request(&self) -> ExtractionRequest {
        ExtractionRequest {
            video_path: self.video_path.clone(),
            output_dir: self.output_dir.clone(),
            frame_rate: self.frame_rate,
            start_offset_seconds: self.start_discard,
            duration_seconds: self.length - self.start_discard - self.end_discard,
            unit_id: self.assigned_unit_id,
        }
    }
}

/// Computes the entries whose frames still need extracting.
///
/// Depends only on `finished` and the filesystem, so calling it again after an
/// interrupted run picks up exactly the directories left incomplete. Each
/// output directory appears in at most one item.
pub fn plan_conversion(
    entries: &[ManifestEntry],
    config: &ProcessingConfig,
    finished: &HashSet<String>,
) -> Vec<WorkItem> {
    let layout = DatasetLayout::new(config);
    let mut items = Vec::new();
    let mut planned_dirs = HashSet::new();
    for entry in entries {
        if finished.contains(&entry.video_id) {
            continue;
        }
        let Some(video_path) = layout.locate_video(entry).found else {
            continue;
        };
        let output_dir = layout.frame_dir(entry);
        if planned_dirs.contains(&output_dir) {
            debug!(
                target: "convert",
                video_id = %entry.video_id,
                "duplicate manifest entry skipped"
            );
            continue;
        }
        let expected = entry.expected_frame_count(config.frame_rate);
        if count_entries(&output_dir) as u64 == expected {
            continue;
        }
        planned_dirs.insert(output_dir.clone());
        items.push(WorkItem {
            video_id: entry.video_id.clone(),
            video_path,
            output_dir,
            frame_rate: config.frame_rate,
            start_discard: entry.start_discard_seconds,
            end_discard: entry.end_discard_seconds,
            length: entry.expected_length_seconds,
            assigned_unit_id: config.unit_for(items.len()),
        });
    }
    items
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceFailure {
    pub video_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub resource_errors: Vec<ResourceFailure>,
}

impl ExecutionSummary {
    fn absorb(&mut self, other: ExecutionSummary) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.resource_errors.extend(other.resource_errors);
    }
}

#[derive(Debug)]
pub struct ConversionScheduler {
    config: Arc<ProcessingConfig>,
    extractor: Arc<FrameExtractor>,
    finish_log: Arc<FinishLog>,
}

impl ConversionScheduler {
    pub fn new(config: Arc<ProcessingConfig>, extractor: FrameExtractor) -> Self {
        let finish_log = Arc::new(FinishLog::new(config.finish_log_path.clone()));
        Self {
            config,
            extractor: Arc::new(extractor),
            finish_log,
        }
    }

    pub fn finish_log(&self) -> &FinishLog {
        &self.finish_log
    }

    pub fn plan(&self, entries: &[ManifestEntry]) -> ConvertResult<Vec<WorkItem>> {
        let finished = self.finish_log.load()?;
        let items = plan_conversion(entries, &self.config, &finished);
        info!(
            target: "convert",
            entries = entries.len(),
            finished = finished.len(),
            pending = items.len(),
            "collected unfinished videos"
        );
        Ok(items)
    }

    /// Drains `items` through `worker_count` workers. A failed item is counted
    /// and logged; the remaining items still run.
    pub async fn execute(
        &self,
        items: Vec<WorkItem>,
        worker_count: usize,
    ) -> ConvertResult<ExecutionSummary> {
        let total = items.len();
        let mut summary = ExecutionSummary {
            total,
            ..ExecutionSummary::default()
        };
        if total == 0 {
            return Ok(summary);
        }

        let queue: Arc<[WorkItem]> = items.into();
        let cursor = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let workers = worker_count.max(1).min(total);
        info!(target: "convert", total, workers, "conversion started");

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let cursor = Arc::clone(&cursor);
            let done = Arc::clone(&done);
            let extractor = Arc::clone(&self.extractor);
            let finish_log = Arc::clone(&self.finish_log);
            set.spawn(async move {
                let mut tally = ExecutionSummary::default();
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(item) = queue.get(index) else {
                        break;
                    };
                    debug!(target: "convert", worker, video_id = %item.video_id, "picked item");
                    run_item(item, &extractor, &finish_log, &mut tally).await;
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    info!(
                        target: "convert",
                        done = finished,
                        total = queue.len(),
                        video_id = %item.video_id,
                        "progress"
                    );
                }
                tally
            });
        }

        let mut join_failure = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(tally) => summary.absorb(tally),
                Err(err) => {
                    warn!(target: "convert", error = %err, "conversion worker aborted");
                    join_failure.get_or_insert_with(|| err.to_string());
                }
            }
        }
        if let Some(message) = join_failure {
            return Err(ConvertError::Worker(message));
        }

        info!(
            target: "convert",
            completed = summary.completed,
            failed = summary.failed,
            resource_errors = summary.resource_errors.len(),
            "conversion finished"
        );
        Ok(summary)
    }

    /// Plans against the current finish log and filesystem, then executes
    /// with the configured worker count.
    pub async fn run(&self, entries: &[ManifestEntry]) -> ConvertResult<ExecutionSummary> {
        let items = self.plan(entries)?;
        self.execute(items, self.config.worker_count).await
    }
}

async fn run_item(
    item: &WorkItem,
    extractor: &FrameExtractor,
    finish_log: &FinishLog,
    tally: &mut ExecutionSummary,
) {
    match extractor.extract(&item.extraction_request()).await {
        Ok(ExtractionOutcome::Completed) => match finish_log.append(&item.video_id).await {
            Ok(()) => tally.completed += 1,
            Err(err) => {
                warn!(target: "convert", video_id = %item.video_id, error = %err, "failed to record finished video");
                tally.resource_errors.push(ResourceFailure {
                    video_id: item.video_id.clone(),
                    message: err.to_string(),
                });
            }
        },
        Ok(ExtractionOutcome::Failed { .. }) => tally.failed += 1,
        Err(err) => {
            warn!(target: "convert", video_id = %item.video_id, error = %err, "cannot prepare output directory");
            tally.resource_errors.push(ResourceFailure {
                video_id: item.video_id.clone(),
                message: err.to_string(),
            });
        }
    }
}

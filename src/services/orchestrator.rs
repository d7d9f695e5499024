//! Batch import orchestrator
//!
//! Drives staged records through a [`RecordWriter`] one at a time, folds each
//! outcome into the [`ImportResult`] and reports progress every N records and
//! on the last one. A failing record becomes an error issue carrying its row
//! number and raw data; the loop always continues.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::defaults::DEFAULT_PROGRESS_EVERY;
use crate::error::StoreError;
use crate::types::{ImportIssue, ImportProgress, ImportResult, NotFoundEntry};

/// Receives progress updates. Must not block.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: ImportProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(ImportProgress) + Send + Sync,
{
    fn report(&self, progress: ImportProgress) {
        self(progress)
    }
}

/// Sink that drops every update
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: ImportProgress) {}
}

/// A normalized record that passed its flow's acceptance gate
#[derive(Debug, Clone)]
pub struct Staged<R> {
    pub row_number: u32,
    /// Header → cell text of the source row
    pub raw: serde_json::Value,
    pub record: R,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    /// Already present; counted as success, nothing written
    Duplicate,
    /// No client matched the natural key
    NotFound(String),
}

/// What persisting one record did
#[derive(Debug, Clone)]
pub struct WriteReport {
    pub outcome: WriteOutcome,
    /// Row numbers are filled in by the orchestrator
    pub warnings: Vec<ImportIssue>,
    pub plant_created: Option<String>,
}

impl WriteReport {
    pub fn new(outcome: WriteOutcome) -> Self {
        Self {
            outcome,
            warnings: Vec::new(),
            plant_created: None,
        }
    }
}

/// Persists one record of a flow: natural-key lookup plus create-or-update.
#[async_trait]
pub trait RecordWriter<R: Send + Sync>: Send + Sync {
    async fn write(&self, record: &R) -> Result<WriteReport, StoreError>;
}

pub struct BatchImporter {
    progress_every: usize,
}

impl Default for BatchImporter {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_EVERY)
    }
}

impl BatchImporter {
    pub fn new(progress_every: usize) -> Self {
        Self {
            progress_every: progress_every.max(1),
        }
    }

    /// Write every staged record sequentially, accumulating into `result`.
    pub async fn run<R, W>(
        &self,
        records: Vec<Staged<R>>,
        writer: &W,
        progress: &dyn ProgressSink,
        result: &mut ImportResult,
    ) where
        R: Send + Sync,
        W: RecordWriter<R> + ?Sized,
    {
        let total = records.len();

        for (idx, staged) in records.into_iter().enumerate() {
            match writer.write(&staged.record).await {
                Ok(report) => apply_report(result, staged.row_number, report),
                Err(e) => {
                    warn!("Row {} failed: {}", staged.row_number, e);
                    result.push_issue(
                        ImportIssue::error(staged.row_number, "", e.to_string()).with_record(staged.raw),
                    );
                }
            }

            let current = idx + 1;
            if current % self.progress_every == 0 || current == total {
                progress.report(ImportProgress::new(current as u32, total as u32));
            }
        }
    }
}

fn apply_report(result: &mut ImportResult, row_number: u32, report: WriteReport) {
    match report.outcome {
        WriteOutcome::Created => {
            result.success += 1;
            result.created += 1;
        }
        WriteOutcome::Updated => {
            result.success += 1;
            result.updated += 1;
        }
        WriteOutcome::Duplicate => {
            debug!("Row {} already imported", row_number);
            result.success += 1;
            result.duplicates += 1;
        }
        WriteOutcome::NotFound(key) => {
            debug!("Row {}: no client for {}", row_number, key);
            result.not_found.push(NotFoundEntry { row_number, key });
        }
    }

    for mut issue in report.warnings {
        issue.row_number = row_number;
        result.push_issue(issue);
    }
    if let Some(plant) = report.plant_created {
        result.plants_created.insert(plant);
    }
}

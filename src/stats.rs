//! Counters for one batch run.

use crate::types::RunMode;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

/// Result of attempting one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Output written; `missing` lists required fields that came back empty.
    Converted {
        key: String,
        output_key: String,
        missing: Vec<String>,
    },
    Failed { key: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub key: String,
    pub reason: String,
}

/// Persisted as `run_report.json` at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    /// `None` for a list-only run
    pub mode: Option<RunMode>,
    pub list_only: bool,
    pub filters: Vec<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,

    pub discovered: usize,
    pub filtered_out: usize,
    pub skipped: usize,
    pub processed: usize,
    pub failed: usize,

    /// processed outputs with every required field present
    pub complete: usize,
    pub incomplete: usize,

    pub failures: Vec<FileFailure>,
}

impl RunStatistics {
    pub fn new(mode: RunMode, started_at: OffsetDateTime) -> Self {
        Self {
            mode: Some(mode),
            list_only: false,
            filters: Vec::new(),
            started_at,
            finished_at: None,
            discovered: 0,
            filtered_out: 0,
            skipped: 0,
            processed: 0,
            failed: 0,
            complete: 0,
            incomplete: 0,
            failures: Vec::new(),
        }
    }

    /// Discovery-only statistics of a `list` run.
    pub fn discovery(discovered: usize, started_at: OffsetDateTime) -> Self {
        Self {
            mode: None,
            list_only: true,
            discovered,
            ..Self::new(RunMode::Incremental, started_at)
        }
    }

    /// Fold one attempt in. The only place `processed`/`failed` move.
    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Converted {
                key,
                output_key,
                missing,
            } => {
                self.processed += 1;
                if missing.is_empty() {
                    self.complete += 1;
                    info!(key = %key, output = %output_key, "converted");
                } else {
                    self.incomplete += 1;
                    warn!(key = %key, output = %output_key, ?missing, "converted with missing fields");
                }
            }
            FileOutcome::Failed { key, reason } => {
                self.failed += 1;
                tracing::error!(key = %key, reason = %reason, "file failed");
                self.failures.push(FileFailure { key, reason });
            }
        }
    }

    pub fn attempted(&self) -> usize {
        self.processed + self.failed
    }

    /// `discovered = filtered_out + skipped + processed + failed`; a list-only
    /// run partitions nothing.
    pub fn reconciles(&self) -> bool {
        self.list_only
            || self.discovered == self.filtered_out + self.skipped + self.processed + self.failed
    }

    pub fn finish(&mut self, at: OffsetDateTime) {
        self.finished_at = Some(at);
    }

    pub fn log_progress(&self, total: usize) {
        info!(
            done = self.attempted(),
            total,
            processed = self.processed,
            failed = self.failed,
            "progress"
        );
    }

    pub fn log_summary(&self) {
        info!(
            discovered = self.discovered,
            filtered_out = self.filtered_out,
            skipped = self.skipped,
            processed = self.processed,
            failed = self.failed,
            complete = self.complete,
            incomplete = self.incomplete,
            "run finished"
        );
        for f in &self.failures {
            warn!(key = %f.key, reason = %f.reason, "failed file");
        }
        if !self.reconciles() {
            warn!("statistics do not add up to the discovered count");
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

//! Candidate filtering.
//!
//! A [`FilterSpec`] is the conjunction of the predicates the operator picked
//! for one run. Every predicate is optional; an empty spec passes everything.

use crate::error::RunError;
use crate::types::FileRecord;
use regex::Regex;
use time::{Duration, OffsetDateTime};

/// Upper bound for `--last-hours` (keeps the cutoff inside the timestamp range).
const MAX_LAST_HOURS: f64 = 1_000_000.0;

#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    /// inclusive `(lo, hi)`
    pub serial_range: Option<(u64, u64)>,
    /// inclusive timestamp floor
    pub updated_after: Option<OffsetDateTime>,
    /// relative floor, measured back from the catalog's `generated_at`
    pub last_hours: Option<f64>,
    /// cap applied last, after sorting by recency
    pub last_n: Option<usize>,
    pub filename_pattern: Option<Regex>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_serial_range(mut self, lo: u64, hi: u64) -> Self {
        self.serial_range = Some((lo, hi));
        self
    }

    pub fn with_updated_after(mut self, t: OffsetDateTime) -> Self {
        self.updated_after = Some(t);
        self
    }

    pub fn with_last_hours(mut self, hours: f64) -> Self {
        self.last_hours = Some(hours);
        self
    }

    pub fn with_last_n(mut self, n: usize) -> Self {
        self.last_n = Some(n);
        self
    }

    /// Compiles `pattern`; an invalid regex is a setup error.
    pub fn with_filename_pattern(mut self, pattern: &str) -> Result<Self, RunError> {
        let re = Regex::new(pattern)
            .map_err(|e| RunError::Setup(format!("invalid --filename-pattern '{pattern}': {e}")))?;
        self.filename_pattern = Some(re);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.serial_range.is_none()
            && self.updated_after.is_none()
            && self.last_hours.is_none()
            && self.last_n.is_none()
            && self.filename_pattern.is_none()
    }

    /// Reject argument combinations before any file is touched.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.updated_after.is_some() && self.last_hours.is_some() {
            return Err(RunError::Setup(
                "--updated-after and --last-hours are mutually exclusive".to_string(),
            ));
        }
        if let Some((lo, hi)) = self.serial_range {
            if lo > hi {
                return Err(RunError::Setup(format!(
                    "--serial-range start {lo} is greater than end {hi}"
                )));
            }
        }
        if let Some(h) = self.last_hours {
            if !h.is_finite() || h < 0.0 || h > MAX_LAST_HOURS {
                return Err(RunError::Setup(format!(
                    "--last-hours must be between 0 and {MAX_LAST_HOURS}, got {h}"
                )));
            }
        }
        if self.last_n == Some(0) {
            return Err(RunError::Setup("--last-n must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Human readable list of the active predicates, for logs.
    pub fn descriptions(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some((lo, hi)) = self.serial_range {
            out.push(format!("serial_range({lo}..={hi})"));
        }
        if let Some(t) = self.updated_after {
            out.push(format!("updated_after({t})"));
        }
        if let Some(h) = self.last_hours {
            out.push(format!("last_hours({h})"));
        }
        if let Some(re) = &self.filename_pattern {
            out.push(format!("filename_pattern('{}')", re.as_str()));
        }
        if let Some(n) = self.last_n {
            out.push(format!("last_n({n})"));
        }
        out
    }

    /// Timestamp floor from `updated_after` or `last_hours`, whichever is set.
    fn time_floor(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        if let Some(t) = self.updated_after {
            return Some(t);
        }
        let hours = self.last_hours?;
        let window = Duration::seconds_f64(hours * 3600.0);
        Some(now.checked_sub(window).unwrap_or(OffsetDateTime::UNIX_EPOCH))
    }

    fn keeps(&self, rec: &FileRecord, floor: Option<OffsetDateTime>) -> bool {
        if let Some((lo, hi)) = self.serial_range {
            match rec.serial_number {
                Some(n) if lo <= n && n <= hi => {}
                _ => return false,
            }
        }
        if let Some(floor) = floor {
            if rec.last_modified < floor {
                return false;
            }
        }
        if let Some(re) = &self.filename_pattern {
            if !re.is_match(&rec.filename) {
                return false;
            }
        }
        true
    }

    /// Apply every predicate. `now` anchors `last_hours`; callers pass the
    /// catalog's `generated_at` so a snapshot filters the same way twice.
    ///
    /// Order is preserved except when `last_n` is set, which returns the
    /// survivors newest first.
    pub fn apply(&self, records: &[FileRecord], now: OffsetDateTime) -> Vec<FileRecord> {
        let floor = self.time_floor(now);

        let mut out: Vec<FileRecord> = records
            .iter()
            .filter(|r| self.keeps(r, floor))
            .cloned()
            .collect();

        if let Some(n) = self.last_n {
            // stable: equal timestamps keep catalog order
            out.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
            out.truncate(n);
        }

        out
    }
}

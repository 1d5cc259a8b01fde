//! Skip-on-resume bookkeeping.
//!
//! The ledger is not stored anywhere: it is the set of output keys that
//! already exist in the destination, fetched once per run. An existing output
//! of any content counts as "processed", which is why outputs are only ever
//! written with one atomic put after a successful conversion.

use crate::convert;
use crate::error::RunError;
use crate::store::{FileStore, join_key};
use crate::types::{FileRecord, RunMode};
use std::collections::HashSet;
use tracing::debug;

/// `<output_prefix>/<filename stem>.json`
pub fn output_key(output_prefix: &str, rec: &FileRecord) -> String {
    join_key(output_prefix, &format!("{}.json", rec.stem()))
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    existing: HashSet<String>,
}

impl Ledger {
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            existing: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// One listing of the output prefix.
    pub fn load(store: &dyn FileStore, output_prefix: &str) -> Result<Self, RunError> {
        let objects = store
            .list(output_prefix)
            .map_err(|source| RunError::Listing {
                prefix: output_prefix.to_string(),
                source,
            })?;
        let ledger = Self::from_keys(objects.into_iter().map(|o| o.key));
        if ledger.is_empty() {
            debug!(prefix = output_prefix, "no outputs yet");
        } else {
            debug!(outputs = ledger.len(), prefix = output_prefix, "ledger loaded");
        }
        Ok(ledger)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.existing.contains(key)
    }

    pub fn len(&self) -> usize {
        self.existing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.existing.is_empty()
    }
}

/// `force` always processes; otherwise process iff no output exists yet.
pub fn should_process(output_key: &str, ledger: &Ledger, force: bool) -> bool {
    force || !ledger.contains(output_key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Absent,
    /// exists, content not inspected
    Present,
    Complete,
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Process,
    /// already processed
    Skip,
    /// not eligible in this mode, counted with the filtered-out files
    Exclude,
}

pub fn decide(mode: RunMode, state: OutputState) -> Decision {
    match mode {
        RunMode::Force => Decision::Process,
        RunMode::Incremental => match state {
            OutputState::Absent => Decision::Process,
            _ => Decision::Skip,
        },
        RunMode::ReprocessIncomplete => match state {
            OutputState::Incomplete => Decision::Process,
            OutputState::Absent => Decision::Exclude,
            OutputState::Present | OutputState::Complete => Decision::Skip,
        },
    }
}

/// State of the output for `output_key`. Only `ReprocessIncomplete` reads
/// the output body; an unreadable or non-JSON output counts as incomplete.
pub fn inspect(
    store: &dyn FileStore,
    ledger: &Ledger,
    output_key: &str,
    mode: RunMode,
    required_fields: &[String],
) -> OutputState {
    match mode {
        RunMode::Force => OutputState::Present,
        RunMode::Incremental => {
            if should_process(output_key, ledger, false) {
                OutputState::Absent
            } else {
                OutputState::Present
            }
        }
        RunMode::ReprocessIncomplete => {
            if !ledger.contains(output_key) {
                return OutputState::Absent;
            }
            let doc = store
                .get(output_key)
                .ok()
                .and_then(|b| serde_json::from_slice::<serde_json::Value>(&b).ok());
            match doc {
                Some(doc) if convert::missing_fields(&doc, required_fields).is_empty() => {
                    OutputState::Complete
                }
                _ => OutputState::Incomplete,
            }
        }
    }
}

use crate::serial;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Một object do store trả về khi list (chưa có serial).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreObject {
    pub key: String,
    pub size: u64,
    pub last_modified: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub key: String,
    pub filename: String,
    pub size: u64,

    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,

    /// derived from `filename` only
    pub serial_number: Option<u64>,
}

impl FileRecord {
    pub fn from_object(obj: StoreObject) -> Self {
        let filename = filename_of(&obj.key).to_string();
        let serial_number = serial::extract(&filename);
        Self {
            key: obj.key,
            filename,
            size: obj.size,
            last_modified: obj.last_modified,
            serial_number,
        }
    }

    /// filename without its last extension
    pub fn stem(&self) -> &str {
        match self.filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.filename,
        }
    }
}

/// Last `/`-separated segment of a store key.
pub fn filename_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// skip files whose output already exists
    Incremental,
    /// `--no-skip`: ledger bypassed for the whole run
    Force,
    /// `--reprocess-failed`: only files with an incomplete output
    ReprocessIncomplete,
}

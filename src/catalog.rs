use crate::error::RunError;
use crate::store::FileStore;
use crate::types::{FileRecord, StoreObject};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use time::OffsetDateTime;

/// Snapshot of the source files seen by one listing.
///
/// Never filtered: filters run downstream so one snapshot can serve several
/// filtered runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,

    pub total_files: usize,

    pub files: Vec<FileRecord>,
}

/// Nhận .pdf (không phân biệt hoa thường)
pub fn is_pdf_key(key: &str) -> bool {
    key.rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Serial-numbered files first (ascending), then the rest by filename.
/// Key breaks remaining ties so the order is total.
pub fn catalog_order(a: &FileRecord, b: &FileRecord) -> Ordering {
    let primary = match (a.serial_number, b.serial_number) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.filename.cmp(&b.filename)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.filename.cmp(&b.filename),
    };
    primary.then_with(|| a.key.cmp(&b.key))
}

/// List PDF sources under `prefix`. A store error here is fatal for the run.
pub fn list_sources(store: &dyn FileStore, prefix: &str) -> Result<Vec<StoreObject>, RunError> {
    let objects = store.list(prefix).map_err(|source| RunError::Listing {
        prefix: prefix.to_string(),
        source,
    })?;
    Ok(objects.into_iter().filter(|o| is_pdf_key(&o.key)).collect())
}

impl Catalog {
    pub fn build(objects: Vec<StoreObject>, generated_at: OffsetDateTime) -> Self {
        let mut files: Vec<FileRecord> = objects.into_iter().map(FileRecord::from_object).collect();
        files.sort_by(catalog_order);

        Self {
            generated_at,
            total_files: files.len(),
            files,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse a persisted snapshot and check it is self-consistent.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let catalog: Catalog = serde_json::from_slice(bytes).context("parse catalog JSON")?;

        if catalog.total_files != catalog.files.len() {
            return Err(anyhow!(
                "catalog says total_files={} but lists {} file(s)",
                catalog.total_files,
                catalog.files.len()
            ));
        }

        let mut seen = HashSet::with_capacity(catalog.files.len());
        for f in &catalog.files {
            if !seen.insert(f.key.as_str()) {
                return Err(anyhow!("catalog lists key '{}' twice", f.key));
            }
        }

        Ok(catalog)
    }

    /// Write the whole snapshot in one put.
    pub fn persist(&self, store: &dyn FileStore, key: &str) -> Result<()> {
        let body = self.to_json()?;
        store
            .put(key, &body)
            .with_context(|| format!("write catalog {key}"))?;
        Ok(())
    }

    pub fn load(store: &dyn FileStore, key: &str) -> Result<Self> {
        let body = store
            .get(key)
            .with_context(|| format!("read catalog {key}"))?;
        Self::from_json(&body).with_context(|| format!("load catalog {key}"))
    }

    /// (numbered, unnumbered)
    pub fn serial_coverage(&self) -> (usize, usize) {
        let numbered = self
            .files
            .iter()
            .filter(|f| f.serial_number.is_some())
            .count();
        (numbered, self.files.len() - numbered)
    }
}

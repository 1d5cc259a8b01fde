//! Storage backends.
//!
//! Source PDFs, converted outputs, and run metadata all live in one
//! [`FileStore`]. Keys are `/`-separated; a prefix names a "directory" and
//! listing is recursive below it.

pub mod local;
#[cfg(test)]
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use crate::config::StoreConfig;
use crate::error::{RunError, StoreError};
use crate::types::StoreObject;

pub use local::LocalStore;

pub trait FileStore: Send + Sync {
    /// Short location string for logs, e.g. `file:///data` or `s3://bucket`.
    fn describe(&self) -> String;

    /// Every object below `prefix`, in no particular order.
    fn list(&self, prefix: &str) -> Result<Vec<StoreObject>, StoreError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Writes the whole object in one step: a reader never observes a
    /// partially written object under `key`.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// `"a/b/"` -> `"a/b/"`, `"/a/b"` -> `"a/b/"`, `""` -> `""`.
pub fn dir_prefix(prefix: &str) -> String {
    let p = prefix.trim_matches('/');
    if p.is_empty() {
        String::new()
    } else {
        format!("{p}/")
    }
}

/// Join a prefix and a relative name into a key.
pub fn join_key(prefix: &str, name: &str) -> String {
    format!("{}{}", dir_prefix(prefix), name.trim_start_matches('/'))
}

/// Open the backend described by `cfg`.
pub fn open(cfg: &StoreConfig) -> Result<Box<dyn FileStore>, RunError> {
    match cfg {
        StoreConfig::Local { root } => Ok(Box::new(LocalStore::open(root)?)),

        #[cfg(feature = "s3")]
        StoreConfig::S3 {
            bucket,
            region,
            endpoint,
        } => Ok(Box::new(s3::S3Store::connect(
            bucket,
            region.as_deref(),
            endpoint.as_deref(),
        )?)),

        #[cfg(not(feature = "s3"))]
        StoreConfig::S3 { bucket, .. } => Err(RunError::Setup(format!(
            "bucket '{bucket}' requested but this build has no S3 support (enable the `s3` feature)"
        ))),
    }
}

use super::{FileStore, dir_prefix};
use crate::error::{RunError, StoreError};
use crate::types::StoreObject;
use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Component, Path, PathBuf},
};
use time::OffsetDateTime;
use tracing::debug;
use walkdir::WalkDir;

/// Store backed by a directory tree. Key `a/b.pdf` is `<root>/a/b.pdf`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

/// Bỏ file ẩn / file tạm đang ghi dở (`.tmpXXXX`, `~$...`)
fn is_hidden_or_temp(p: &Path) -> bool {
    p.file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.starts_with('.') || s.starts_with("~$"))
        .unwrap_or(true)
}

fn io_err(key: &str, source: std::io::Error) -> StoreError {
    if source.kind() == ErrorKind::NotFound {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::Io {
            key: key.to_string(),
            source,
        }
    }
}

/// `<root>/a/b` -> `a/b`
fn key_of(root: &Path, p: &Path) -> Option<String> {
    let rel = p.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

impl LocalStore {
    /// Root phải tồn tại và là thư mục.
    pub fn open(root: &Path) -> Result<Self, RunError> {
        if !root.is_dir() {
            return Err(RunError::Setup(format!(
                "local store root not found or not a directory: {}",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Resolve a key below the root; rejects `..`, absolute and empty keys.
    fn path_of(&self, key: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(key);
        let ok = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !ok {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

impl FileStore for LocalStore {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    fn list(&self, prefix: &str) -> Result<Vec<StoreObject>, StoreError> {
        let prefix = dir_prefix(prefix);
        let dir = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.path_of(prefix.trim_end_matches('/'))?
        };

        // prefix chưa có => rỗng, giống object storage
        if !dir.exists() {
            debug!(dir = %dir.display(), "list: prefix directory does not exist");
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1) {
            let entry = entry.map_err(|e| io_err(&prefix, e.into()))?;
            if !entry.file_type().is_file() || is_hidden_or_temp(entry.path()) {
                continue;
            }

            let Some(key) = key_of(&self.root, entry.path()) else {
                debug!(path = %entry.path().display(), "list: skipping non UTF-8 path");
                continue;
            };

            let meta = entry.metadata().map_err(|e| io_err(&key, e.into()))?;
            let modified = meta.modified().map_err(|e| io_err(&key, e))?;

            out.push(StoreObject {
                key,
                size: meta.len(),
                last_modified: OffsetDateTime::from(modified),
            });
        }

        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let p = self.path_of(key)?;
        fs::read(&p).map_err(|e| io_err(key, e))
    }

    /// Ghi file tạm cùng thư mục rồi rename => atomic.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let p = self.path_of(key)?;
        let parent = p
            .parent()
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(parent).map_err(|e| io_err(key, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| io_err(key, e))?;
        tmp.write_all(bytes).map_err(|e| io_err(key, e))?;
        tmp.as_file().sync_all().map_err(|e| io_err(key, e))?;
        tmp.persist(&p).map_err(|e| io_err(key, e.error))?;
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.path_of(key)?.is_file())
    }
}

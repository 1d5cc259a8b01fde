//! In-memory store for tests.

use super::{FileStore, dir_prefix};
use crate::error::StoreError;
use crate::types::StoreObject;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use time::OffsetDateTime;

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, OffsetDateTime)>>,
    fail_list: bool,
    fail_get: HashSet<String>,
    fail_put: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, key: &str, bytes: &[u8], modified: OffsetDateTime) -> Self {
        self.insert(key, bytes, modified);
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_get(mut self, key: &str) -> Self {
        self.fail_get.insert(key.to_string());
        self
    }

    pub fn failing_put(mut self, key: &str) -> Self {
        self.fail_put.insert(key.to_string());
        self
    }

    pub fn insert(&self, key: &str, bytes: &[u8], modified: OffsetDateTime) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes.to_vec(), modified));
    }

    pub fn remove(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

impl FileStore for MemoryStore {
    fn describe(&self) -> String {
        "memory://".to_string()
    }

    fn list(&self, prefix: &str) -> Result<Vec<StoreObject>, StoreError> {
        if self.fail_list {
            return Err(StoreError::Remote("list refused".to_string()));
        }
        let prefix = dir_prefix(prefix);
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, (bytes, modified))| StoreObject {
                key: k.clone(),
                size: bytes.len() as u64,
                last_modified: *modified,
            })
            .collect())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        if self.fail_get.contains(key) {
            return Err(StoreError::Remote(format!("get refused: {key}")));
        }
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(b, _)| b.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        if self.fail_put.contains(key) {
            return Err(StoreError::Remote(format!("put refused: {key}")));
        }
        self.insert(key, bytes, OffsetDateTime::now_utc());
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}

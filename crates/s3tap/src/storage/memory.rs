//! In-memory object source for tests and local fixtures.

use chrono::{DateTime, Utc};
use s3tap_common::{Result, TapError};
use std::collections::BTreeMap;
use std::io::Cursor;

use super::{ObjectReader, ObjectSource, StoredObject};

/// An object store held entirely in memory.
///
/// Keys map to a last-modified timestamp and a body; listing order is the
/// same unspecified-by-contract order a real store would give (here, key
/// order), so callers still have to sort.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectSource {
    objects: BTreeMap<String, (DateTime<Utc>, Vec<u8>)>,
}

impl MemoryObjectSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an object.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        last_modified: DateTime<Utc>,
        body: impl Into<Vec<u8>>,
    ) {
        self.objects.insert(key.into(), (last_modified, body.into()));
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectSource for MemoryObjectSource {
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        Ok(self
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (last_modified, body))| StoredObject {
                key: key.clone(),
                last_modified: *last_modified,
                size: body.len() as i64,
            })
            .collect())
    }

    async fn fetch(&self, key: &str) -> Result<ObjectReader> {
        let (_, body) = self
            .objects
            .get(key)
            .ok_or_else(|| TapError::Storage(format!("no such object '{}'", key)))?;
        Ok(Box::new(Cursor::new(body.clone())))
    }
}

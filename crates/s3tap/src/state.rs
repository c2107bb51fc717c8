//! Persisted sync progress
//!
//! Each table owns one [`Bookmark`], the `(last_modified, key)` of the most
//! recently fully-processed object. The bookmark only moves forward; an
//! object with an earlier timestamp that appears after the fact is never
//! re-extracted.

use chrono::{DateTime, Utc};
use s3tap_common::{Result, TapError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::storage::StoredObject;

/// High-water-mark for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub last_modified: DateTime<Utc>,
    pub key: String,
}

impl Bookmark {
    pub fn from_object(object: &StoredObject) -> Self {
        Self {
            last_modified: object.last_modified,
            key: object.key.clone(),
        }
    }

    /// Whether `object` is at or before this bookmark.
    pub fn covers(&self, object: &StoredObject) -> bool {
        object.ordering_key() <= (self.last_modified, self.key.as_str())
    }

    fn ordering_key(&self) -> (DateTime<Utc>, &str) {
        (self.last_modified, self.key.as_str())
    }
}

/// Serialized shape of the whole state file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TapState {
    bookmarks: HashMap<String, Bookmark>,
}

/// Persisted mapping from table name to bookmark.
///
/// `set` must keep each bookmark monotone; `flush` makes the current map
/// durable with last-write-wins semantics and no further transactional
/// guarantees.
pub trait StateStore: Send + Sync {
    fn get(&self, table: &str) -> Result<Option<Bookmark>>;
    fn set(&self, table: &str, bookmark: Bookmark) -> Result<()>;
    fn flush(&self) -> Result<()>;

    /// Snapshot of all bookmarks, for state emission.
    fn snapshot(&self) -> Result<serde_json::Value>;
}

/// JSON-file-backed state store
pub struct FileStateStore {
    path: PathBuf,
    state: Mutex<TapState>,
}

impl FileStateStore {
    /// Open a state file, creating an empty store if it does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                TapState::default()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            TapState::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }
}

impl StateStore for FileStateStore {
    fn get(&self, table: &str) -> Result<Option<Bookmark>> {
        let state = lock_state(&self.state)?;
        Ok(state.bookmarks.get(table).cloned())
    }

    fn set(&self, table: &str, bookmark: Bookmark) -> Result<()> {
        let mut state = lock_state(&self.state)?;
        insert_monotone(&mut state, table, bookmark);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let serialized = {
            let state = lock_state(&self.state)?;
            serde_json::to_string_pretty(&*state)?
        };
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        let state = lock_state(&self.state)?;
        Ok(serde_json::to_value(&*state)?)
    }
}

/// In-memory state store for tests and dry runs
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<TapState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, table: &str) -> Result<Option<Bookmark>> {
        let state = lock_state(&self.state)?;
        Ok(state.bookmarks.get(table).cloned())
    }

    fn set(&self, table: &str, bookmark: Bookmark) -> Result<()> {
        let mut state = lock_state(&self.state)?;
        insert_monotone(&mut state, table, bookmark);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        let state = lock_state(&self.state)?;
        Ok(serde_json::to_value(&*state)?)
    }
}

fn lock_state(state: &Mutex<TapState>) -> Result<std::sync::MutexGuard<'_, TapState>> {
    state
        .lock()
        .map_err(|_| TapError::State("state store mutex poisoned".to_string()))
}

/// Insert a bookmark, keeping the stored one if it is already ahead.
fn insert_monotone(state: &mut TapState, table: &str, bookmark: Bookmark) {
    let already_ahead = state
        .bookmarks
        .get(table)
        .is_some_and(|existing| existing.ordering_key() >= bookmark.ordering_key());
    if !already_ahead {
        state.bookmarks.insert(table.to_string(), bookmark);
    }
}

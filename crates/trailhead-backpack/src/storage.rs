//! Client-side persistent key-value storage.
//!
//! Values are JSON strings. Two keys exist per game:
//!
//! - `trailhead:backpack:<slug>`: the backpack snapshot
//! - `trailhead:drops:<slug>`: the bounded drop-log cache
//!
//! Readers must tolerate a key being absent (first run) or holding garbage
//! (interrupted write, manual edits). [`read_json`] folds both cases into
//! `None` and logs the latter.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;
use trailhead_types::Slug;

use crate::error::StorageError;

/// Storage key of a game's backpack snapshot.
pub fn backpack_key(slug: &Slug) -> String {
    format!("trailhead:backpack:{slug}")
}

/// Storage key of a game's drop-log cache.
pub fn drops_key(slug: &Slug) -> String {
    format!("trailhead:drops:{slug}")
}

/// String key-value persistence.
///
/// Implementations are synchronous and must be cheap enough to call from
/// inside short critical sections.
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read a raw value. `Ok(None)` when the key has never been written.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a raw value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Read and deserialize a JSON value.
///
/// Absent keys, read failures and malformed JSON all yield `None`; the
/// latter two are logged.
pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(raw) => raw?,
        Err(e) => {
            warn!(key, error = %e, "storage read failed");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "discarding malformed stored value");
            None
        }
    }
}

/// Serialize and write a JSON value.
pub fn write_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Volatile store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// One JSON file per key under a directory.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so a crash mid-write leaves either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store files under `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Escape a key into a file stem. Lowercase ASCII letters, digits, `-` and
/// `.` pass through; every other byte becomes `%XX`, so distinct keys never
/// share a file, even on case-insensitive filesystems.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() || matches!(byte, b'-' | b'.') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(key);
        let tmp = target.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key-value store: an in-memory index of WAL offsets rebuilt by replay

use crate::wal::{Wal, WalError};
use kvr_core::{CodecError, Command, Operation};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors returned by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("corrupt entry at offset {offset} during replay: {source}")]
    Replay {
        offset: i64,
        #[source]
        source: CodecError,
    },
    #[error("index entry for {key} at offset {offset} is not a set")]
    NotASet { key: String, offset: i64 },
    #[error("unsupported operation for key {0}")]
    UnsupportedOperation(String),
}

/// Durable key-value store.
///
/// The index maps each live key to the offset of the SET entry that
/// produced its current value. Reads go through the index only; the WAL
/// is scanned once, at open.
pub struct Store {
    wal: Wal,
    index: Mutex<HashMap<String, i64>>,
}

impl Store {
    /// Open or create the WAL at `path` and rebuild the index from it
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let wal = Wal::open(path)?;
        let mut index = HashMap::new();
        let mut entries = 0usize;

        for entry in wal.entries() {
            let entry = entry?;
            let cmd = Command::decode(&entry.payload).map_err(|source| StoreError::Replay {
                offset: entry.offset,
                source,
            })?;
            match cmd.operation {
                Operation::Set => {
                    index.insert(cmd.key, entry.offset);
                }
                Operation::Del => {
                    index.remove(&cmd.key);
                }
                Operation::Unknown => {
                    warn!(offset = entry.offset, key = %cmd.key, "skipping unknown operation in WAL");
                }
            }
            entries += 1;
        }

        info!(
            path = %path.display(),
            entries,
            keys = index.len(),
            bytes = wal.len(),
            "replayed WAL"
        );

        Ok(Self {
            wal,
            index: Mutex::new(index),
        })
    }

    /// Current value of `key`
    pub fn get(&self, key: &str) -> Result<String, StoreError> {
        let offset = self
            .index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))?;

        let cmd = Command::decode(&self.wal.read(offset)?)?;
        if cmd.operation != Operation::Set || cmd.key != key {
            return Err(StoreError::NotASet {
                key: key.to_string(),
                offset,
            });
        }
        Ok(cmd.value)
    }

    /// Set `key` to `value`. The index is only updated once the append succeeds.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let payload = Command::set(key, value).encode()?;

        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        let offset = self.wal.append(&payload)?;
        index.insert(key.to_string(), offset);

        debug!(key, offset, "set");
        Ok(())
    }

    /// Delete `key`, recording the deletion in the WAL
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        let payload = Command::del(key).encode()?;

        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        if !index.contains_key(key) {
            return Err(StoreError::KeyNotFound(key.to_string()));
        }
        let offset = self.wal.append(&payload)?;
        index.remove(key);

        debug!(key, offset, "deleted");
        Ok(())
    }

    /// Apply a decoded command through `set` / `delete`
    pub fn apply(&self, cmd: &Command) -> Result<(), StoreError> {
        match cmd.operation {
            Operation::Set => self.set(&cmd.key, &cmd.value),
            Operation::Del => self.delete(&cmd.key),
            Operation::Unknown => Err(StoreError::UnsupportedOperation(cmd.key.clone())),
        }
    }

    /// Snapshot of the live keys
    pub fn keys(&self) -> BTreeSet<String> {
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently held by the WAL
    pub fn wal_size(&self) -> i64 {
        self.wal.len()
    }

    pub fn path(&self) -> &Path {
        self.wal.path()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

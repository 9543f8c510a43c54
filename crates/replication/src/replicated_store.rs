// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader write path: persist locally, then hand the command to replication

use crate::replicator::Replicator;
use crate::stream_manager::StreamManager;
use kvr_core::{Command, Sequence};
use kvr_storage::{Store, StoreError};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// A store whose writes are replicated to followers.
///
/// Writes are serialized so the leader's WAL order and the replication
/// sequence order agree. Replication is best effort: once the local write
/// succeeds the call succeeds.
pub struct ReplicatedStore {
    store: Arc<Store>,
    stream: Option<Arc<StreamManager>>,
    replicator: Option<Replicator>,
    write_lock: Mutex<()>,
}

impl ReplicatedStore {
    /// Store without replication
    pub fn local(store: Arc<Store>) -> Self {
        Self {
            store,
            stream: None,
            replicator: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Replicate through the streaming fan-out
    pub fn streaming(store: Arc<Store>, stream: Arc<StreamManager>) -> Self {
        Self {
            stream: Some(stream),
            ..Self::local(store)
        }
    }

    /// Replicate by pushing each command to every follower
    pub fn pushing(store: Arc<Store>, replicator: Replicator) -> Self {
        Self {
            replicator: Some(replicator),
            ..Self::local(store)
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn stream(&self) -> Option<&Arc<StreamManager>> {
        self.stream.as_ref()
    }

    pub fn replicator(&self) -> Option<&Replicator> {
        self.replicator.as_ref()
    }

    pub fn get(&self, key: &str) -> Result<String, StoreError> {
        self.store.get(key)
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.store.keys()
    }

    /// Set locally and replicate. Returns the stream sequence assigned, if any.
    pub async fn set(&self, key: &str, value: &str) -> Result<Option<Sequence>, StoreError> {
        let _write = self.write_lock.lock().await;
        self.store.set(key, value)?;
        Ok(self.replicate(Command::set(key, value)).await)
    }

    /// Delete locally and replicate. A missing key is not replicated.
    pub async fn delete(&self, key: &str) -> Result<Option<Sequence>, StoreError> {
        let _write = self.write_lock.lock().await;
        self.store.delete(key)?;
        Ok(self.replicate(Command::del(key)).await)
    }

    async fn replicate(&self, command: Command) -> Option<Sequence> {
        let payload = match command.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(key = %command.key, error = %e, "failed to encode command for replication");
                return None;
            }
        };

        if let Some(replicator) = &self.replicator {
            let failures = replicator.replicate(&payload).await;
            debug!(
                key = %command.key,
                followers = replicator.pool().len(),
                failed = failures.len(),
                "pushed to followers"
            );
        }

        let stream = self.stream.as_ref()?;
        let sequence = stream.broadcast(payload);
        debug!(key = %command.key, op = %command.operation, sequence, "broadcast");
        Some(sequence)
    }
}

#[cfg(test)]
#[path = "replicated_store_tests.rs"]
mod tests;

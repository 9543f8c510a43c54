// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Applying replicated commands to a follower's store

use kvr_core::{CodecError, Command, Operation};
use kvr_storage::{Store, StoreError};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors applying a replicated command
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("undecodable command: {0}")]
    Decode(#[from] CodecError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// What applying a command did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// DEL of a key the store no longer holds
    AlreadyDeleted,
    /// Operation this node does not understand
    Skipped,
}

/// Apply one decoded command.
///
/// Deleting an absent key counts as applied since the store already
/// matches the leader. Unknown operations are skipped, not failed.
pub fn apply_command(store: &Store, command: &Command) -> Result<ApplyOutcome, StoreError> {
    match command.operation {
        Operation::Set => {
            store.set(&command.key, &command.value)?;
            Ok(ApplyOutcome::Applied)
        }
        Operation::Del => match store.delete(&command.key) {
            Ok(()) => Ok(ApplyOutcome::Applied),
            Err(StoreError::KeyNotFound(key)) => {
                debug!(%key, "replicated delete of absent key");
                Ok(ApplyOutcome::AlreadyDeleted)
            }
            Err(e) => Err(e),
        },
        Operation::Unknown => {
            warn!(key = %command.key, "skipping unknown replicated operation");
            Ok(ApplyOutcome::Skipped)
        }
    }
}

/// Decode and apply an encoded command
pub fn apply_payload(store: &Store, payload: &[u8]) -> Result<ApplyOutcome, ApplyError> {
    let command = Command::decode(payload)?;
    Ok(apply_command(store, &command)?)
}

#[cfg(test)]
#[path = "apply_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commands persisted to the write-ahead log and replicated to followers

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Monotonic replication sequence number. Starts at 1; 0 means "nothing applied".
pub type Sequence = i64;

/// Errors from encoding or decoding a command
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
    #[error("failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Mutation carried by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Set,
    Del,
    /// An operation tag this build does not understand
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Set => "set",
            Operation::Del => "del",
            Operation::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A single key-value mutation.
///
/// The encoded form is compact JSON whose field order follows the struct
/// declaration, so the same command always encodes to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "op")]
    pub operation: Operation,
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl Command {
    pub fn new(operation: Operation, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            operation,
            key: key.into(),
            value: value.into(),
        }
    }

    /// A `SET key value` command
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Operation::Set, key, value)
    }

    /// A `DEL key` command (value is empty)
    pub fn del(key: impl Into<String>) -> Self {
        Self::new(Operation::Del, key, String::new())
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(CodecError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::CorruptRecord(e.to_string()))
    }
}

/// An encoded command tagged with the sequence number the leader assigned it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedCommand {
    pub sequence: Sequence,
    pub payload: Vec<u8>,
}

impl ReplicatedCommand {
    pub fn new(sequence: Sequence, payload: Vec<u8>) -> Self {
        Self { sequence, payload }
    }

    /// Decode the carried command
    pub fn command(&self) -> Result<Command, CodecError> {
        Command::decode(&self.payload)
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;

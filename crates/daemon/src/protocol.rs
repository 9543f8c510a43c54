// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol between clients, leaders and followers.
//!
//! Every message is a 4-byte big-endian length followed by a JSON body.
//! A connection carries one request. Unary requests get one response;
//! `StreamReplication` is answered with a `Started` header, a stream of
//! `Command` responses, a `CaughtUp` marker after the backlog, and then
//! live commands.

use kvr_core::Sequence;
use kvr_replication::Epoch;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version reported in `Hello`
pub const PROTOCOL_VERSION: &str = "1";

/// Largest message body accepted (16 MiB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Timeout for reading a request or writing a unary response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timed out")]
    Timeout,
    #[error("message of {size} bytes exceeds limit of {max}")]
    MessageTooLarge { size: usize, max: usize },
}

/// Request sent to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Ping,
    Hello {
        version: String,
    },
    Get {
        key: String,
    },
    Set {
        key: String,
        value: String,
    },
    Delete {
        key: String,
    },
    Keys,
    Status,
    /// Follower asks the leader for everything after `last_sequence`
    StreamReplication {
        follower_id: String,
        last_sequence: Sequence,
        /// Leader epoch `last_sequence` belongs to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        epoch: Option<Epoch>,
    },
    /// Leader pushes one encoded command to a follower
    ReplicateCommand {
        command: Vec<u8>,
    },
}

impl Request {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::Hello { .. } => "hello",
            Request::Get { .. } => "get",
            Request::Set { .. } => "set",
            Request::Delete { .. } => "delete",
            Request::Keys => "keys",
            Request::Status => "status",
            Request::StreamReplication { .. } => "stream_replication",
            Request::ReplicateCommand { .. } => "replicate_command",
        }
    }
}

/// Response from a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Pong,
    Hello {
        version: String,
    },
    Value {
        value: String,
    },
    Ok,
    Keys {
        keys: Vec<String>,
    },
    NotFound {
        key: String,
    },
    /// Writes must go to the leader
    NotLeader {
        leader: Option<String>,
    },
    Error {
        message: String,
    },
    Status {
        status: NodeStatus,
    },
    Replicated {
        success: bool,
        error: Option<String>,
    },
    /// Opens a follower stream: the leader's epoch and the sequence the
    /// follower is treated as current through
    Started {
        epoch: Epoch,
        from: Sequence,
    },
    /// One replicated command on a follower stream
    Command {
        sequence: Sequence,
        command: Vec<u8>,
    },
    /// End of catch-up on a follower stream
    CaughtUp {
        through: Sequence,
        gap: bool,
    },
}

/// Snapshot of a node for `Status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub role: String,
    pub mode: String,
    pub uptime_secs: u64,
    pub keys: usize,
    pub wal_bytes: i64,
    /// Leader only: last replication sequence assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Sequence>,
    /// Leader only: connected stream followers or configured push targets
    #[serde(default)]
    pub followers: Vec<String>,
    /// Leader only: live deliveries dropped on full follower channels
    #[serde(default)]
    pub dropped_deliveries: u64,
    /// Follower only: link state to the leader
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Follower only: last applied sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied: Option<Sequence>,
}

/// Serialize a message body (no length prefix)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

/// Deserialize a message body
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one length-prefixed message.
///
/// A connection closed before the first byte of the prefix is
/// [`ProtocolError::ConnectionClosed`].
pub async fn read_message<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }

    let size = u32::from_be_bytes(prefix) as usize;
    if size > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write one length-prefixed message and flush
pub async fn write_message<W>(writer: &mut W, data: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode a request within `timeout`
pub async fn read_request<R>(reader: &mut R, timeout: Duration) -> Result<Request, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

/// Encode and write a response within `timeout`
pub async fn write_response<W>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;

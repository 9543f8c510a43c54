// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport seams between leader and followers

use async_trait::async_trait;
use kvr_core::{ReplicatedCommand, Sequence};
use std::time::Duration;
use thiserror::Error;

/// Errors from the replication transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("rejected by peer: {0}")]
    Rejected(String),
}

/// Identifies one leader incarnation. Sequences are only comparable
/// between a leader and followers that share its epoch.
pub type Epoch = u64;

/// What a follower sends when it opens a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub follower_id: String,
    pub last_sequence: Sequence,
    /// Epoch `last_sequence` was assigned under, if known
    pub epoch: Option<Epoch>,
}

impl StreamRequest {
    pub fn new(follower_id: impl Into<String>, last_sequence: Sequence) -> Self {
        Self {
            follower_id: follower_id.into(),
            last_sequence,
            epoch: None,
        }
    }

    pub fn with_epoch(mut self, epoch: Option<Epoch>) -> Self {
        self.epoch = epoch;
        self
    }
}

/// An item on the leader-to-follower stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// First event of a session: the leader's epoch and the sequence the
    /// follower is treated as current through
    Started { epoch: Epoch, from: Sequence },
    Command(ReplicatedCommand),
    /// Catch-up finished; everything through `through` has been sent.
    /// `gap` is set when some history could not be served from memory.
    CaughtUp { through: Sequence, gap: bool },
}

/// Leader end of a follower stream
#[async_trait]
pub trait CommandSink: Send {
    async fn send_started(&mut self, epoch: Epoch, from: Sequence) -> Result<(), TransportError>;

    async fn send_command(&mut self, command: &ReplicatedCommand) -> Result<(), TransportError>;

    async fn send_caught_up(&mut self, through: Sequence, gap: bool)
        -> Result<(), TransportError>;

    /// Resolves once the follower has hung up
    async fn closed(&mut self);
}

/// Follower end of a stream
#[async_trait]
pub trait CommandStream: Send {
    /// Next event, `None` when the leader ended the stream
    async fn recv(&mut self) -> Result<Option<StreamEvent>, TransportError>;
}

/// Opens replication streams to the leader
#[async_trait]
pub trait LeaderConnector: Send + Sync + 'static {
    type Stream: CommandStream;

    async fn connect(&self, request: &StreamRequest) -> Result<Self::Stream, TransportError>;
}

/// Unary push of one encoded command to a follower
#[async_trait]
pub trait ReplicaClient: Send + Sync + 'static {
    async fn replicate_command(&self, payload: &[u8]) -> Result<(), TransportError>;
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Replication: leader sequencing and fan-out, follower catch-up, and the
//! point-to-point push alternative

mod apply;
mod follower;
mod leader;
mod recent_log;
mod replicated_store;
mod replicator;
mod sequence_file;
mod stream_manager;
pub mod transport;

pub use apply::{apply_command, apply_payload, ApplyError, ApplyOutcome};
pub use follower::{
    FollowerConfig, FollowerError, LinkState, LinkStatus, StreamClient,
    DEFAULT_PERSIST_EVERY, DEFAULT_RECONNECT_BACKOFF,
};
pub use leader::{serve_follower, SessionSummary};
pub use recent_log::{CatchUp, RecentLog, DEFAULT_CAPACITY};
pub use replicated_store::ReplicatedStore;
pub use replicator::{FollowerPool, ReplicationFailure, Replicator, DEFAULT_REPLICATE_TIMEOUT};
pub use sequence_file::{Position, SequenceFile};
pub use stream_manager::{RegistrationId, StreamManager, Subscription, DEFAULT_CHANNEL_CAPACITY};
pub use transport::{
    CommandSink, CommandStream, Epoch, LeaderConnector, ReplicaClient, StreamEvent,
    StreamRequest, TransportError,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ChannelSink, FakeConnector, FakeReplicaClient, FakeStream, ReplicaBehavior};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kvr-daemon: a replicated key-value store node
//!
//! Serves clients and replication over TCP. A leader accepts writes and
//! replicates them; followers serve reads and apply what the leader sends.

pub mod config;
pub mod lifecycle;
pub mod node;
pub mod protocol;
pub mod server;
pub mod transport;

pub use config::{Args, Config, ConfigError, FileConfig, ReplicationMode, Role};
pub use lifecycle::{spawn, startup, DaemonState, LifecycleError, RunningNode};
pub use node::Node;
pub use protocol::{NodeStatus, ProtocolError, Request, Response};
pub use transport::{request, TcpConnector, TcpReplicaClient};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State shared by every connection on a node

use std::time::Instant;

use kvr_replication::{LinkStatus, ReplicatedStore};
use tokio::sync::watch;

use crate::config::{Config, ReplicationMode, Role};
use crate::protocol::NodeStatus;

pub struct Node {
    node_id: String,
    role: Role,
    mode: ReplicationMode,
    leader_addr: Option<String>,
    store: ReplicatedStore,
    channel_capacity: usize,
    /// Follower link, when this node streams from a leader
    link: Option<watch::Receiver<LinkStatus>>,
    start_time: Instant,
}

impl Node {
    pub fn new(config: &Config, store: ReplicatedStore) -> Self {
        Self {
            node_id: config.node_id.clone(),
            role: config.role,
            mode: config.mode,
            leader_addr: config.leader_addr.clone(),
            store,
            channel_capacity: config.channel_capacity,
            link: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_link(mut self, link: watch::Receiver<LinkStatus>) -> Self {
        self.link = Some(link);
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn leader_addr(&self) -> Option<&str> {
        self.leader_addr.as_deref()
    }

    pub fn store(&self) -> &ReplicatedStore {
        &self.store
    }

    /// Per-follower live channel capacity for stream sessions
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Current link to the leader, if this node follows one
    pub fn link(&self) -> Option<LinkStatus> {
        self.link.as_ref().map(|rx| *rx.borrow())
    }

    pub fn status(&self) -> NodeStatus {
        let store = self.store.store();
        let stream = self.store.stream();
        let link = self.link();

        let followers = match (stream, self.store.replicator()) {
            (Some(stream), _) => stream.followers(),
            (None, Some(replicator)) => replicator.pool().names(),
            (None, None) => Vec::new(),
        };

        NodeStatus {
            node_id: self.node_id.clone(),
            role: self.role.to_string(),
            mode: self.mode.to_string(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            keys: store.len(),
            wal_bytes: store.wal_size(),
            sequence: stream.map(|s| s.latest_sequence()),
            followers,
            dropped_deliveries: stream.map(|s| s.dropped_deliveries()).unwrap_or(0),
            link: link.map(|l| l.state.to_string()),
            last_applied: link.map(|l| l.last_applied),
        }
    }
}

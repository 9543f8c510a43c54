// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test utilities for CLI integration tests.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use kvr_daemon::{spawn, Config, Role, RunningNode};
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// A leader (and optional followers) served on a background runtime
/// while `kvr` runs as a child process.
pub struct TestCluster {
    runtime: Runtime,
    dir: TempDir,
    leader: Option<RunningNode>,
    followers: Vec<RunningNode>,
}

impl TestCluster {
    pub fn leader() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to build runtime");
        let dir = TempDir::new().expect("Failed to create temp directory");

        let mut config = Config::new("leader", Role::Leader, dir.path());
        config.port = 0;
        let leader = runtime
            .block_on(spawn(&config))
            .expect("Failed to start leader");

        Self {
            runtime,
            dir,
            leader: Some(leader),
            followers: Vec::new(),
        }
    }

    /// Add a stream follower and return its address
    pub fn add_follower(&mut self, id: &str) -> String {
        let mut config = Config::new(id, Role::Follower, self.dir.path());
        config.port = 0;
        config.leader_addr = Some(self.addr());
        config.reconnect_backoff = Duration::from_millis(20);
        let follower = self
            .runtime
            .block_on(spawn(&config))
            .expect("Failed to start follower");
        let addr = follower.addr().to_string();
        self.followers.push(follower);
        addr
    }

    pub fn addr(&self) -> String {
        self.leader
            .as_ref()
            .map(|leader| leader.addr().to_string())
            .unwrap_or_default()
    }

    /// Wait until follower `index` holds `key`
    pub fn wait_for_key(&self, index: usize, key: &str) {
        let deadline = Instant::now() + Duration::from_secs(10);
        let node = self.followers[index].node();
        while node.store().get(key).is_err() {
            assert!(Instant::now() < deadline, "follower never received {key}");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Wait until follower `index` reports `sequence` as applied
    pub fn wait_for_applied(&self, index: usize, sequence: i64) {
        let deadline = Instant::now() + Duration::from_secs(10);
        let node = self.followers[index].node();
        while node.link().map_or(0, |link| link.last_applied) < sequence {
            assert!(Instant::now() < deadline, "follower never applied {sequence}");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// An address nothing listens on
    pub fn closed_addr() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        let followers = std::mem::take(&mut self.followers);
        let leader = self.leader.take();
        self.runtime.block_on(async move {
            for follower in followers {
                let _ = follower.stop().await;
            }
            if let Some(leader) = leader {
                let _ = leader.stop().await;
            }
        });
    }
}

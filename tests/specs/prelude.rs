//! Shared helpers for workspace specs.
//!
//! Every spec runs real nodes in-process over loopback TCP and talks to
//! them with the same wire protocol the `kvr` client uses.

pub use std::time::Duration;

use std::path::Path;

use kvr_daemon::protocol::DEFAULT_TIMEOUT;
use kvr_daemon::{request, spawn, NodeStatus, Role};
use kvr_replication::LinkStatus;
use tempfile::TempDir;

pub use kvr_daemon::{Config, ReplicationMode, Request, Response, RunningNode};
pub use kvr_replication::LinkState;

const WAIT: Duration = Duration::from_secs(10);

/// One data directory shared by every node in a scenario
pub struct Cluster {
    dir: TempDir,
}

impl Cluster {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn leader_config(&self) -> Config {
        let mut config = Config::new("leader", Role::Leader, self.path());
        config.port = 0;
        config
    }

    pub fn follower_config(&self, id: &str, leader: &RunningNode) -> Config {
        let mut config = Config::new(id, Role::Follower, self.path());
        config.port = 0;
        config.leader_addr = Some(leader.addr().to_string());
        config.reconnect_backoff = Duration::from_millis(20);
        config.persist_every = 1;
        config
    }

    pub fn push_follower_config(&self, id: &str) -> Config {
        let mut config = Config::new(id, Role::Follower, self.path());
        config.port = 0;
        config.mode = ReplicationMode::Push;
        config
    }

    pub async fn leader(&self) -> RunningNode {
        start(&self.leader_config()).await
    }

    pub async fn follower(&self, id: &str, leader: &RunningNode) -> RunningNode {
        start(&self.follower_config(id, leader)).await
    }
}

pub async fn start(config: &Config) -> RunningNode {
    spawn(config).await.unwrap()
}

/// Client-side view of one node
pub struct Client<'a> {
    node: &'a RunningNode,
}

pub fn client(node: &RunningNode) -> Client<'_> {
    Client { node }
}

impl Client<'_> {
    pub async fn send(&self, req: Request) -> Response {
        request(&self.node.addr().to_string(), &req, DEFAULT_TIMEOUT)
            .await
            .unwrap()
    }

    pub async fn set(&self, key: &str, value: &str) -> Response {
        self.send(Request::Set {
            key: key.to_string(),
            value: value.to_string(),
        })
        .await
    }

    pub async fn del(&self, key: &str) -> Response {
        self.send(Request::Delete {
            key: key.to_string(),
        })
        .await
    }

    pub async fn get(&self, key: &str) -> Response {
        self.send(Request::Get {
            key: key.to_string(),
        })
        .await
    }

    pub async fn keys(&self) -> Vec<String> {
        match self.send(Request::Keys).await {
            Response::Keys { keys } => keys,
            other => panic!("expected keys, got {other:?}"),
        }
    }

    pub async fn status(&self) -> NodeStatus {
        match self.send(Request::Status).await {
            Response::Status { status } => status,
            other => panic!("expected status, got {other:?}"),
        }
    }
}

pub fn value(v: &str) -> Response {
    Response::Value {
        value: v.to_string(),
    }
}

pub fn not_found(key: &str) -> Response {
    Response::NotFound {
        key: key.to_string(),
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn link(node: &RunningNode) -> LinkStatus {
    node.node().link().unwrap()
}

/// Poll `check` until it holds or the deadline passes
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the follower has applied through `sequence`
pub async fn applied(follower: &RunningNode, sequence: i64) {
    eventually(&format!("sequence {sequence}"), || {
        link(follower).last_applied >= sequence
    })
    .await
}

/// Keys held by a node's local store
pub fn local_keys(node: &RunningNode) -> Vec<String> {
    node.node().store().keys().into_iter().collect()
}

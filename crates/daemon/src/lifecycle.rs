// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node lifecycle management: startup, serving, shutdown.

use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use kvr_core::Sequence;
use kvr_replication::{
    FollowerConfig, FollowerPool, ReplicatedStore, Replicator, SequenceFile, StreamClient,
    StreamManager,
};
use kvr_storage::{Store, StoreError};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::config::{Config, ConfigError, ReplicationMode, Role};
use crate::node::Node;
use crate::server;
use crate::transport::{TcpConnector, TcpReplicaClient};

/// Follower stream client running in the background
struct FollowerTask {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Sequence>,
}

/// Node state during operation
pub struct DaemonState {
    /// Configuration
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    listener: TcpListener,
    local_addr: SocketAddr,
    node: Arc<Node>,
    follower: Option<FollowerTask>,
    connections: JoinSet<()>,
}

impl DaemonState {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Accept connections until `shutdown` resolves, one task per connection
    pub async fn serve_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let _ = stream.set_nodelay(true);
                        let node = Arc::clone(&self.node);
                        self.connections.spawn(async move {
                            if let Err(e) = server::handle_connection(node, stream).await {
                                warn!(%peer, error = %e, "connection error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                Some(_) = self.connections.join_next(), if !self.connections.is_empty() => {}
            }
        }
    }

    /// Shutdown the node gracefully
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!(node_id = %self.config.node_id, "Shutting down node...");

        // 1. Drop open connections, ending follower streams
        self.connections.shutdown().await;

        // 2. Stop the follower client; it persists its sequence on the way out
        if let Some(follower) = self.follower.take() {
            let _ = follower.stop.send(());
            match follower.task.await {
                Ok(last_applied) => info!(last_applied, "replication client stopped"),
                Err(e) => warn!(error = %e, "replication client did not stop cleanly"),
            }
        }

        // 3. Remove lock file (the lock itself is released when lock_file drops)
        let lock_path = self.config.lock_path();
        if lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&lock_path) {
                warn!(error = %e, "Failed to remove lock file");
            }
        }

        info!("Node shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to acquire lock {0}: node already running?")]
    LockFailed(std::path::PathBuf, #[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the node
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        // Another instance owns the lock file; leave it alone
        Err(e @ LifecycleError::LockFailed(..)) => Err(e),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    config.validate()?;

    // 1. Create data directory
    std::fs::create_dir_all(&config.data_dir)?;

    // 2. Acquire lock file FIRST - one process per node id and data dir
    let lock_path = config.lock_path();
    let mut lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|e| LifecycleError::LockFailed(lock_path.clone(), e))?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 3. Replay the WAL before accepting anything
    let store = Arc::new(Store::open(&config.wal_path())?);
    info!(
        node_id = %config.node_id,
        keys = store.len(),
        wal_bytes = store.wal_size(),
        "Loaded store"
    );

    // 4. Wire up replication for this role
    let replicated = match (config.role, config.mode) {
        (Role::Leader, ReplicationMode::Stream) => {
            if !config.followers.is_empty() {
                warn!("--followers is ignored in stream mode; followers connect to the leader");
            }
            let manager = Arc::new(StreamManager::new(config.recent_log_capacity));
            ReplicatedStore::streaming(Arc::clone(&store), manager)
        }
        (Role::Leader, ReplicationMode::Push) => {
            let mut pool = FollowerPool::new();
            for addr in &config.followers {
                pool.add(addr.clone(), Arc::new(TcpReplicaClient::new(addr.clone())));
            }
            if pool.is_empty() {
                warn!("push mode with no followers configured");
            }
            ReplicatedStore::pushing(
                Arc::clone(&store),
                Replicator::with_timeout(pool, config.replicate_timeout),
            )
        }
        (Role::Follower, _) => ReplicatedStore::local(Arc::clone(&store)),
    };

    let client = match (config.role, config.mode) {
        (Role::Follower, ReplicationMode::Stream) => {
            let leader_addr = config
                .leader_addr
                .clone()
                .ok_or(ConfigError::MissingLeaderAddr)?;
            let client = StreamClient::new(
                config.node_id.clone(),
                TcpConnector::new(leader_addr),
                Arc::clone(&store),
                FollowerConfig {
                    reconnect_backoff: config.reconnect_backoff,
                    persist_every: config.persist_every,
                },
            )
            .with_sequence_file(SequenceFile::new(config.sequence_path()));
            Some(client)
        }
        _ => None,
    };

    let mut node = Node::new(config, replicated);
    if let Some(client) = &client {
        node = node.with_link(client.status());
    }
    let node = Arc::new(node);

    // 5. Bind (LAST - only after all validation passes)
    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(listen_addr.clone(), e))?;
    let local_addr = listener.local_addr()?;

    // 6. Start following once nothing else can fail
    let follower = client.map(|client| {
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(client.run_until(async move {
            let _ = stopped.await;
        }));
        FollowerTask { stop, task }
    });

    info!(
        node_id = %config.node_id,
        role = %config.role,
        mode = %config.mode,
        addr = %local_addr,
        "Node started"
    );

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        local_addr,
        node,
        follower,
        connections: JoinSet::new(),
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    let lock_path = config.lock_path();
    if lock_path.exists() {
        let _ = std::fs::remove_file(&lock_path);
    }
}

/// A node serving on a background task
pub struct RunningNode {
    addr: SocketAddr,
    node: Arc<Node>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), LifecycleError>>,
}

impl RunningNode {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Shut the node down and wait for it
    pub async fn stop(self) -> Result<(), LifecycleError> {
        let _ = self.stop.send(());
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(LifecycleError::Io(std::io::Error::other(e))),
        }
    }
}

/// Start a node and serve it on a background task
pub async fn spawn(config: &Config) -> Result<RunningNode, LifecycleError> {
    let mut daemon = startup(config).await?;
    let addr = daemon.local_addr();
    let node = Arc::clone(daemon.node());
    let (stop, stopped) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        daemon
            .serve_until(async move {
                let _ = stopped.await;
            })
            .await;
        daemon.shutdown().await
    });

    Ok(RunningNode {
        addr,
        node,
        stop,
        task,
    })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

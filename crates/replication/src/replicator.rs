// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Point-to-point push replication: one unary call per follower per write

use crate::transport::{ReplicaClient, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Deadline for each follower call
pub const DEFAULT_REPLICATE_TIMEOUT: Duration = Duration::from_secs(2);

/// Named connections to every follower
#[derive(Clone, Default)]
pub struct FollowerPool {
    followers: Vec<(String, Arc<dyn ReplicaClient>)>,
}

impl FollowerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, client: Arc<dyn ReplicaClient>) {
        self.followers.push((name.into(), client));
    }

    pub fn len(&self) -> usize {
        self.followers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.followers.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.followers.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// A follower that did not acknowledge a pushed command
#[derive(Debug)]
pub struct ReplicationFailure {
    pub follower: String,
    pub error: TransportError,
}

/// Pushes each committed command to every follower in parallel
pub struct Replicator {
    pool: FollowerPool,
    timeout: Duration,
}

impl Replicator {
    pub fn new(pool: FollowerPool) -> Self {
        Self::with_timeout(pool, DEFAULT_REPLICATE_TIMEOUT)
    }

    pub fn with_timeout(pool: FollowerPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &FollowerPool {
        &self.pool
    }

    /// Send `payload` to every follower and wait for all of them, each
    /// bounded by the configured timeout.
    ///
    /// Failures are logged and returned; they never fail the write that
    /// produced the command.
    pub async fn replicate(&self, payload: &[u8]) -> Vec<ReplicationFailure> {
        let payload: Arc<[u8]> = Arc::from(payload);
        let timeout = self.timeout;
        let mut calls = JoinSet::new();

        for (name, client) in &self.pool.followers {
            let name = name.clone();
            let client = Arc::clone(client);
            let payload = Arc::clone(&payload);
            calls.spawn(async move {
                let result =
                    match tokio::time::timeout(timeout, client.replicate_command(&payload)).await {
                        Ok(result) => result,
                        Err(_) => Err(TransportError::Timeout(timeout)),
                    };
                (name, result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok((follower, Ok(()))) => debug!(%follower, "replicated"),
                Ok((follower, Err(error))) => {
                    warn!(%follower, error = %error, "replication to follower failed");
                    failures.push(ReplicationFailure { follower, error });
                }
                Err(e) => warn!(error = %e, "replication task failed"),
            }
        }
        failures
    }
}

#[cfg(test)]
#[path = "replicator_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader-side sequencing and fan-out of committed commands

use crate::recent_log::{CatchUp, RecentLog, DEFAULT_CAPACITY};
use crate::transport::Epoch;
use kvr_core::{ReplicatedCommand, Sequence};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Capacity of each follower's live delivery channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Identifies one registration of a follower.
///
/// A follower that reconnects gets a new id, so the old session's
/// cleanup cannot remove the new session's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

struct Registration {
    id: RegistrationId,
    sender: mpsc::Sender<ReplicatedCommand>,
}

struct Inner {
    sequence: Sequence,
    recent: RecentLog,
    followers: HashMap<String, Registration>,
    next_registration: u64,
    dropped: u64,
}

/// Wall-clock nanoseconds, bumped so two managers in one process differ
fn new_epoch() -> Epoch {
    static ISSUED: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    nanos.wrapping_add(ISSUED.fetch_add(1, Ordering::Relaxed)).max(1)
}

/// Owns the replication sequence counter, the recent log and the
/// registered follower channels.
///
/// Sequences restart at 1 with every manager, so each one carries a fresh
/// epoch that followers echo back when they reconnect.
pub struct StreamManager {
    epoch: Epoch,
    inner: Mutex<Inner>,
}

impl StreamManager {
    /// Manager retaining `capacity` commands for catch-up
    pub fn new(capacity: usize) -> Self {
        Self {
            epoch: new_epoch(),
            inner: Mutex::new(Inner {
                sequence: 0,
                recent: RecentLog::new(capacity),
                followers: HashMap::new(),
                next_registration: 0,
                dropped: 0,
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a delivery channel for `follower_id`, replacing any
    /// existing registration for the same id.
    pub fn register(
        &self,
        follower_id: &str,
        sender: mpsc::Sender<ReplicatedCommand>,
    ) -> RegistrationId {
        let mut inner = self.lock();
        inner.next_registration += 1;
        let id = RegistrationId(inner.next_registration);

        let replaced = inner
            .followers
            .insert(follower_id.to_string(), Registration { id, sender })
            .is_some();
        info!(
            follower_id,
            replaced,
            followers = inner.followers.len(),
            "follower registered"
        );
        id
    }

    /// Remove `follower_id` if it is still registered under `registration`.
    ///
    /// Dropping the sender closes the channel once it drains. Returns
    /// whether anything was removed.
    pub fn unregister(&self, follower_id: &str, registration: RegistrationId) -> bool {
        let mut inner = self.lock();
        let current = inner
            .followers
            .get(follower_id)
            .is_some_and(|r| r.id == registration);
        if !current {
            debug!(follower_id, "stale unregister ignored");
            return false;
        }

        inner.followers.remove(follower_id);
        info!(
            follower_id,
            followers = inner.followers.len(),
            "follower unregistered"
        );
        true
    }

    /// Register a fresh channel of `capacity` and return its receiving end,
    /// unregistered again when the subscription is dropped.
    pub fn subscribe(self: &Arc<Self>, follower_id: &str, capacity: usize) -> Subscription {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let registration = self.register(follower_id, sender);
        Subscription {
            manager: Arc::clone(self),
            follower_id: follower_id.to_string(),
            registration,
            receiver,
        }
    }

    /// Assign the next sequence to `payload`, retain it for catch-up, and
    /// offer it to every registered follower without blocking.
    ///
    /// A follower whose channel is full misses this command on its live
    /// feed and must recover it through catch-up on reconnect.
    pub fn broadcast(&self, payload: Vec<u8>) -> Sequence {
        let mut inner = self.lock();
        inner.sequence += 1;
        let sequence = inner.sequence;
        let command = ReplicatedCommand::new(sequence, payload);
        inner.recent.add(command.clone());

        // Sending under the lock keeps every channel in sequence order
        let mut dropped = 0u64;
        for (follower_id, registration) in &inner.followers {
            match registration.sender.try_send(command.clone()) {
                Ok(()) => debug!(%follower_id, sequence, "queued for follower"),
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    warn!(
                        %follower_id,
                        sequence,
                        "follower channel full, dropped from live feed"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%follower_id, sequence, "follower channel closed");
                }
            }
        }
        inner.dropped += dropped;

        sequence
    }

    /// Commands after `last` from the recent log
    pub fn missed_commands(&self, last: Sequence) -> CatchUp {
        self.lock().recent.get_since(last)
    }

    pub fn follower_count(&self) -> usize {
        self.lock().followers.len()
    }

    /// Sorted ids of the registered followers
    pub fn followers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().followers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Last sequence assigned, 0 before the first broadcast
    pub fn latest_sequence(&self) -> Sequence {
        self.lock().sequence
    }

    /// Oldest sequence still available for catch-up
    pub fn oldest_sequence(&self) -> Option<Sequence> {
        self.lock().recent.start_sequence()
    }

    /// Live deliveries dropped because a follower's channel was full
    pub fn dropped_deliveries(&self) -> u64 {
        self.lock().dropped
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// A follower's live feed. Unregisters from the manager on drop.
pub struct Subscription {
    manager: Arc<StreamManager>,
    follower_id: String,
    registration: RegistrationId,
    receiver: mpsc::Receiver<ReplicatedCommand>,
}

impl Subscription {
    /// Next live command; `None` once the registration is removed or replaced
    pub async fn recv(&mut self) -> Option<ReplicatedCommand> {
        self.receiver.recv().await
    }

    pub fn follower_id(&self) -> &str {
        &self.follower_id
    }

    pub fn registration(&self) -> RegistrationId {
        self.registration
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.manager.unregister(&self.follower_id, self.registration);
    }
}

#[cfg(test)]
#[path = "stream_manager_tests.rs"]
mod tests;

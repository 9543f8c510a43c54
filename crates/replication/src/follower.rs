// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Follower side: connect to the leader, apply its stream, reconnect forever

use crate::apply::apply_command;
use crate::sequence_file::{Position, SequenceFile};
use crate::transport::{
    CommandStream, Epoch, LeaderConnector, StreamEvent, StreamRequest, TransportError,
};
use kvr_core::{ReplicatedCommand, Sequence};
use kvr_storage::{Store, StoreError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Delay between a failed or ended stream and the next connect attempt
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Applied commands between sequence file writes
pub const DEFAULT_PERSIST_EVERY: u64 = 10;

#[derive(Debug, Clone)]
pub struct FollowerConfig {
    pub reconnect_backoff: Duration,
    pub persist_every: u64,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            persist_every: DEFAULT_PERSIST_EVERY,
        }
    }
}

/// Connection state of a follower
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    CatchingUp,
    Live,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::CatchingUp => "catching-up",
            LinkState::Live => "live",
        };
        f.write_str(name)
    }
}

/// Published follower progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: LinkState,
    pub last_applied: Sequence,
    /// The current session started with history the leader no longer had
    pub gap: bool,
}

/// Errors that end one follower session
#[derive(Debug, Error)]
pub enum FollowerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to apply sequence {sequence}: {source}")]
    Store {
        sequence: Sequence,
        #[source]
        source: StoreError,
    },
}

/// Replication client run by a follower node
pub struct StreamClient<C> {
    node_id: String,
    connector: C,
    store: Arc<Store>,
    config: FollowerConfig,
    sequence_file: Option<SequenceFile>,
    last_applied: Sequence,
    /// Epoch of the leader that assigned `last_applied`
    epoch: Option<Epoch>,
    persisted: Position,
    unpersisted: u64,
    status: watch::Sender<LinkStatus>,
}

impl<C: LeaderConnector> StreamClient<C> {
    pub fn new(
        node_id: impl Into<String>,
        connector: C,
        store: Arc<Store>,
        config: FollowerConfig,
    ) -> Self {
        let (status, _) = watch::channel(LinkStatus {
            state: LinkState::Disconnected,
            last_applied: 0,
            gap: false,
        });
        Self {
            node_id: node_id.into(),
            connector,
            store,
            config,
            sequence_file: None,
            last_applied: 0,
            epoch: None,
            persisted: Position::default(),
            unpersisted: 0,
            status,
        }
    }

    /// Resume from, and keep writing progress to, `file`
    pub fn with_sequence_file(mut self, file: SequenceFile) -> Self {
        let position = file.load();
        self.last_applied = position.sequence;
        self.epoch = position.epoch;
        self.persisted = position;
        self.sequence_file = Some(file);
        self.publish(|_| {});
        self
    }

    pub fn last_applied(&self) -> Sequence {
        self.last_applied
    }

    fn position(&self) -> Position {
        Position::new(self.last_applied, self.epoch)
    }

    /// Watch the link state and applied sequence
    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    /// Stream from the leader until `shutdown` resolves, reconnecting after
    /// every failure. Returns the last applied sequence.
    pub async fn run_until<F>(mut self, shutdown: F) -> Sequence
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            node_id = %self.node_id,
            last_applied = self.last_applied,
            "replication client started"
        );

        loop {
            let result = tokio::select! {
                _ = &mut shutdown => break,
                result = self.session() => result,
            };
            match result {
                Ok(()) => info!(node_id = %self.node_id, "leader ended replication stream"),
                Err(e) => warn!(
                    node_id = %self.node_id,
                    error = %e,
                    backoff = ?self.config.reconnect_backoff,
                    "replication stream failed"
                ),
            }
            self.persist();
            self.publish(|s| s.state = LinkState::Disconnected);

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.config.reconnect_backoff) => {}
            }
        }

        self.persist();
        self.publish(|s| s.state = LinkState::Disconnected);
        info!(
            node_id = %self.node_id,
            last_applied = self.last_applied,
            "replication client stopped"
        );
        self.last_applied
    }

    async fn session(&mut self) -> Result<(), FollowerError> {
        let request =
            StreamRequest::new(self.node_id.clone(), self.last_applied).with_epoch(self.epoch);
        let mut stream = self.connector.connect(&request).await?;
        self.publish(|s| {
            s.state = LinkState::CatchingUp;
            s.gap = false;
        });
        info!(
            node_id = %self.node_id,
            last_sequence = self.last_applied,
            "connected to leader"
        );

        while let Some(event) = stream.recv().await? {
            match event {
                StreamEvent::Started { epoch, from } => self.started(epoch, from),
                StreamEvent::CaughtUp { through, gap } => self.caught_up(through, gap),
                StreamEvent::Command(command) => self.apply(&command)?,
            }
        }
        Ok(())
    }

    /// Adopt the leader's epoch and the position it will stream from
    fn started(&mut self, epoch: Epoch, from: Sequence) {
        if self.epoch != Some(epoch) {
            info!(
                node_id = %self.node_id,
                epoch,
                previous = ?self.epoch,
                "following new leader epoch"
            );
        }
        if from != self.last_applied {
            warn!(
                node_id = %self.node_id,
                from,
                last_applied = self.last_applied,
                "leader sequence restarted, resuming from leader position"
            );
        }
        self.last_applied = from;
        self.epoch = Some(epoch);
        self.persist();
        self.publish(|_| {});
    }

    fn caught_up(&mut self, through: Sequence, gap: bool) {
        if through < self.last_applied {
            warn!(
                node_id = %self.node_id,
                through,
                last_applied = self.last_applied,
                "leader sequence restarted, resuming from leader position"
            );
            self.last_applied = through;
            self.persist();
        }
        if gap {
            warn!(
                node_id = %self.node_id,
                through,
                "catch-up incomplete, follower may be missing commands"
            );
        }
        self.publish(|s| {
            s.state = LinkState::Live;
            s.gap = gap;
        });
        info!(node_id = %self.node_id, through, "caught up, streaming live");
    }

    fn apply(&mut self, replicated: &ReplicatedCommand) -> Result<(), FollowerError> {
        let sequence = replicated.sequence;
        if sequence <= self.last_applied {
            debug!(sequence, "already applied, skipping");
            return Ok(());
        }

        let command = match replicated.command() {
            Ok(command) => command,
            Err(e) => {
                error!(sequence, error = %e, "undecodable replicated command");
                return Ok(());
            }
        };

        match apply_command(&self.store, &command) {
            Ok(outcome) => debug!(sequence, op = %command.operation, ?outcome, "applied"),
            Err(source) => return Err(FollowerError::Store { sequence, source }),
        }

        self.last_applied = sequence;
        self.unpersisted += 1;
        if self.unpersisted >= self.config.persist_every {
            self.persist();
        }
        self.publish(|_| {});
        Ok(())
    }

    fn persist(&mut self) {
        self.unpersisted = 0;
        let Some(file) = &self.sequence_file else {
            return;
        };
        let position = self.position();
        if self.persisted == position {
            return;
        }
        match file.store(position) {
            Ok(()) => self.persisted = position,
            Err(e) => error!(
                path = %file.path().display(),
                error = %e,
                "failed to save last applied sequence"
            ),
        }
    }

    fn publish(&self, update: impl FnOnce(&mut LinkStatus)) {
        let last_applied = self.last_applied;
        self.status.send_modify(|status| {
            update(status);
            status.last_applied = last_applied;
        });
    }
}

#[cfg(test)]
#[path = "follower_tests.rs"]
mod tests;

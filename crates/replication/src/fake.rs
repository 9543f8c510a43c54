// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory transports for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::leader::serve_follower;
use crate::stream_manager::StreamManager;
use crate::transport::{
    CommandSink, CommandStream, Epoch, LeaderConnector, ReplicaClient, StreamEvent,
    StreamRequest, TransportError,
};
use async_trait::async_trait;
use kvr_core::{ReplicatedCommand, Sequence};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Sink that forwards stream events into a channel
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self { tx }
    }

    /// A sink and a stream reading what it sends
    pub fn pair() -> (Self, FakeStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), FakeStream::new(rx))
    }

    fn send(&self, event: StreamEvent) -> Result<(), TransportError> {
        self.tx.send(event).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl CommandSink for ChannelSink {
    async fn send_started(&mut self, epoch: Epoch, from: Sequence) -> Result<(), TransportError> {
        self.send(StreamEvent::Started { epoch, from })
    }

    async fn send_command(&mut self, command: &ReplicatedCommand) -> Result<(), TransportError> {
        self.send(StreamEvent::Command(command.clone()))
    }

    async fn send_caught_up(
        &mut self,
        through: Sequence,
        gap: bool,
    ) -> Result<(), TransportError> {
        self.send(StreamEvent::CaughtUp { through, gap })
    }

    async fn closed(&mut self) {
        self.tx.closed().await
    }
}

/// Follower end of an in-memory stream
pub struct FakeStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl FakeStream {
    pub fn new(rx: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
        Self { rx }
    }

    /// A stream that yields `events` and then ends
    pub fn scripted(events: Vec<StreamEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in events {
            let _ = tx.send(event);
        }
        Self::new(rx)
    }
}

#[async_trait]
impl CommandStream for FakeStream {
    async fn recv(&mut self) -> Result<Option<StreamEvent>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

enum Script {
    Refuse,
    Events(Vec<StreamEvent>),
}

#[derive(Default)]
struct ConnectorState {
    requests: Vec<StreamRequest>,
    scripts: VecDeque<Script>,
    sessions: Vec<AbortHandle>,
}

/// Fake leader connector.
///
/// Scripted connection outcomes are consumed first. After that, a
/// connector built with [`FakeConnector::loopback`] serves the stream
/// from an in-process stream manager; otherwise connects are refused.
#[derive(Clone)]
pub struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
    leader: Option<(Arc<StreamManager>, usize)>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            leader: None,
        }
    }

    /// Connector whose streams are served by `manager`
    pub fn loopback(manager: Arc<StreamManager>, channel_capacity: usize) -> Self {
        Self {
            state: Arc::default(),
            leader: Some((manager, channel_capacity)),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Refuse the next `count` connection attempts
    pub fn refuse(&self, count: usize) {
        let mut state = self.state();
        for _ in 0..count {
            state.scripts.push_back(Script::Refuse);
        }
    }

    /// Serve the next connection with `events`, then end the stream
    pub fn push_stream(&self, events: Vec<StreamEvent>) {
        self.state().scripts.push_back(Script::Events(events));
    }

    /// Every stream request seen so far
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.state().requests.clone()
    }

    /// End every loopback session, as if the leader dropped the connections
    pub fn drop_sessions(&self) {
        for handle in self.state().sessions.drain(..) {
            handle.abort();
        }
    }
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaderConnector for FakeConnector {
    type Stream = FakeStream;

    async fn connect(&self, request: &StreamRequest) -> Result<FakeStream, TransportError> {
        let mut state = self.state();
        state.requests.push(request.clone());

        match state.scripts.pop_front() {
            Some(Script::Refuse) => {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into())
            }
            Some(Script::Events(events)) => return Ok(FakeStream::scripted(events)),
            None => {}
        }

        let Some((manager, capacity)) = self.leader.clone() else {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "no leader").into());
        };

        let (mut sink, stream) = ChannelSink::pair();
        let request = request.clone();
        let session = tokio::spawn(async move {
            let _ = serve_follower(&manager, &request, &mut sink, capacity).await;
        });
        state.sessions.push(session.abort_handle());
        Ok(stream)
    }
}

/// How a [`FakeReplicaClient`] answers
#[derive(Debug, Clone)]
pub enum ReplicaBehavior {
    Accept,
    Reject(String),
    /// Never answer
    Hang,
}

/// Fake legacy replica recording every pushed payload
#[derive(Clone)]
pub struct FakeReplicaClient {
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
    behavior: Arc<Mutex<ReplicaBehavior>>,
}

impl FakeReplicaClient {
    pub fn new(behavior: ReplicaBehavior) -> Self {
        Self {
            payloads: Arc::default(),
            behavior: Arc::new(Mutex::new(behavior)),
        }
    }

    pub fn accepting() -> Self {
        Self::new(ReplicaBehavior::Accept)
    }

    pub fn set_behavior(&self, behavior: ReplicaBehavior) {
        *self.behavior.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    /// Payloads received so far, in arrival order
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ReplicaClient for FakeReplicaClient {
    async fn replicate_command(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.payloads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload.to_vec());

        let behavior = self
            .behavior
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match behavior {
            ReplicaBehavior::Accept => Ok(()),
            ReplicaBehavior::Reject(reason) => Err(TransportError::Rejected(reason)),
            ReplicaBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportError::Closed)
            }
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;

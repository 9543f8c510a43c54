// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP implementations of the replication transports

use async_trait::async_trait;
use kvr_core::{ReplicatedCommand, Sequence};
use kvr_replication::{
    CommandSink, CommandStream, Epoch, LeaderConnector, ReplicaClient, StreamEvent,
    StreamRequest, TransportError,
};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol::{self, ProtocolError, Request, Response, DEFAULT_TIMEOUT};

/// Send one request to `addr` and wait for its response
pub async fn request(
    addr: &str,
    request: &Request,
    timeout: Duration,
) -> Result<Response, ProtocolError> {
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ProtocolError::Timeout)??;

    let data = protocol::encode(request)?;
    tokio::time::timeout(timeout, protocol::write_message(&mut stream, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)??;

    let bytes = tokio::time::timeout(timeout, protocol::read_message(&mut stream))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    protocol::decode(&bytes)
}

fn transport_error(error: ProtocolError, timeout: Duration) -> TransportError {
    match error {
        ProtocolError::Io(e) => TransportError::Io(e),
        ProtocolError::ConnectionClosed => TransportError::Closed,
        ProtocolError::Timeout => TransportError::Timeout(timeout),
        other => TransportError::Protocol(other.to_string()),
    }
}

/// Leader end of a follower stream over TCP.
///
/// Writes have no timeout: a slow follower only backs up its own channel.
/// The read half is kept to notice the follower hanging up.
pub struct TcpSink {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl TcpSink {
    pub fn new(reader: OwnedReadHalf, writer: OwnedWriteHalf) -> Self {
        Self { reader, writer }
    }

    async fn send(&mut self, response: &Response) -> Result<(), TransportError> {
        let data =
            protocol::encode(response).map_err(|e| TransportError::Protocol(e.to_string()))?;
        protocol::write_message(&mut self.writer, &data)
            .await
            .map_err(|e| transport_error(e, DEFAULT_TIMEOUT))
    }
}

#[async_trait]
impl CommandSink for TcpSink {
    async fn send_started(&mut self, epoch: Epoch, from: Sequence) -> Result<(), TransportError> {
        self.send(&Response::Started { epoch, from }).await
    }

    async fn send_command(&mut self, command: &ReplicatedCommand) -> Result<(), TransportError> {
        self.send(&Response::Command {
            sequence: command.sequence,
            command: command.payload.clone(),
        })
        .await
    }

    async fn send_caught_up(
        &mut self,
        through: Sequence,
        gap: bool,
    ) -> Result<(), TransportError> {
        self.send(&Response::CaughtUp { through, gap }).await
    }

    async fn closed(&mut self) {
        // Followers send nothing after the request; EOF or an error is a hangup
        let mut buf = [0u8; 64];
        loop {
            match self.reader.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    }
}

/// Follower end of a stream over TCP.
///
/// Reads have no timeout: a quiet leader is not a failed one.
pub struct TcpCommandStream {
    stream: TcpStream,
}

#[async_trait]
impl CommandStream for TcpCommandStream {
    async fn recv(&mut self) -> Result<Option<StreamEvent>, TransportError> {
        let bytes = match protocol::read_message(&mut self.stream).await {
            Ok(bytes) => bytes,
            Err(ProtocolError::ConnectionClosed) => return Ok(None),
            Err(e) => return Err(transport_error(e, DEFAULT_TIMEOUT)),
        };
        let response: Response =
            protocol::decode(&bytes).map_err(|e| TransportError::Protocol(e.to_string()))?;

        match response {
            Response::Started { epoch, from } => Ok(Some(StreamEvent::Started { epoch, from })),
            Response::Command { sequence, command } => Ok(Some(StreamEvent::Command(
                ReplicatedCommand::new(sequence, command),
            ))),
            Response::CaughtUp { through, gap } => Ok(Some(StreamEvent::CaughtUp { through, gap })),
            Response::NotLeader { leader } => Err(TransportError::Rejected(match leader {
                Some(leader) => format!("not the leader, try {leader}"),
                None => "not the leader".to_string(),
            })),
            Response::Error { message } => Err(TransportError::Rejected(message)),
            other => Err(TransportError::Protocol(format!(
                "unexpected response on stream: {other:?}"
            ))),
        }
    }
}

/// Opens replication streams to a leader over TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    leader_addr: String,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(leader_addr: impl Into<String>) -> Self {
        Self {
            leader_addr: leader_addr.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn leader_addr(&self) -> &str {
        &self.leader_addr
    }
}

#[async_trait]
impl LeaderConnector for TcpConnector {
    type Stream = TcpCommandStream;

    async fn connect(&self, request: &StreamRequest) -> Result<TcpCommandStream, TransportError> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.leader_addr))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;
        stream.set_nodelay(true)?;

        let data = protocol::encode(&Request::StreamReplication {
            follower_id: request.follower_id.clone(),
            last_sequence: request.last_sequence,
            epoch: request.epoch,
        })
        .map_err(|e| TransportError::Protocol(e.to_string()))?;
        tokio::time::timeout(self.timeout, protocol::write_message(&mut stream, &data))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(|e| transport_error(e, self.timeout))?;

        debug!(
            leader = %self.leader_addr,
            last_sequence = request.last_sequence,
            epoch = ?request.epoch,
            "opened replication stream"
        );
        Ok(TcpCommandStream { stream })
    }
}

/// Pushes commands to one follower with `ReplicateCommand`
#[derive(Debug, Clone)]
pub struct TcpReplicaClient {
    addr: String,
}

impl TcpReplicaClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl ReplicaClient for TcpReplicaClient {
    async fn replicate_command(&self, payload: &[u8]) -> Result<(), TransportError> {
        let response = request(
            &self.addr,
            &Request::ReplicateCommand {
                command: payload.to_vec(),
            },
            DEFAULT_TIMEOUT,
        )
        .await
        .map_err(|e| transport_error(e, DEFAULT_TIMEOUT))?;

        match response {
            Response::Replicated { success: true, .. } => Ok(()),
            Response::Replicated {
                success: false,
                error,
            } => Err(TransportError::Rejected(
                error.unwrap_or_else(|| "replication failed".to_string()),
            )),
            Response::Error { message } => Err(TransportError::Rejected(message)),
            other => Err(TransportError::Protocol(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

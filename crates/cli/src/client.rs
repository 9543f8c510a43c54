// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node client for CLI commands

use std::time::Duration;

use kvr_daemon::protocol::{self, ProtocolError};
use kvr_daemon::{NodeStatus, Request, Response};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

// Timeout configuration (env vars in milliseconds)
fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for each request (write and read separately)
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("KVR_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for establishing the TCP connection
pub fn timeout_connect() -> Duration {
    parse_duration_ms("KVR_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(5))
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("not the leader")]
    NotLeader { leader: Option<String> },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unexpected response from node")]
    UnexpectedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for one node; opens a connection per request
#[derive(Debug, Clone)]
pub struct NodeClient {
    addr: String,
}

impl NodeClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send a request and receive a response with specific timeouts
    async fn send_with_timeout(
        &self,
        request: Request,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Response, ClientError> {
        debug!(addr = %self.addr, request = request.kind(), "sending request");
        let stream = tokio::time::timeout(timeout_connect(), TcpStream::connect(&self.addr))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        let (mut reader, mut writer) = stream.into_split();

        let data = protocol::encode(&request)?;
        tokio::time::timeout(write_timeout, protocol::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let response_bytes =
            tokio::time::timeout(read_timeout, protocol::read_message(&mut reader))
                .await
                .map_err(|_| ProtocolError::Timeout)??;

        let response: Response = protocol::decode(&response_bytes)?;
        Ok(response)
    }

    /// Send a request and receive a response
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        self.send_with_timeout(request, timeout_ipc(), timeout_ipc())
            .await
    }

    pub async fn get(&self, key: &str) -> Result<String, ClientError> {
        match self.send(Request::Get { key: key.to_string() }).await? {
            Response::Value { value } => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        match self
            .send(Request::Set {
                key: key.to_string(),
                value: value.to_string(),
            })
            .await?
        {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), ClientError> {
        match self.send(Request::Delete { key: key.to_string() }).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn keys(&self) -> Result<Vec<String>, ClientError> {
        match self.send(Request::Keys).await? {
            Response::Keys { keys } => Ok(keys),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&self) -> Result<NodeStatus, ClientError> {
        match self.send(Request::Status).await? {
            Response::Status { status } => Ok(status),
            other => Err(unexpected(other)),
        }
    }
}

/// Map a response the caller did not ask for into an error
fn unexpected(response: Response) -> ClientError {
    match response {
        Response::NotFound { key } => ClientError::NotFound(key),
        Response::NotLeader { leader } => ClientError::NotLeader { leader },
        Response::Error { message } => ClientError::Rejected(message),
        _ => ClientError::UnexpectedResponse,
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP connection handling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kvr_replication::{apply_payload, serve_follower, StreamRequest};
use kvr_storage::StoreError;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, error, warn};

use crate::node::Node;
use crate::protocol::{self, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};
use crate::transport::TcpSink;

/// Handle a single client connection.
///
/// A connection carries one request. `StreamReplication` keeps the
/// connection open as the follower's feed until either side goes away.
pub async fn handle_connection(node: Arc<Node>, stream: TcpStream) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("Request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!(error = %e, "Failed to read request");
            return Err(ServerError::Protocol(e));
        }
    };

    if let Request::StreamReplication {
        follower_id,
        last_sequence,
        epoch,
    } = request
    {
        let request = StreamRequest::new(follower_id, last_sequence).with_epoch(epoch);
        return stream_to_follower(&node, request, reader, writer).await;
    }

    let started = Instant::now();
    let kind = request.kind();
    let response = handle_request(&node, request).await;
    log_request(kind, &response, started.elapsed());

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT)
        .await
        .map_err(ServerError::Protocol)?;

    Ok(())
}

/// Handle a single unary request and return its response
pub async fn handle_request(node: &Node, request: Request) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version: _ } => Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        },

        Request::Get { key } => match node.store().get(&key) {
            Ok(value) => Response::Value { value },
            Err(StoreError::KeyNotFound(_)) => Response::NotFound { key },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },

        Request::Set { key, value } => {
            if !node.is_leader() {
                return not_leader(node);
            }
            match node.store().set(&key, &value).await {
                Ok(_) => Response::Ok,
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            }
        }

        Request::Delete { key } => {
            if !node.is_leader() {
                return not_leader(node);
            }
            match node.store().delete(&key).await {
                Ok(_) => Response::Ok,
                Err(StoreError::KeyNotFound(_)) => Response::NotFound { key },
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            }
        }

        Request::Keys => Response::Keys {
            keys: node.store().keys().into_iter().collect(),
        },

        Request::Status => Response::Status {
            status: node.status(),
        },

        Request::ReplicateCommand { command } => {
            if node.is_leader() {
                return Response::Replicated {
                    success: false,
                    error: Some("leader does not accept replicated commands".to_string()),
                };
            }
            match apply_payload(node.store().store(), &command) {
                Ok(outcome) => {
                    debug!(?outcome, "applied pushed command");
                    Response::Replicated {
                        success: true,
                        error: None,
                    }
                }
                Err(e) => Response::Replicated {
                    success: false,
                    error: Some(e.to_string()),
                },
            }
        }

        Request::StreamReplication { .. } => Response::Error {
            message: "stream replication needs its own connection".to_string(),
        },
    }
}

async fn stream_to_follower(
    node: &Node,
    request: StreamRequest,
    reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
) -> Result<(), ServerError> {
    let manager = match node.store().stream() {
        Some(manager) if node.is_leader() => Arc::clone(manager),
        _ => {
            let response = if node.is_leader() {
                Response::Error {
                    message: "this leader replicates by push, not by stream".to_string(),
                }
            } else {
                not_leader(node)
            };
            warn!(follower = %request.follower_id, "refused replication stream");
            protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await?;
            return Ok(());
        }
    };

    let mut sink = TcpSink::new(reader, writer);
    // Failures are logged by the session itself
    if let Ok(summary) =
        serve_follower(&manager, &request, &mut sink, node.channel_capacity()).await
    {
        debug!(?summary, "replication stream closed");
    }
    Ok(())
}

fn not_leader(node: &Node) -> Response {
    Response::NotLeader {
        leader: node.leader_addr().map(str::to_string),
    }
}

fn log_request(kind: &'static str, response: &Response, elapsed: Duration) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match response {
        Response::Error { message } => {
            warn!(request = kind, elapsed_ms, error = %message, "request failed")
        }
        _ => debug!(request = kind, elapsed_ms, "handled request"),
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;

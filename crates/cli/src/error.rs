// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors as the user sees them: what failed, what the node said about
//! it, and what to try next.

use std::fmt;

use kvr_daemon::ProtocolError;

use crate::client::ClientError;

/// A failed command, rendered for a terminal
#[derive(Debug)]
pub struct KvrError {
    pub message: String,
    /// Lines printed under the message with `->`
    pub context: Vec<String>,
    /// Numbered follow-ups
    pub suggestions: Vec<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl KvrError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
            source: None,
        }
    }

    pub fn with_context(mut self, line: impl Into<String>) -> Self {
        self.context.push(line.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Explain a failed request to the node at `addr`
    pub fn from_client(error: ClientError, addr: &str) -> Self {
        match error {
            ClientError::NotFound(key) => KvrError::new(format!("key '{}' not found", key)),

            ClientError::NotLeader { leader } => {
                let err = KvrError::new(format!("{} is not the leader", addr))
                    .with_context("Followers serve reads only; writes go to the leader");
                match leader {
                    Some(leader) => err.with_suggestion(format!(
                        "Retry against the leader: kvr --addr {} ...",
                        leader
                    )),
                    None => err.with_suggestion("Retry against the leader node"),
                }
            }

            ClientError::Io(e) => KvrError::new(format!("cannot reach node at {}", addr))
                .with_context(e.to_string())
                .with_suggestion(format!("Check that kvrd is running and listening on {}", addr))
                .with_suggestion("Point at another node with --addr"),

            ClientError::Protocol(ProtocolError::Timeout) => {
                KvrError::new(format!("request to {} timed out", addr))
                    .with_context("The node accepted the connection but did not answer in time")
                    .with_suggestion("Raise the timeout with KVR_TIMEOUT_IPC_MS")
            }

            other => KvrError::new(other.to_string()).with_source(other),
        }
    }
}

impl fmt::Display for KvrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            for ctx in &self.context {
                writeln!(f, "  -> {}", ctx)?;
            }
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            writeln!(f, "suggestions:")?;
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for KvrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

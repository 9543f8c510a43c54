// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive console

use std::io::Write;

use kvr_daemon::NodeStatus;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::client::{ClientError, NodeClient};
use crate::error::KvrError;

pub const HELP: &str = "\
commands:
  get <key>          print the value of <key>
  set <key> <value>  set <key>; the value is the rest of the line
  del <key>          delete <key>
  keys               list keys
  status             show node status
  help               show this help
  exit               leave the console";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Empty,
    Get(String),
    Set(String, String),
    Del(String),
    Keys,
    Status,
    Help,
    Exit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub fn parse_line(input: &str) -> Result<Line, ParseError> {
    let input = input.trim();
    let (command, rest) = match input.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim_start()),
        None => (input, ""),
    };
    let mut args = rest.split_whitespace();

    match command {
        "" => Ok(Line::Empty),
        "get" => match (args.next(), args.next()) {
            (Some(key), None) => Ok(Line::Get(key.to_string())),
            _ => Err(ParseError::Usage("get <key>")),
        },
        "set" => match rest.split_once(char::is_whitespace) {
            Some((key, value)) if !value.trim().is_empty() => {
                Ok(Line::Set(key.to_string(), value.trim().to_string()))
            }
            _ => Err(ParseError::Usage("set <key> <value>")),
        },
        "del" => match (args.next(), args.next()) {
            (Some(key), None) => Ok(Line::Del(key.to_string())),
            _ => Err(ParseError::Usage("del <key>")),
        },
        "keys" => Ok(Line::Keys),
        "status" => Ok(Line::Status),
        "help" => Ok(Line::Help),
        "exit" | "quit" => Ok(Line::Exit),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

/// Human-readable status block
pub fn format_status(status: &NodeStatus) -> String {
    let mut lines = vec![
        format!("Node: {}", status.node_id),
        format!("Role: {}", status.role),
        format!("Mode: {}", status.mode),
        format!("Uptime: {}s", status.uptime_secs),
        format!("Keys: {}", status.keys),
        format!("WAL: {} bytes", status.wal_bytes),
    ];
    if let Some(sequence) = status.sequence {
        lines.push(format!("Sequence: {}", sequence));
    }
    if status.role == "leader" {
        let followers = if status.followers.is_empty() {
            "(none)".to_string()
        } else {
            status.followers.join(", ")
        };
        lines.push(format!("Followers: {}", followers));
    }
    if status.dropped_deliveries > 0 {
        lines.push(format!("Dropped deliveries: {}", status.dropped_deliveries));
    }
    if let Some(link) = &status.link {
        lines.push(format!("Link: {}", link));
    }
    if let Some(last_applied) = status.last_applied {
        lines.push(format!("Last applied: {}", last_applied));
    }
    lines.join("\n")
}

/// Run one parsed line; `Ok(false)` means leave the console
pub async fn execute<W: Write>(
    client: &NodeClient,
    line: Line,
    out: &mut W,
) -> Result<bool, ClientError> {
    match line {
        Line::Empty => {}
        Line::Get(key) => match client.get(&key).await {
            Ok(value) => writeln!(out, "{}", value)?,
            Err(ClientError::NotFound(_)) => writeln!(out, "(not found)")?,
            Err(e) => return Err(e),
        },
        Line::Set(key, value) => {
            client.set(&key, &value).await?;
            writeln!(out, "OK")?;
        }
        Line::Del(key) => match client.delete(&key).await {
            Ok(()) => writeln!(out, "OK")?,
            Err(ClientError::NotFound(_)) => writeln!(out, "(not found)")?,
            Err(e) => return Err(e),
        },
        Line::Keys => {
            let keys = client.keys().await?;
            if keys.is_empty() {
                writeln!(out, "(empty)")?;
            }
            for key in keys {
                writeln!(out, "{}", key)?;
            }
        }
        Line::Status => writeln!(out, "{}", format_status(&client.status().await?))?,
        Line::Help => writeln!(out, "{}", HELP)?,
        Line::Exit => return Ok(false),
    }
    Ok(true)
}

/// Read commands from `input` until `exit` or end of input.
///
/// Request failures are reported and the console keeps going.
pub async fn run<R, W>(client: &NodeClient, input: R, out: &mut W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(out, "kvr> ")?;
        out.flush()?;

        let Some(raw) = lines.next_line().await? else {
            writeln!(out)?;
            return Ok(());
        };
        let line = match parse_line(&raw) {
            Ok(line) => line,
            Err(e) => {
                writeln!(out, "{}", e)?;
                continue;
            }
        };
        match execute(client, line, out).await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => write!(out, "{}", KvrError::from_client(e, client.addr()))?,
        }
    }
}

#[cfg(test)]
#[path = "console_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node configuration: command-line flags layered over an optional TOML file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use kvr_replication::{
    DEFAULT_CAPACITY, DEFAULT_CHANNEL_CAPACITY, DEFAULT_PERSIST_EVERY, DEFAULT_RECONNECT_BACKOFF,
    DEFAULT_REPLICATE_TIMEOUT,
};
use serde::Deserialize;
use thiserror::Error;

/// Default client port
pub const DEFAULT_PORT: u16 = 50051;

/// Default bind address
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// How a leader replicates to its followers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMode {
    /// Followers hold a stream open and catch up from the leader's recent log
    #[default]
    Stream,
    /// The leader pushes each write to every follower
    Push,
}

impl fmt::Display for ReplicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationMode::Stream => f.write_str("stream"),
            ReplicationMode::Push => f.write_str("push"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Leader => f.write_str("leader"),
            Role::Follower => f.write_str("follower"),
        }
    }
}

/// Command-line flags for `kvrd`
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "kvrd", version, about = "Replicated key-value store node")]
pub struct Args {
    /// Unique node id; names the WAL, sequence and lock files
    #[arg(long)]
    pub node_id: Option<String>,

    /// Run as the leader (accepts writes)
    #[arg(long)]
    pub leader: bool,

    /// Port to listen on for clients and replication
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    pub bind: Option<String>,

    /// Leader address (host:port) a follower streams from
    #[arg(long)]
    pub leader_addr: Option<String>,

    /// Follower addresses for push replication, comma separated
    #[arg(long, value_delimiter = ',')]
    pub followers: Vec<String>,

    /// Replication mode
    #[arg(long, value_enum)]
    pub mode: Option<ReplicationMode>,

    /// Directory for the WAL, sequence and lock files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// TOML config file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Settings read from a TOML config file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub node_id: Option<String>,
    pub leader: Option<bool>,
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub leader_addr: Option<String>,
    pub followers: Option<Vec<String>>,
    pub mode: Option<ReplicationMode>,
    pub data_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    #[serde(with = "humantime_serde", default)]
    pub reconnect_backoff: Option<Duration>,
    pub persist_every: Option<u64>,
    pub recent_log_capacity: Option<usize>,
    pub channel_capacity: Option<usize>,
    #[serde(with = "humantime_serde", default)]
    pub replicate_timeout: Option<Duration>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("--node-id is required")]
    MissingNodeId,

    #[error("invalid node id {0:?}: use letters, digits, '-' and '_'")]
    InvalidNodeId(String),

    #[error("a stream follower needs --leader-addr")]
    MissingLeaderAddr,
}

/// Resolved node configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub node_id: String,
    pub role: Role,
    pub bind: String,
    /// 0 picks a free port
    pub port: u16,
    pub leader_addr: Option<String>,
    pub followers: Vec<String>,
    pub mode: ReplicationMode,
    pub data_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub reconnect_backoff: Duration,
    pub persist_every: u64,
    pub recent_log_capacity: usize,
    pub channel_capacity: usize,
    pub replicate_timeout: Duration,
}

impl Config {
    /// Configuration with defaults for everything but identity
    pub fn new(node_id: impl Into<String>, role: Role, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            node_id: node_id.into(),
            role,
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            leader_addr: None,
            followers: Vec::new(),
            mode: ReplicationMode::default(),
            data_dir: data_dir.into(),
            log_file: None,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            persist_every: DEFAULT_PERSIST_EVERY,
            recent_log_capacity: DEFAULT_CAPACITY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            replicate_timeout: DEFAULT_REPLICATE_TIMEOUT,
        }
    }

    /// Resolve flags, reading `--config` first if given
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::layered(file, args)
    }

    /// Layer `args` over `file` over defaults
    pub fn layered(file: FileConfig, args: &Args) -> Result<Self, ConfigError> {
        let node_id = args
            .node_id
            .clone()
            .or(file.node_id)
            .ok_or(ConfigError::MissingNodeId)?;
        let role = if args.leader || file.leader.unwrap_or(false) {
            Role::Leader
        } else {
            Role::Follower
        };
        let data_dir = args
            .data_dir
            .clone()
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = Self::new(node_id, role, data_dir);
        if let Some(bind) = args.bind.clone().or(file.bind) {
            config.bind = bind;
        }
        if let Some(port) = args.port.or(file.port) {
            config.port = port;
        }
        config.leader_addr = args.leader_addr.clone().or(file.leader_addr);
        config.followers = if args.followers.is_empty() {
            file.followers.unwrap_or_default()
        } else {
            args.followers.clone()
        };
        if let Some(mode) = args.mode.or(file.mode) {
            config.mode = mode;
        }
        config.log_file = args.log_file.clone().or(file.log_file);
        if let Some(backoff) = file.reconnect_backoff {
            config.reconnect_backoff = backoff;
        }
        if let Some(every) = file.persist_every {
            config.persist_every = every.max(1);
        }
        if let Some(capacity) = file.recent_log_capacity {
            config.recent_log_capacity = capacity.max(1);
        }
        if let Some(capacity) = file.channel_capacity {
            config.channel_capacity = capacity.max(1);
        }
        if let Some(timeout) = file.replicate_timeout {
            config.replicate_timeout = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid = !self.node_id.is_empty()
            && self
                .node_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ConfigError::InvalidNodeId(self.node_id.clone()));
        }
        if self.role == Role::Follower
            && self.mode == ReplicationMode::Stream
            && self.leader_addr.is_none()
        {
            return Err(ConfigError::MissingLeaderAddr);
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(format!("wal-{}.log", self.node_id))
    }

    pub fn sequence_path(&self) -> PathBuf {
        self.data_dir.join(format!(".{}.seq", self.node_id))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.lock", self.node_id))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

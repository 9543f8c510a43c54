// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Follower's last-applied position persisted as plain text:
//! `<sequence> <epoch>`, or a bare `<sequence>` before any leader epoch
//! is known

use crate::transport::Epoch;
use kvr_core::Sequence;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Last applied sequence and the leader epoch that assigned it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub sequence: Sequence,
    pub epoch: Option<Epoch>,
}

impl Position {
    pub fn new(sequence: Sequence, epoch: Option<Epoch>) -> Self {
        Self { sequence, epoch }
    }

    fn parse(content: &str) -> Option<Self> {
        let mut fields = content.split_whitespace();
        let sequence = fields.next()?.parse::<Sequence>().ok().filter(|s| *s >= 0)?;
        let epoch = match fields.next() {
            Some(epoch) => Some(epoch.parse::<Epoch>().ok()?),
            None => None,
        };
        if fields.next().is_some() {
            return None;
        }
        Some(Self { sequence, epoch })
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.epoch {
            Some(epoch) => write!(f, "{} {}", self.sequence, epoch),
            None => write!(f, "{}", self.sequence),
        }
    }
}

/// Plain-text file holding one [`Position`]
#[derive(Debug, Clone)]
pub struct SequenceFile {
    path: PathBuf,
}

impl SequenceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/.<node_id>.seq`
    pub fn for_node(dir: &Path, node_id: &str) -> Self {
        Self::new(dir.join(format!(".{node_id}.seq")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored position; sequence 0 with no epoch when the file is missing
    /// or unreadable
    pub fn load(&self) -> Position {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no sequence file, starting from 0");
                return Position::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read sequence file");
                return Position::default();
            }
        };

        match Position::parse(&content) {
            Some(position) => {
                info!(
                    path = %self.path.display(),
                    sequence = position.sequence,
                    epoch = ?position.epoch,
                    "loaded last applied sequence"
                );
                position
            }
            None => {
                warn!(
                    path = %self.path.display(),
                    content = content.trim(),
                    "invalid sequence file, starting from 0"
                );
                Position::default()
            }
        }
    }

    /// Replace the stored position.
    ///
    /// Written to a sibling temp file then renamed over the target, so a
    /// crash leaves either the old or the new value.
    pub fn store(&self, position: Position) -> io::Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, format!("{position}\n"))?;
        fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
#[path = "sequence_file_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded history of recently broadcast commands used for follower catch-up

use kvr_core::{ReplicatedCommand, Sequence};
use std::collections::VecDeque;

/// Commands retained for catch-up when no capacity is configured
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Result of asking the recent log for everything after a sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchUp {
    /// Every retained command after the requested sequence, in order
    Ready(Vec<ReplicatedCommand>),
    /// The requested history is no longer in memory
    Evicted { oldest: Sequence },
}

impl CatchUp {
    pub fn is_ready(&self) -> bool {
        matches!(self, CatchUp::Ready(_))
    }
}

/// Fixed-capacity ring of commands, contiguous by sequence number.
///
/// Commands must be added in increasing sequence order with no gaps;
/// the stream manager is the only writer.
#[derive(Debug)]
pub struct RecentLog {
    entries: VecDeque<ReplicatedCommand>,
    capacity: usize,
}

impl RecentLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
        }
    }

    /// Append a command, evicting the oldest once over capacity
    pub fn add(&mut self, command: ReplicatedCommand) {
        self.entries.push_back(command);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Commands with a sequence strictly greater than `last`.
    ///
    /// `last == 0` returns the whole buffer. Any other request that
    /// would need a command older than the oldest retained one is
    /// [`CatchUp::Evicted`].
    pub fn get_since(&self, last: Sequence) -> CatchUp {
        if last == 0 {
            return CatchUp::Ready(self.entries.iter().cloned().collect());
        }

        let Some(oldest) = self.start_sequence() else {
            return CatchUp::Ready(Vec::new());
        };
        if last < oldest - 1 {
            return CatchUp::Evicted { oldest };
        }

        // Contiguous sequences let us index straight to the first missed command
        let skip = usize::try_from(last - oldest + 1).unwrap_or(usize::MAX);
        CatchUp::Ready(self.entries.iter().skip(skip).cloned().collect())
    }

    /// Sequence of the newest entry, 0 if empty
    pub fn latest_sequence(&self) -> Sequence {
        self.entries.back().map(|c| c.sequence).unwrap_or(0)
    }

    /// Sequence of the oldest retained entry
    pub fn start_sequence(&self) -> Option<Sequence> {
        self.entries.front().map(|c| c.sequence)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecentLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "recent_log_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kvr-core: shared types for the replicated key-value store
//!
//! This crate provides:
//! - The `Command` record persisted to the WAL and carried over the wire
//! - The sequence-numbered `ReplicatedCommand` used by the replication stream
//! - The binary codec shared by storage and replication

pub mod command;

pub use command::{CodecError, Command, Operation, ReplicatedCommand, Sequence};

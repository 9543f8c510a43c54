// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable storage: the write-ahead log and the key index built on top of it

mod store;
mod wal;

pub use store::{Store, StoreError};
pub use wal::{Wal, WalEntry, WalError};

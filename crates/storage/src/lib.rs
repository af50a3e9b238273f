// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fg-storage: job store, durable queue, and log buffer.
//!
//! Everything here is process-local. The queue's journal gives it the
//! one durability property the engine relies on: unacked messages are
//! redelivered after a restart (at-least-once). Job rows live in
//! memory; recovery of in-flight jobs beyond queue redelivery is a
//! non-goal.

mod error;
mod journal;
mod logbuf;
mod queue;
mod store;

pub use error::{QueueError, StoreError};
pub use journal::JournaledQueue;
pub use logbuf::LogBuffer;
pub use queue::{MemoryQueue, Queue, DEFAULT_MAX_ATTEMPTS, DEFAULT_VISIBILITY_MS};
pub use store::{JobStore, MemoryJobStore};

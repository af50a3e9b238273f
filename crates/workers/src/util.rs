// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for worker implementations.

use fg_core::{CapabilityError, WorkerError};

/// Map storage/connector errors onto the dispatcher's retry classes:
/// unavailable backends are permanent, I/O blips are retryable.
pub(crate) fn capability_error(err: CapabilityError) -> WorkerError {
    match err {
        CapabilityError::Unavailable(msg) => WorkerError::PermanentIo(msg),
        CapabilityError::Io(msg) => WorkerError::TransientIo(msg),
    }
}

/// Map engine-side errors from inside a worker onto a retryable class.
pub(crate) fn engine_error(err: fg_engine::EngineError) -> WorkerError {
    WorkerError::TransientIo(err.to_string())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only queue journal.
//!
//! One JSON op per line: enqueue, ack, bury. Opening replays the file
//! into a fresh in-memory queue — enqueued-but-unresolved messages
//! become visible again, which is the at-least-once redelivery floor
//! after process loss. Leases and nacks are transient and not
//! journaled; replayed messages start with a fresh attempt count.

use crate::error::QueueError;
use crate::queue::{MemoryQueue, Queue};
use fg_core::{MessageId, QueueMessage, SharedClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum JournalOp {
    Enqueue { msg: QueueMessage },
    Ack { id: MessageId },
    Bury { id: MessageId },
}

/// A [`MemoryQueue`] whose enqueue/ack/bury ops are journaled to disk.
pub struct JournaledQueue {
    queue: MemoryQueue,
    file: Mutex<File>,
    path: PathBuf,
}

impl JournaledQueue {
    /// Open (or create) a journal and replay it into a fresh queue.
    pub fn open(
        path: impl AsRef<Path>,
        clock: SharedClock,
        max_attempts: u32,
        visibility_ms: u64,
    ) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        let (ready, dead) = replay(&path)?;

        let queue = MemoryQueue::with_limits(clock, max_attempts, visibility_ms);
        let replayed = ready.len() + dead.len();
        if replayed > 0 {
            tracing::info!(
                path = %path.display(),
                ready = ready.len(),
                dead = dead.len(),
                "queue journal replayed"
            );
        }
        queue.restore(ready, dead);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| QueueError::Io(format!("open journal {}: {e}", path.display())))?;

        Ok(Self {
            queue,
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, op: &JournalOp) -> Result<(), QueueError> {
        let line = serde_json::to_string(op)
            .map_err(|e| QueueError::Io(format!("encode journal op: {e}")))?;
        let mut file = self.file.lock();
        writeln!(file, "{line}").map_err(|e| QueueError::Io(format!("append journal: {e}")))?;
        file.flush()
            .map_err(|e| QueueError::Io(format!("flush journal: {e}")))
    }
}

fn replay(path: &Path) -> Result<(Vec<QueueMessage>, Vec<QueueMessage>), QueueError> {
    if !path.exists() {
        return Ok((Vec::new(), Vec::new()));
    }
    let file =
        File::open(path).map_err(|e| QueueError::Io(format!("read journal: {e}")))?;

    let mut messages: Vec<QueueMessage> = Vec::new();
    let mut acked: HashSet<MessageId> = HashSet::new();
    let mut buried: HashSet<MessageId> = HashSet::new();

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| QueueError::Io(format!("read journal: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        // A torn trailing line (crash mid-write) is skipped, not fatal.
        let op: JournalOp = match serde_json::from_str(&line) {
            Ok(op) => op,
            Err(e) => {
                tracing::warn!(path = %path.display(), lineno, error = %e, "skipping malformed journal line");
                continue;
            }
        };
        match op {
            JournalOp::Enqueue { mut msg } => {
                msg.attempts = 0;
                msg.visible_after_ms = 0;
                messages.push(msg);
            }
            JournalOp::Ack { id } => {
                acked.insert(id);
            }
            JournalOp::Bury { id } => {
                buried.insert(id);
            }
        }
    }

    let mut ready = Vec::new();
    let mut dead = Vec::new();
    for msg in messages {
        if acked.contains(&msg.id) {
            continue;
        }
        if buried.contains(&msg.id) {
            dead.push(msg);
        } else {
            ready.push(msg);
        }
    }
    Ok((ready, dead))
}

impl Queue for JournaledQueue {
    fn enqueue(&self, msg: QueueMessage) -> Result<(), QueueError> {
        self.append(&JournalOp::Enqueue { msg: msg.clone() })?;
        self.queue.enqueue(msg)
    }

    fn lease(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError> {
        self.queue.lease(max)
    }

    fn ack(&self, id: &MessageId) -> Result<(), QueueError> {
        self.queue.ack(id)?;
        self.append(&JournalOp::Ack { id: id.clone() })
    }

    fn nack(&self, id: &MessageId, retry_after_ms: Option<u64>) -> Result<(), QueueError> {
        self.queue.nack(id, retry_after_ms)
    }

    fn bury(&self, id: &MessageId) -> Result<(), QueueError> {
        self.queue.bury(id)?;
        self.append(&JournalOp::Bury { id: id.clone() })
    }

    fn pending_len(&self) -> usize {
        self.queue.pending_len()
    }

    fn in_flight_len(&self) -> usize {
        self.queue.in_flight_len()
    }

    fn dead_letters(&self) -> Vec<QueueMessage> {
        self.queue.dead_letters()
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;

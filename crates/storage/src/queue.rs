// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable message queue: at-least-once delivery with lease/ack.
//!
//! Ordering is best-effort FIFO; consumers must not assume strict
//! order. A leased message that is neither acked nor nacked before its
//! visibility deadline is redelivered on a later lease call.

use crate::error::QueueError;
use fg_core::{MessageId, QueueMessage, SharedClock};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Delivery attempts before a message is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Lease visibility timeout.
pub const DEFAULT_VISIBILITY_MS: u64 = 5 * 60 * 1000;

/// Durable message bus between planners and executors.
pub trait Queue: Send + Sync {
    /// Durably store a message. The corresponding job row must already
    /// exist (creation-before-visibility).
    fn enqueue(&self, msg: QueueMessage) -> Result<(), QueueError>;

    /// Lease up to `max` visible messages. Each lease increments the
    /// message's attempt count and hides it until the visibility
    /// deadline.
    fn lease(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError>;

    /// Remove a successfully processed message.
    fn ack(&self, id: &MessageId) -> Result<(), QueueError>;

    /// Restore visibility after `retry_after_ms` (immediately when
    /// `None`). Messages that exhausted their attempts are
    /// dead-lettered instead.
    fn nack(&self, id: &MessageId, retry_after_ms: Option<u64>) -> Result<(), QueueError>;

    /// Move a leased message straight to the dead-letter list
    /// (terminal failure; the job row records the error).
    fn bury(&self, id: &MessageId) -> Result<(), QueueError>;

    fn pending_len(&self) -> usize;
    fn in_flight_len(&self) -> usize;
    fn dead_letters(&self) -> Vec<QueueMessage>;
}

struct Leased {
    msg: QueueMessage,
    deadline_ms: u64,
}

#[derive(Default)]
struct QueueInner {
    ready: VecDeque<QueueMessage>,
    leased: HashMap<MessageId, Leased>,
    dead: Vec<QueueMessage>,
}

/// In-memory queue. Wrap in [`crate::JournaledQueue`] for restart
/// redelivery.
pub struct MemoryQueue {
    clock: SharedClock,
    max_attempts: u32,
    visibility_ms: u64,
    inner: Mutex<QueueInner>,
}

impl MemoryQueue {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_limits(clock, DEFAULT_MAX_ATTEMPTS, DEFAULT_VISIBILITY_MS)
    }

    pub fn with_limits(clock: SharedClock, max_attempts: u32, visibility_ms: u64) -> Self {
        Self {
            clock,
            max_attempts,
            visibility_ms,
            inner: Mutex::new(QueueInner::default()),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Seed state recovered from a journal replay.
    pub(crate) fn restore(&self, ready: Vec<QueueMessage>, dead: Vec<QueueMessage>) {
        let mut inner = self.inner.lock();
        inner.ready = ready.into();
        inner.dead = dead;
    }

    /// Return expired leases to the ready list, dead-lettering those
    /// out of attempts. Called under the inner lock.
    fn sweep_expired(&self, inner: &mut QueueInner, now_ms: u64) {
        let expired: Vec<MessageId> = inner
            .leased
            .iter()
            .filter(|(_, l)| l.deadline_ms <= now_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            let Some(leased) = inner.leased.remove(&id) else {
                continue;
            };
            let msg = leased.msg;
            if msg.attempts >= self.max_attempts {
                tracing::debug!(msg_id = %msg.id, job_id = %msg.job_id, attempts = msg.attempts, "lease expired, dead-lettering");
                inner.dead.push(msg);
            } else {
                tracing::debug!(msg_id = %msg.id, job_id = %msg.job_id, attempts = msg.attempts, "lease expired, redelivering");
                inner.ready.push_back(msg);
            }
        }
    }
}

impl Queue for MemoryQueue {
    fn enqueue(&self, msg: QueueMessage) -> Result<(), QueueError> {
        self.inner.lock().ready.push_back(msg);
        Ok(())
    }

    fn lease(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        self.sweep_expired(&mut inner, now_ms);

        let mut taken = Vec::new();
        let mut rest = VecDeque::with_capacity(inner.ready.len());
        while let Some(msg) = inner.ready.pop_front() {
            if taken.len() < max && msg.visible_after_ms <= now_ms {
                taken.push(msg);
            } else {
                rest.push_back(msg);
            }
        }
        inner.ready = rest;

        for msg in &mut taken {
            msg.attempts += 1;
            inner.leased.insert(
                msg.id.clone(),
                Leased {
                    msg: msg.clone(),
                    deadline_ms: now_ms + self.visibility_ms,
                },
            );
        }
        Ok(taken)
    }

    fn ack(&self, id: &MessageId) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        inner
            .leased
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| QueueError::NotLeased(id.clone()))
    }

    fn nack(&self, id: &MessageId, retry_after_ms: Option<u64>) -> Result<(), QueueError> {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        let leased = inner
            .leased
            .remove(id)
            .ok_or_else(|| QueueError::NotLeased(id.clone()))?;
        let mut msg = leased.msg;
        if msg.attempts >= self.max_attempts {
            tracing::debug!(msg_id = %msg.id, job_id = %msg.job_id, attempts = msg.attempts, "attempts exhausted, dead-lettering");
            inner.dead.push(msg);
        } else {
            msg.visible_after_ms = now_ms + retry_after_ms.unwrap_or(0);
            inner.ready.push_back(msg);
        }
        Ok(())
    }

    fn bury(&self, id: &MessageId) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let leased = inner
            .leased
            .remove(id)
            .ok_or_else(|| QueueError::NotLeased(id.clone()))?;
        inner.dead.push(leased.msg);
        Ok(())
    }

    fn pending_len(&self) -> usize {
        self.inner.lock().ready.len()
    }

    fn in_flight_len(&self) -> usize {
        self.inner.lock().leased.len()
    }

    fn dead_letters(&self) -> Vec<QueueMessage> {
        self.inner.lock().dead.clone()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

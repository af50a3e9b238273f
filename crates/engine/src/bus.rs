// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus: fire-and-forget fan-out to observers.

use fg_core::Event;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Typed broadcast channel for observer events.
///
/// Publishing never fails and never blocks; with no subscribers the
/// event is dropped. Slow subscribers lose old events (broadcast lag),
/// which observers must tolerate — nothing on the correctness path
/// reads from here.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        // Err means no receivers; fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;

//! Counting semaphore gating simultaneous ranged attacks.

use skirmish_core::TokenGateSnapshot;

/// Token counters. Returned tokens come back through a timer owned by the
/// world; the gate only tracks how many restores are still in flight.
#[derive(Debug)]
pub(crate) struct TokenGate {
    capacity: u32,
    available: u32,
    pending_restores: usize,
}

impl TokenGate {
    pub(crate) fn new(capacity: u32) -> Self {
        Self {
            capacity,
            available: capacity,
            pending_restores: 0,
        }
    }

    pub(crate) fn try_acquire(&mut self) -> bool {
        if self.available == 0 {
            return false;
        }
        self.available -= 1;
        true
    }

    pub(crate) fn begin_release(&mut self) {
        self.pending_restores = self.pending_restores.saturating_add(1);
    }

    /// Completes one delayed release. Saturates at capacity so unmatched
    /// releases can never inflate the pool.
    pub(crate) fn restore(&mut self) -> u32 {
        self.pending_restores = self.pending_restores.saturating_sub(1);
        self.available = self.available.saturating_add(1).min(self.capacity);
        self.available
    }

    pub(crate) fn clear(&mut self) {
        self.available = self.capacity;
        self.pending_restores = 0;
    }

    pub(crate) fn snapshot(&self) -> TokenGateSnapshot {
        TokenGateSnapshot {
            capacity: self.capacity,
            available: self.available,
            pending_restores: self.pending_restores,
        }
    }
}

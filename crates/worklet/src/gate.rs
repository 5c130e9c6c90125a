//! Readiness gate.
//!
//! Buffers invocations aimed at a context that has not finished
//! initializing. Two states, starts not-ready, never reverts. The drain
//! preserves arrival order; nothing is dropped.

use core_types::WorkletId;

use crate::value::Value;

pub struct Deferred {
    pub id: WorkletId,
    pub params: Vec<Value>,
}

pub struct ReadinessGate {
    ready: bool,
    queue: Vec<Deferred>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            ready: false,
            queue: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn defer(&mut self, id: WorkletId, params: Vec<Value>) {
        debug_assert!(!self.ready, "defer after readiness");
        self.queue.push(Deferred { id, params });
    }

    /// Flips to ready and drains the queue in arrival order. Later calls
    /// return an empty drain.
    pub fn mark_ready(&mut self) -> Vec<Deferred> {
        self.ready = true;
        std::mem::take(&mut self.queue)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

//! Foreign-function handle lifecycle.
//!
//! Handles captured by an invocation are reference-counted under its
//! execution id and handed back exactly once when that execution fully ends.
//! The manager is inert when cross-context function passing is disabled.

use core_types::{ExecutionId, FnHandleId};
use std::collections::HashMap;

pub struct FnLifecycle {
    enabled: bool,
    by_exec: HashMap<ExecutionId, Vec<FnHandleId>>,
}

impl FnLifecycle {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            by_exec: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn add_ref(&mut self, exec: ExecutionId, handle: FnHandleId) {
        if !self.enabled {
            return;
        }
        let handles = self.by_exec.entry(exec).or_default();
        if !handles.contains(&handle) {
            handles.push(handle);
        }
    }

    /// Returns the handle set exactly once; a repeat release is a no-op.
    ///
    /// The caller is responsible for notifying the foreign side that the
    /// returned handles may be discarded.
    pub fn release(&mut self, exec: ExecutionId) -> Option<Vec<FnHandleId>> {
        let handles = self.by_exec.remove(&exec)?;
        log::trace!(
            target: "worklet",
            "releasing {} fn handle(s) for {exec:?}",
            handles.len()
        );
        Some(handles)
    }

    pub fn pending_executions(&self) -> usize {
        self.by_exec.len()
    }
}

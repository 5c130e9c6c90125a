//! Event propagation over the surrogate tree.
//!
//! Events forwarded from the real tree replay here in three phases:
//! capture from the root down, at-target, then bubble back up when the
//! event type bubbles. Propagation state is an explicit per-dispatch
//! record, not a flag on the event payload; once stopped it stays stopped
//! for the rest of the dispatch.

use std::sync::Arc;

use crate::ops::NodeId;
use crate::store::{Document, OffNode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventPhase {
    Capturing,
    AtTarget,
    Bubbling,
}

/// Plain event payload value, shippable across the context boundary.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// The event as handlers see it.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventRecord {
    pub name: Arc<str>,
    pub target: NodeId,
    pub bubbles: bool,
    pub phase: EventPhase,
    pub props: Vec<(Arc<str>, PropValue)>,
}

impl EventRecord {
    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }
}

/// Per-dispatch propagation state. One fresh record per dispatch; the
/// stopped latch never resets within it.
#[derive(Debug, Default)]
pub struct DispatchState {
    propagation_stopped: bool,
}

impl DispatchState {
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

pub type EventHandler = Box<dyn FnMut(&EventRecord, &mut DispatchState)>;

impl Document {
    /// Replays one forwarded event against the surrogate tree.
    ///
    /// A target the weak table no longer resolves was collected after the
    /// real tree forwarded the event; the dispatch is silently dropped.
    /// The stop latch is checked after every node, including the target,
    /// so a capture-phase stop suppresses the at-target delivery too.
    pub fn dispatch(
        &mut self,
        name: &str,
        target: NodeId,
        bubbles: bool,
        props: Vec<(Arc<str>, PropValue)>,
    ) {
        let Some(target_node) = self.get(target) else {
            log::trace!(target: "offtree.events", "dropping {name} for collected node {target:?}");
            return;
        };

        // Ancestors nearest-first; capture walks it in reverse.
        let mut path = Vec::new();
        let mut cursor = target_node.parent();
        while let Some(node) = cursor {
            cursor = node.parent();
            path.push(node);
        }

        let mut record = EventRecord {
            name: Arc::from(name),
            target,
            bubbles,
            phase: EventPhase::Capturing,
            props,
        };
        let mut state = DispatchState::default();

        for node in path.iter().rev() {
            deliver(node, &record, &mut state);
            if state.propagation_stopped() {
                return;
            }
        }

        record.phase = EventPhase::AtTarget;
        deliver(&target_node, &record, &mut state);
        if state.propagation_stopped() {
            return;
        }

        if record.bubbles {
            record.phase = EventPhase::Bubbling;
            for node in &path {
                deliver(node, &record, &mut state);
                if state.propagation_stopped() {
                    return;
                }
            }
        }
    }
}

/// Runs a node's handlers for one phase, in registration order.
///
/// The handler list is moved out of the node for the calls so a handler can
/// mutate its own node without hitting the `RefCell`. Handlers registered
/// during delivery land in the table and are merged back behind the
/// existing ones; they are not called for the in-flight dispatch.
fn deliver(node: &OffNode, record: &EventRecord, state: &mut DispatchState) {
    let taken = node.inner.borrow_mut().listeners.remove(&record.name);
    let Some(mut handlers) = taken else {
        return;
    };
    for handler in handlers.iter_mut() {
        handler(record, state);
    }
    let mut data = node.inner.borrow_mut();
    if let Some(mut added) = data.listeners.remove(&record.name) {
        handlers.append(&mut added);
    }
    data.listeners.insert(record.name.clone(), handlers);
}

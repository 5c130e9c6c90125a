use core_types::{ContextId, ExecutionId, FnHandleId, WorkletId};
use offtree::{Document, NodeId, PropValue, TreeOp};
use std::sync::mpsc::{Receiver, Sender, channel};
use worklet::{ObjectRef, Value, WireValue};

/// Worklet body shipped across the bus to the runtime thread.
pub struct WorkletFn(pub Box<dyn Fn(&ObjectRef, &[Value]) -> Value + Send>);

impl std::fmt::Debug for WorkletFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WorkletFn")
    }
}

/// Document mutation shipped across the bus; runs on the runtime thread,
/// where the surrogate document lives.
pub struct DocumentFn(pub Box<dyn FnOnce(&mut Document) + Send>);

impl std::fmt::Debug for DocumentFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DocumentFn")
    }
}

#[derive(Debug)]
pub enum CoreCommand {
    // Worklet engine
    RegisterWorklet {
        context_id: ContextId,
        id: WorkletId,
        body: WorkletFn,
    },
    InvokeWorklet {
        context_id: ContextId,
        ctx: WireValue,
        params: Vec<WireValue>,
    },
    ContextReady {
        context_id: ContextId,
    },
    EndExecution {
        context_id: ContextId,
        exec_id: ExecutionId,
    },

    // Real tree -> surrogate document
    UpdateDocument {
        context_id: ContextId,
        update: DocumentFn,
    },
    DispatchEvent {
        context_id: ContextId,
        name: String,
        target: NodeId,
        bubbles: bool,
        props: Vec<(String, PropValue)>,
    },
    CommitDocument {
        context_id: ContextId,
    },
}

#[derive(Debug)]
pub enum CoreEvent {
    // Worklet engine -> host
    InvokeDone {
        context_id: ContextId,
        result: Option<WireValue>,
    },
    InvokeFailed {
        context_id: ContextId,
        error: String,
    },
    FnHandlesReleased {
        context_id: ContextId,
        exec_id: ExecutionId,
        handles: Vec<FnHandleId>,
    },

    // Surrogate document -> real tree
    OpsCommitted {
        context_id: ContextId,
        batch: Vec<TreeOp>,
    },
}

pub struct Bus {
    pub cmd_tx: Sender<CoreCommand>,
    pub evt_rx: Receiver<CoreEvent>,
    pub evt_tx: Sender<CoreEvent>, // shareable for runtimes
}

impl Bus {
    /// Builds the host-side bus plus the endpoints a runtime thread needs.
    pub fn new() -> (Bus, Receiver<CoreCommand>, Sender<CoreEvent>) {
        let (cmd_tx, cmd_rx) = channel();
        let (evt_tx, evt_rx) = channel();
        let bus = Bus {
            cmd_tx,
            evt_rx,
            evt_tx: evt_tx.clone(),
        };
        (bus, cmd_rx, evt_tx)
    }
}

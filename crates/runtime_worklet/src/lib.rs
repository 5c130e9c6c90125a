use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

use bus::{CoreCommand, CoreEvent};
use core_types::ContextId;
use offtree::Document;
use worklet::{Value, WorkletRuntime, deflate, inflate};

/// Everything one execution context owns on this thread.
struct ContextState {
    runtime: WorkletRuntime,
    document: Document,
}

impl ContextState {
    fn new() -> Self {
        Self {
            runtime: WorkletRuntime::new(),
            document: Document::new(),
        }
    }
}

/// Spawns the worklet-context thread. Contexts are created lazily on first
/// use; runtime state never crosses the thread boundary, only commands and
/// events do.
pub fn start_worklet_runtime(cmd_rx: Receiver<CoreCommand>, evt_tx: Sender<CoreEvent>) {
    thread::spawn(move || {
        let mut contexts: HashMap<ContextId, ContextState> = HashMap::new();

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                CoreCommand::RegisterWorklet {
                    context_id,
                    id,
                    body,
                } => {
                    let st = contexts.entry(context_id).or_insert_with(ContextState::new);
                    st.runtime.register(id, body.0);
                }
                CoreCommand::InvokeWorklet {
                    context_id,
                    ctx,
                    params,
                } => {
                    let st = contexts.entry(context_id).or_insert_with(ContextState::new);
                    let ctx = inflate(&ctx);
                    let params: Vec<Value> = params.iter().map(inflate).collect();
                    match st.runtime.invoke(&ctx, &params) {
                        Ok(result) => {
                            let _ = evt_tx.send(CoreEvent::InvokeDone {
                                context_id,
                                result: result.map(|v| deflate(&v)),
                            });
                        }
                        Err(err) => {
                            log::warn!(
                                target: "worklet.runtime",
                                "invoke failed in context {context_id}: {err:?}"
                            );
                            let _ = evt_tx.send(CoreEvent::InvokeFailed {
                                context_id,
                                error: format!("{err:?}"),
                            });
                        }
                    }
                }
                CoreCommand::ContextReady { context_id } => {
                    let st = contexts.entry(context_id).or_insert_with(ContextState::new);
                    if let Err(err) = st.runtime.mark_ready() {
                        log::warn!(
                            target: "worklet.runtime",
                            "deferred flush failed in context {context_id}: {err:?}"
                        );
                        let _ = evt_tx.send(CoreEvent::InvokeFailed {
                            context_id,
                            error: format!("{err:?}"),
                        });
                    }
                }
                CoreCommand::EndExecution {
                    context_id,
                    exec_id,
                } => {
                    if let Some(st) = contexts.get_mut(&context_id)
                        && let Some(handles) = st.runtime.end_execution(exec_id)
                    {
                        let _ = evt_tx.send(CoreEvent::FnHandlesReleased {
                            context_id,
                            exec_id,
                            handles,
                        });
                    }
                }
                CoreCommand::UpdateDocument { context_id, update } => {
                    let st = contexts.entry(context_id).or_insert_with(ContextState::new);
                    (update.0)(&mut st.document);
                }
                CoreCommand::DispatchEvent {
                    context_id,
                    name,
                    target,
                    bubbles,
                    props,
                } => {
                    if let Some(st) = contexts.get_mut(&context_id) {
                        let props = props
                            .into_iter()
                            .map(|(n, v)| (Arc::from(n), v))
                            .collect();
                        st.document.dispatch(&name, target, bubbles, props);
                    }
                }
                CoreCommand::CommitDocument { context_id } => {
                    if let Some(st) = contexts.get_mut(&context_id) {
                        let batch = st.document.commit();
                        let _ = evt_tx.send(CoreEvent::OpsCommitted { context_id, batch });
                    }
                }
            }
        }
    });
}

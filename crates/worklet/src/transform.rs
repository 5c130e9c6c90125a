//! Closure graph transformation.
//!
//! Contract:
//! - Non-container values pass through untouched.
//! - Traversal is depth-first over object fields and list slots, bounded by
//!   an explicit depth counter. Depth >= `DEPTH_LIMIT` aborts the invocation;
//!   a true reference cycle runs into the same limit.
//! - Element markers are rewritten before recursion; every other marker is
//!   resolved bottom-up after its own fields have been transformed.
//! - A failed transform leaves the registry, cache and reference table
//!   untouched; nothing is cached on the error path.

use core_types::{ExecutionId, WorkletId};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::lifecycle::FnLifecycle;
use crate::marker::{self, Marker, classify};
use crate::ref_table::RefTable;
use crate::value::{
    BoundWorklet, ElementHandle, ListRef, ObjectCell, ObjectRef, Value, WorkletBody,
};

pub(crate) const DEPTH_LIMIT: usize = 1000;

#[derive(Debug, PartialEq, Eq)]
pub enum WorkletError {
    /// Closure graph deeper than `DEPTH_LIMIT` levels, or cyclic.
    DepthExceeded { limit: usize },
    /// A nested worklet marker referenced an id with no registered body.
    UnregisteredWorklet(WorkletId),
}

pub(crate) struct Transformer<'a> {
    pub registry: &'a HashMap<WorkletId, Rc<WorkletBody>>,
    pub refs: &'a RefTable,
    pub lifecycle: &'a mut FnLifecycle,
}

impl Transformer<'_> {
    /// Resolves a validated worklet ctx into a bound callable.
    pub(crate) fn transform_ctx(
        &mut self,
        ctx: &ObjectRef,
        id: &str,
    ) -> Result<BoundWorklet, WorkletError> {
        let exec = exec_id_of(ctx);
        self.walk_object(ctx, 0, exec)?;
        self.bind(id, ctx)
    }

    /// Transforms invocation params. Params carry no execution id of their
    /// own, so foreign-function markers inside them are never stamped.
    pub(crate) fn transform_params(
        &mut self,
        params: &[Value],
    ) -> Result<Vec<Value>, WorkletError> {
        params
            .iter()
            .map(|param| {
                Ok(match self.transform_slot(param, 0, None)? {
                    Some(replacement) => replacement,
                    None => param.clone(),
                })
            })
            .collect()
    }

    fn walk_object(
        &mut self,
        obj: &ObjectRef,
        depth: usize,
        exec: Option<ExecutionId>,
    ) -> Result<(), WorkletError> {
        let depth = depth + 1;
        if depth >= DEPTH_LIMIT {
            return Err(WorkletError::DepthExceeded { limit: DEPTH_LIMIT });
        }
        // Field values are cloned out so no borrow is held across recursion;
        // a cyclic graph re-enters here until the depth guard fires.
        let keys: Vec<String> = obj.borrow().keys().cloned().collect();
        for key in keys {
            let Some(current) = obj.borrow().get(&key).cloned() else {
                continue;
            };
            if let Some(replacement) = self.transform_slot(&current, depth, exec)? {
                obj.borrow_mut().insert(key, replacement);
            }
        }
        Ok(())
    }

    fn walk_list(
        &mut self,
        list: &ListRef,
        depth: usize,
        exec: Option<ExecutionId>,
    ) -> Result<(), WorkletError> {
        let depth = depth + 1;
        if depth >= DEPTH_LIMIT {
            return Err(WorkletError::DepthExceeded { limit: DEPTH_LIMIT });
        }
        let len = list.borrow().len();
        for index in 0..len {
            let Some(current) = list.borrow().get(index).cloned() else {
                continue;
            };
            if let Some(replacement) = self.transform_slot(&current, depth, exec)? {
                list.borrow_mut()[index] = replacement;
            }
        }
        Ok(())
    }

    /// Transforms one field/slot value. Returns the replacement, or `None`
    /// when the value stays in place (possibly mutated in-situ).
    fn transform_slot(
        &mut self,
        current: &Value,
        depth: usize,
        exec: Option<ExecutionId>,
    ) -> Result<Option<Value>, WorkletError> {
        match current {
            Value::Object(sub) => {
                if let Marker::Element(target) = classify(sub) {
                    return Ok(Some(Value::Element(ElementHandle::new(target))));
                }

                self.walk_object(sub, depth, exec)?;

                match classify(sub) {
                    Marker::WorkletRef(id) => Ok(Some(match self.refs.get(id) {
                        Some(cell) => Value::Ref(cell),
                        None => {
                            log::warn!(target: "worklet", "dangling ref {id:?} resolved to null");
                            Value::Null
                        }
                    })),
                    Marker::Worklet(id) => Ok(Some(Value::Callable(self.bind(&id, sub)?))),
                    Marker::ForeignFn(handle) => {
                        if self.lifecycle.is_enabled()
                            && let Some(exec) = exec
                        {
                            sub.borrow_mut().insert(
                                marker::EXEC_FIELD.to_string(),
                                Value::Int(i64::from(exec.0)),
                            );
                            self.lifecycle.add_ref(exec, handle);
                        }
                        Ok(None)
                    }
                    _ => Ok(None),
                }
            }
            Value::List(sub) => {
                self.walk_list(sub, depth, exec)?;
                Ok(None)
            }
            // Scalars and already-live bindings pass through.
            _ => Ok(None),
        }
    }

    fn bind(&self, id: &str, marker_obj: &ObjectRef) -> Result<BoundWorklet, WorkletError> {
        let body = self
            .registry
            .get(id)
            .cloned()
            .ok_or_else(|| WorkletError::UnregisteredWorklet(id.to_string()))?;
        Ok(BoundWorklet::bind(body, marker_obj))
    }
}

pub(crate) fn exec_id_of(ctx: &ObjectRef) -> Option<ExecutionId> {
    let fields = ctx.borrow();
    let raw = fields.get(marker::EXEC_FIELD)?.as_int()?;
    u32::try_from(raw).ok().map(ExecutionId)
}

/// Identity-keyed cache of transformed worklet ctx objects.
///
/// Keys are held weakly; an entry whose ctx has been collected (or whose
/// address has been reused by a new allocation) is evicted on lookup.
#[derive(Default)]
pub(crate) struct TransformCache {
    entries: HashMap<usize, CacheEntry>,
}

struct CacheEntry {
    key: Weak<ObjectCell>,
    callable: BoundWorklet,
}

impl TransformCache {
    pub(crate) fn get(&mut self, ctx: &ObjectRef) -> Option<BoundWorklet> {
        let addr = Rc::as_ptr(ctx) as usize;
        let entry = self.entries.get(&addr)?;
        match entry.key.upgrade() {
            Some(live) if Rc::ptr_eq(&live, ctx) => Some(entry.callable.clone()),
            _ => {
                self.entries.remove(&addr);
                None
            }
        }
    }

    pub(crate) fn insert(&mut self, ctx: &ObjectRef, callable: BoundWorklet) {
        self.entries.insert(
            Rc::as_ptr(ctx) as usize,
            CacheEntry {
                key: Rc::downgrade(ctx),
                // Stored with a weak marker link; a strong one would keep
                // the weak key upgradable forever.
                callable: callable.with_weak_marker(),
            },
        );
    }

    pub(crate) fn purge(&mut self) {
        self.entries.retain(|_, entry| entry.key.strong_count() > 0);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

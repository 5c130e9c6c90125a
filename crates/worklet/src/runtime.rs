//! Worklet registry and dispatcher.
//!
//! All engine state lives in one explicitly constructed `WorkletRuntime`;
//! there are no ambient singletons. One runtime per execution context,
//! single-threaded by construction.

use core_types::{ExecutionId, FnHandleId, WorkletId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::gate::{Deferred, ReadinessGate};
use crate::lifecycle::FnLifecycle;
use crate::marker::{self, Marker, classify};
use crate::profile::profiled;
use crate::ref_table::RefTable;
use crate::transform::{Transformer, TransformCache, WorkletError};
use crate::value::{BoundWorklet, ObjectRef, Value, WorkletBody};

pub struct WorkletRuntime {
    registry: HashMap<WorkletId, Rc<WorkletBody>>,
    cache: TransformCache,
    refs: RefTable,
    gate: ReadinessGate,
    lifecycle: FnLifecycle,
}

impl WorkletRuntime {
    pub fn new() -> Self {
        Self::with_foreign_fns(true)
    }

    /// `enabled` controls cross-context function passing; when off, foreign
    /// function markers are never stamped or ref-counted.
    pub fn with_foreign_fns(enabled: bool) -> Self {
        Self {
            registry: HashMap::new(),
            cache: TransformCache::default(),
            refs: RefTable::new(),
            gate: ReadinessGate::new(),
            lifecycle: FnLifecycle::new(enabled),
        }
    }

    /// Stores a worklet body. Re-registering an id silently overwrites the
    /// previous body (hot reload).
    pub fn register(
        &mut self,
        id: impl Into<WorkletId>,
        body: impl Fn(&ObjectRef, &[Value]) -> Value + 'static,
    ) {
        self.registry.insert(id.into(), Rc::new(body));
    }

    /// Entry point for every worklet call.
    ///
    /// An unrecognizable ctx is logged and ignored. A ctx whose body is
    /// still in flight from the other context is parked on the readiness
    /// gate and produces no value.
    pub fn invoke(
        &mut self,
        ctx: &Value,
        params: &[Value],
    ) -> Result<Option<Value>, WorkletError> {
        let Some(obj) = ctx.as_object() else {
            log::warn!(target: "worklet", "invalid worklet ctx: {ctx:?}");
            return Ok(None);
        };
        match classify(obj) {
            Marker::Worklet(id) => {
                let obj = obj.clone();
                self.run(&obj, &id, params).map(Some)
            }
            Marker::Pending(id) => {
                if self.gate.is_ready() {
                    // Readiness already happened, the body is registered
                    // under its cross-context id; replay directly.
                    self.invoke_by_id(&id, params)
                } else {
                    self.gate.defer(id, params.to_vec());
                    Ok(None)
                }
            }
            _ => {
                log::warn!(target: "worklet", "invalid worklet ctx: {ctx:?}");
                Ok(None)
            }
        }
    }

    /// Edge-triggered readiness signal from the host. Replays every parked
    /// invocation in arrival order; nothing is dropped. The first failure is
    /// reported after the whole queue has been drained.
    pub fn mark_ready(&mut self) -> Result<(), WorkletError> {
        let mut first_error = None;
        for Deferred { id, params } in self.gate.mark_ready() {
            if let Err(err) = self.invoke_by_id(&id, &params) {
                log::warn!(target: "worklet", "deferred invocation of {id:?} failed: {err:?}");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Called exactly when the execution behind `exec` has fully ended.
    /// Returns the foreign handles to notify the other side about, once.
    pub fn end_execution(&mut self, exec: ExecutionId) -> Option<Vec<FnHandleId>> {
        self.lifecycle.release(exec)
    }

    pub fn refs(&self) -> &RefTable {
        &self.refs
    }

    pub fn refs_mut(&mut self) -> &mut RefTable {
        &mut self.refs
    }

    /// Drops cache entries and ref slots whose objects have been collected.
    pub fn purge(&mut self) {
        self.cache.purge();
        self.refs.purge();
    }

    fn run(
        &mut self,
        obj: &ObjectRef,
        id: &str,
        params: &[Value],
    ) -> Result<Value, WorkletError> {
        let callable = profiled("transform worklet ctx", || self.transform_cached(obj, id))?;
        let params = profiled("transform worklet params", || {
            let mut transformer = Transformer {
                registry: &self.registry,
                refs: &self.refs,
                lifecycle: &mut self.lifecycle,
            };
            transformer.transform_params(params)
        })?;
        Ok(profiled("run worklet", || callable.call(&params)))
    }

    fn transform_cached(&mut self, obj: &ObjectRef, id: &str) -> Result<BoundWorklet, WorkletError> {
        if let Some(hit) = self.cache.get(obj) {
            return Ok(hit);
        }
        let mut transformer = Transformer {
            registry: &self.registry,
            refs: &self.refs,
            lifecycle: &mut self.lifecycle,
        };
        let callable = transformer.transform_ctx(obj, id)?;
        // Only reached on success; a failed transform caches nothing.
        self.cache.insert(obj, callable.clone());
        Ok(callable)
    }

    fn invoke_by_id(&mut self, id: &str, params: &[Value]) -> Result<Option<Value>, WorkletError> {
        let mut fields = BTreeMap::new();
        fields.insert(
            marker::WORKLET_FIELD.to_string(),
            Value::Str(id.to_string()),
        );
        let obj: ObjectRef = Rc::new(RefCell::new(fields));
        self.run(&obj, id, params).map(Some)
    }
}

impl Default for WorkletRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(fields: &[(&str, Value)]) -> Value {
        Value::object(fields.iter().map(|(k, v)| (k.to_string(), v.clone())))
    }

    fn worklet_ctx(id: &str) -> Value {
        obj(&[(marker::WORKLET_FIELD, Value::Str(id.into()))])
    }

    #[test]
    fn registered_worklet_runs_with_transformed_params() {
        let mut rt = WorkletRuntime::new();
        rt.register("w1", |_ctx, params| {
            let a = params[0].as_int().unwrap_or(0);
            let b = params[1].as_int().unwrap_or(0);
            Value::Int(a + b)
        });

        let result = rt
            .invoke(&worklet_ctx("w1"), &[Value::Int(1), Value::Int(2)])
            .unwrap();
        assert_eq!(result.and_then(|v| v.as_int()), Some(3));
    }

    #[test]
    fn malformed_ctx_is_a_logged_no_op() {
        let mut rt = WorkletRuntime::new();
        assert!(matches!(rt.invoke(&Value::Int(3), &[]), Ok(None)));
        assert!(matches!(
            rt.invoke(&obj(&[("plain", Value::Int(1))]), &[]),
            Ok(None)
        ));
    }

    #[test]
    fn re_registering_overwrites_silently() {
        let mut rt = WorkletRuntime::new();
        rt.register("w1", |_ctx, _params| Value::Int(1));
        rt.register("w1", |_ctx, _params| Value::Int(2));
        let result = rt.invoke(&worklet_ctx("w1"), &[]).unwrap();
        assert_eq!(result.and_then(|v| v.as_int()), Some(2));
    }

    #[test]
    fn repeated_invocations_reuse_the_same_callable() {
        let mut rt = WorkletRuntime::new();
        rt.register("w1", |_ctx, _params| Value::Null);

        let ctx = worklet_ctx("w1");
        let obj = ctx.as_object().unwrap().clone();

        let first = rt.transform_cached(&obj, "w1").unwrap();
        let second = rt.transform_cached(&obj, "w1").unwrap();
        assert!(first.same_binding(&second));
        assert_eq!(rt.cache.len(), 1);

        // A distinct ctx object gets its own binding even for the same id.
        let other = worklet_ctx("w1");
        let other_obj = other.as_object().unwrap().clone();
        let third = rt.transform_cached(&other_obj, "w1").unwrap();
        assert!(!first.same_binding(&third));
    }

    #[test]
    fn failed_transform_caches_nothing_and_recovers() {
        let mut rt = WorkletRuntime::new();
        rt.register("outer", |ctx, _params| {
            ctx.borrow().get("cb").cloned().unwrap_or(Value::Null)
        });

        let ctx = obj(&[
            (marker::WORKLET_FIELD, Value::Str("outer".into())),
            (
                "cb",
                obj(&[(marker::WORKLET_FIELD, Value::Str("missing".into()))]),
            ),
        ]);

        assert_eq!(
            rt.invoke(&ctx, &[]).unwrap_err(),
            WorkletError::UnregisteredWorklet("missing".to_string())
        );
        assert_eq!(rt.cache.len(), 0);

        // Once the missing body shows up the same ctx transforms cleanly.
        rt.register("missing", |_ctx, _params| Value::Null);
        let result = rt.invoke(&ctx, &[]).unwrap();
        assert!(matches!(result, Some(Value::Callable(_))));
        assert_eq!(rt.cache.len(), 1);
    }

    #[test]
    fn nested_callable_keeps_its_marker_through_wire_graphs() {
        use crate::value::{WireValue, deflate, inflate};

        let mut rt = WorkletRuntime::new();
        rt.register("outer", |ctx, _params| {
            ctx.borrow().get("cb").cloned().unwrap_or(Value::Null)
        });
        rt.register("inner", |_ctx, _params| Value::Null);

        let wire = WireValue::Object(vec![
            (
                marker::WORKLET_FIELD.to_string(),
                WireValue::Str("outer".into()),
            ),
            (
                "cb".to_string(),
                WireValue::Object(vec![
                    (
                        marker::WORKLET_FIELD.to_string(),
                        WireValue::Str("inner".into()),
                    ),
                    ("factor".to_string(), WireValue::Int(2)),
                ]),
            ),
        ]);
        let ctx = inflate(&wire);
        let result = rt.invoke(&ctx, &[]).unwrap().unwrap();
        // The transformer rewrote the marker's parent field, so once the
        // inflated graph is gone the callable is the only thing still
        // referencing the marker.
        drop(ctx);

        let Value::Callable(cb) = &result else {
            panic!("expected callable, got {result:?}");
        };
        let original = cb.ctx().expect("marker reachable through the callable");
        assert_eq!(classify(&original), Marker::Worklet("inner".to_string()));

        assert_eq!(
            deflate(&result),
            WireValue::Object(vec![
                (
                    marker::WORKLET_FIELD.to_string(),
                    WireValue::Str("inner".into()),
                ),
                ("factor".to_string(), WireValue::Int(2)),
            ])
        );
    }

    #[test]
    fn pending_invocations_flush_in_arrival_order() {
        let mut rt = WorkletRuntime::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for n in 0..4 {
            let id = format!("pending{n}");
            let seen = seen.clone();
            rt.register(id.clone(), move |_ctx, params| {
                seen.borrow_mut()
                    .push(params[0].as_int().unwrap_or(-1));
                Value::Null
            });
            let ctx = obj(&[(marker::PENDING_FIELD, Value::Str(id))]);
            assert!(matches!(rt.invoke(&ctx, &[Value::Int(n)]), Ok(None)));
        }
        assert!(seen.borrow().is_empty());

        rt.mark_ready().unwrap();
        assert_eq!(*seen.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn pending_ctx_after_readiness_runs_immediately() {
        let mut rt = WorkletRuntime::new();
        rt.mark_ready().unwrap();
        rt.register("late", |_ctx, _params| Value::Int(7));

        let ctx = obj(&[(marker::PENDING_FIELD, Value::Str("late".into()))]);
        let result = rt.invoke(&ctx, &[]).unwrap();
        assert_eq!(result.and_then(|v| v.as_int()), Some(7));
    }

    #[test]
    fn flush_reports_first_failure_without_dropping_later_entries() {
        let mut rt = WorkletRuntime::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let ghost = obj(&[(marker::PENDING_FIELD, Value::Str("ghost".into()))]);
        assert!(matches!(rt.invoke(&ghost, &[]), Ok(None)));

        let seen_in_body = seen.clone();
        rt.register("real", move |_ctx, _params| {
            seen_in_body.borrow_mut().push("real");
            Value::Null
        });
        let real = obj(&[(marker::PENDING_FIELD, Value::Str("real".into()))]);
        assert!(matches!(rt.invoke(&real, &[]), Ok(None)));

        assert_eq!(
            rt.mark_ready(),
            Err(WorkletError::UnregisteredWorklet("ghost".to_string()))
        );
        assert_eq!(*seen.borrow(), vec!["real"]);
    }

    #[test]
    fn end_execution_is_idempotent_through_the_runtime() {
        let mut rt = WorkletRuntime::new();
        rt.register("w1", |_ctx, _params| Value::Null);

        let ctx = obj(&[
            (marker::WORKLET_FIELD, Value::Str("w1".into())),
            (marker::EXEC_FIELD, Value::Int(5)),
            (
                "cb",
                obj(&[(marker::FOREIGN_FN_FIELD, Value::Int(77))]),
            ),
        ]);
        rt.invoke(&ctx, &[]).unwrap();

        assert_eq!(
            rt.end_execution(ExecutionId(5)),
            Some(vec![FnHandleId(77)])
        );
        assert_eq!(rt.end_execution(ExecutionId(5)), None);
    }
}

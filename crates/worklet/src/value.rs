//! Closure-state value model.
//!
//! Contract:
//! - `Value` is the context-local form. Objects and lists are `Rc`-shared so
//!   two handles to the same allocation compare identical by pointer; the
//!   transform cache keys on that identity.
//! - `WireValue` is the `Send` plain-data form carried across the context
//!   boundary. Marker objects survive the trip as ordinary objects.
//! - `inflate` always builds a fresh graph; `deflate` is best-effort, live
//!   bindings that cannot cross the boundary degrade (see `deflate`).

use core_types::ElementRef;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::marker;

pub type ObjectCell = RefCell<BTreeMap<String, Value>>;
pub type ObjectRef = Rc<ObjectCell>;
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// A value inside a worklet closure graph.
///
/// `Element`, `Ref` and `Callable` only exist after transformation; they are
/// never produced by `inflate`.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(ListRef),
    Object(ObjectRef),
    Element(ElementHandle),
    Ref(Rc<RefCell<Value>>),
    Callable(BoundWorklet),
}

impl Value {
    pub fn empty_object() -> Value {
        Value::Object(Rc::new(RefCell::new(BTreeMap::new())))
    }

    pub fn object(fields: impl IntoIterator<Item = (String, Value)>) -> Value {
        Value::Object(Rc::new(RefCell::new(fields.into_iter().collect())))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Live handle to an element owned by the other context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementHandle {
    target: ElementRef,
}

impl ElementHandle {
    pub fn new(target: ElementRef) -> Self {
        Self { target }
    }

    pub fn target(&self) -> ElementRef {
        self.target
    }
}

pub type WorkletBody = dyn Fn(&ObjectRef, &[Value]) -> Value;

/// A worklet body bound to a shallow copy of its ctx object.
///
/// The copy is taken at bind time so later mutation of the original marker
/// does not alter an already-bound closure. The original marker rides along
/// strongly for downstream inspection; a nested callable is often the only
/// thing left referencing its marker once the transformer has rewritten the
/// parent field. Copies stored in the transform cache are downgraded to a
/// weak link so a cache value never retains its own key.
#[derive(Clone)]
pub struct BoundWorklet {
    body: Rc<WorkletBody>,
    bound: ObjectRef,
    marker: MarkerLink,
}

#[derive(Clone)]
enum MarkerLink {
    Strong(ObjectRef),
    Weak(Weak<ObjectCell>),
}

impl BoundWorklet {
    pub(crate) fn bind(body: Rc<WorkletBody>, marker: &ObjectRef) -> Self {
        let bound = Rc::new(RefCell::new(marker.borrow().clone()));
        Self {
            body,
            bound,
            marker: MarkerLink::Strong(marker.clone()),
        }
    }

    /// Copy for the transform cache: same body and bound state, marker held
    /// weakly so the entry cannot keep the cached ctx alive.
    pub(crate) fn with_weak_marker(&self) -> Self {
        let marker = match &self.marker {
            MarkerLink::Strong(obj) => MarkerLink::Weak(Rc::downgrade(obj)),
            MarkerLink::Weak(weak) => MarkerLink::Weak(weak.clone()),
        };
        Self {
            body: self.body.clone(),
            bound: self.bound.clone(),
            marker,
        }
    }

    pub fn call(&self, params: &[Value]) -> Value {
        (self.body)(&self.bound, params)
    }

    /// The original (uncopied) ctx marker, if it is still alive.
    pub fn ctx(&self) -> Option<ObjectRef> {
        match &self.marker {
            MarkerLink::Strong(obj) => Some(obj.clone()),
            MarkerLink::Weak(weak) => weak.upgrade(),
        }
    }

    /// The shallow-copied ctx the body actually closes over.
    pub fn bound_ctx(&self) -> &ObjectRef {
        &self.bound
    }

    /// Identity check: do two callables share the same bound state?
    pub fn same_binding(&self, other: &BoundWorklet) -> bool {
        Rc::ptr_eq(&self.bound, &other.bound)
    }
}

impl fmt::Debug for BoundWorklet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundWorklet")
            .field("bound", &self.bound.borrow())
            .finish_non_exhaustive()
    }
}

/// Plain-data form of a closure graph, safe to move between contexts.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<WireValue>),
    Object(Vec<(String, WireValue)>),
}

/// Build a fresh context-local graph from its wire form.
pub fn inflate(wire: &WireValue) -> Value {
    match wire {
        WireValue::Null => Value::Null,
        WireValue::Bool(b) => Value::Bool(*b),
        WireValue::Int(n) => Value::Int(*n),
        WireValue::Float(f) => Value::Float(*f),
        WireValue::Str(s) => Value::Str(s.clone()),
        WireValue::List(items) => Value::list(items.iter().map(inflate)),
        WireValue::Object(fields) => {
            Value::object(fields.iter().map(|(k, v)| (k.clone(), inflate(v))))
        }
    }
}

/// Best-effort inverse of `inflate` for results travelling back.
///
/// Element handles fold back into element markers, bound worklets into their
/// original ctx markers. Ref-cell bindings have no wire identity and degrade
/// to `Null`.
pub fn deflate(value: &Value) -> WireValue {
    match value {
        Value::Null => WireValue::Null,
        Value::Bool(b) => WireValue::Bool(*b),
        Value::Int(n) => WireValue::Int(*n),
        Value::Float(f) => WireValue::Float(*f),
        Value::Str(s) => WireValue::Str(s.clone()),
        Value::List(items) => WireValue::List(items.borrow().iter().map(deflate).collect()),
        Value::Object(fields) => WireValue::Object(
            fields
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), deflate(v)))
                .collect(),
        ),
        Value::Element(handle) => WireValue::Object(vec![(
            marker::ELEMENT_FIELD.to_string(),
            WireValue::Int(i64::from(handle.target().0)),
        )]),
        Value::Callable(callable) => match callable.ctx() {
            Some(marker_obj) => deflate(&Value::Object(marker_obj)),
            None => {
                log::trace!(target: "worklet", "bound worklet with dead marker dropped during deflate");
                WireValue::Null
            }
        },
        Value::Ref(_) => {
            log::trace!(target: "worklet", "ref binding dropped during deflate");
            WireValue::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a `WireValue` from a JSON literal; numbers map to `Int` when
    /// integral.
    pub(crate) fn wire(v: &serde_json::Value) -> WireValue {
        match v {
            serde_json::Value::Null => WireValue::Null,
            serde_json::Value::Bool(b) => WireValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => WireValue::Int(i),
                None => WireValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => WireValue::Str(s.clone()),
            serde_json::Value::Array(items) => WireValue::List(items.iter().map(wire).collect()),
            serde_json::Value::Object(fields) => {
                WireValue::Object(fields.iter().map(|(k, v)| (k.clone(), wire(v))).collect())
            }
        }
    }

    #[test]
    fn inflate_builds_shared_object_graphs() {
        let w = wire(&serde_json::json!({
            "label": "outer",
            "inner": { "count": 3, "flags": [true, false] }
        }));
        let value = inflate(&w);
        let obj = value.as_object().expect("object").borrow();
        assert_eq!(obj.get("label").and_then(Value::as_str), Some("outer"));
        let inner = obj.get("inner").and_then(Value::as_object).expect("inner");
        assert_eq!(inner.borrow().get("count").and_then(Value::as_int), Some(3));
    }

    #[test]
    fn deflate_folds_element_handles_back_into_markers() {
        let value = Value::object([(
            "target".to_string(),
            Value::Element(ElementHandle::new(core_types::ElementRef(7))),
        )]);
        let w = deflate(&value);
        assert_eq!(
            w,
            WireValue::Object(vec![(
                "target".to_string(),
                WireValue::Object(vec![(
                    marker::ELEMENT_FIELD.to_string(),
                    WireValue::Int(7)
                )]),
            )])
        );
    }

    #[test]
    fn deflate_drops_ref_bindings() {
        let cell = Rc::new(RefCell::new(Value::Int(1)));
        let value = Value::object([("r".to_string(), Value::Ref(cell))]);
        assert_eq!(
            deflate(&value),
            WireValue::Object(vec![("r".to_string(), WireValue::Null)])
        );
    }
}

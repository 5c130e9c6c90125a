//! Structural marker classification.
//!
//! Marker objects are recognized by a distinguishing field, never by a type
//! tag. All marker kinds are classified here so new kinds are added in one
//! place.

use core_types::{ElementRef, FnHandleId, RefId, WorkletId};

use crate::value::{ObjectRef, Value};

/// Field carrying a foreign element reference.
pub const ELEMENT_FIELD: &str = "__element";
/// Field carrying a reference-table slot id.
pub const REF_FIELD: &str = "__ref_id";
/// Field carrying an inline worklet id; the object is a nested worklet ctx.
pub const WORKLET_FIELD: &str = "__worklet_id";
/// Field carrying a cross-context worklet id whose body is still in flight.
pub const PENDING_FIELD: &str = "__pending_id";
/// Field carrying a cross-context function handle.
pub const FOREIGN_FN_FIELD: &str = "__fn_id";
/// Field carrying the execution id stamped onto foreign function markers.
pub const EXEC_FIELD: &str = "__exec_id";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Marker {
    Plain,
    Element(ElementRef),
    WorkletRef(RefId),
    Worklet(WorkletId),
    Pending(WorkletId),
    ForeignFn(FnHandleId),
}

pub fn classify(obj: &ObjectRef) -> Marker {
    let fields = obj.borrow();
    if let Some(value) = fields.get(ELEMENT_FIELD) {
        return match small_id(value) {
            Some(id) => Marker::Element(ElementRef(id)),
            None => malformed(ELEMENT_FIELD, value),
        };
    }
    if let Some(value) = fields.get(REF_FIELD) {
        return match small_id(value) {
            Some(id) => Marker::WorkletRef(RefId(id)),
            None => malformed(REF_FIELD, value),
        };
    }
    if let Some(value) = fields.get(WORKLET_FIELD) {
        return match value.as_str() {
            Some(id) => Marker::Worklet(id.to_string()),
            None => malformed(WORKLET_FIELD, value),
        };
    }
    if let Some(value) = fields.get(PENDING_FIELD) {
        return match value.as_str() {
            Some(id) => Marker::Pending(id.to_string()),
            None => malformed(PENDING_FIELD, value),
        };
    }
    if let Some(value) = fields.get(FOREIGN_FN_FIELD) {
        return match small_id(value) {
            Some(id) => Marker::ForeignFn(FnHandleId(id)),
            None => malformed(FOREIGN_FN_FIELD, value),
        };
    }
    Marker::Plain
}

fn small_id(value: &Value) -> Option<u32> {
    value.as_int().and_then(|n| u32::try_from(n).ok())
}

fn malformed(field: &str, value: &Value) -> Marker {
    log::warn!(target: "worklet", "malformed marker field {field}: {value:?}");
    Marker::Plain
}

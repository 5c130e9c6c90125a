//! Worklet execution engine.
//!
//! Lets logic authored against background-context closures run inside the
//! main context: closure graphs arrive with structural markers standing in
//! for values that cannot cross the boundary, and the transformer rewrites
//! them into live bindings before the registered body runs.

pub mod gate;
pub mod lifecycle;
pub mod marker;
pub mod ref_table;
pub mod runtime;
pub mod value;

mod profile;
mod transform;

pub use crate::gate::ReadinessGate;
pub use crate::lifecycle::FnLifecycle;
pub use crate::marker::{Marker, classify};
pub use crate::ref_table::RefTable;
pub use crate::runtime::WorkletRuntime;
pub use crate::transform::WorkletError;
pub use crate::value::{
    BoundWorklet, ElementHandle, ObjectRef, Value, WireValue, WorkletBody, deflate, inflate,
};

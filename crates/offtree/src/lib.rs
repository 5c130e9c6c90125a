//! Off-tree document.
//!
//! A surrogate tree mutated in a background context: structural edits are
//! recorded into an append-only operation log for replay against the real
//! tree, and events forwarded from the real tree replay here through
//! capture, target and bubble phases.

pub mod events;
pub mod ops;
pub mod store;

pub use crate::events::{DispatchState, EventHandler, EventPhase, EventRecord, PropValue};
pub use crate::ops::{NodeId, TreeOp};
pub use crate::store::{Document, OffNode};

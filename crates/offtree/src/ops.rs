//! Off-tree mutation protocol.
//!
//! The operation log emitted by a surrogate document and replayed against a
//! real tree in another context.
//!
//! Invariants:
//! - Operations are applied in order; a batch is self-contained.
//! - Records reference node ids only, never live nodes, so a batch can cross
//!   a process boundary untouched.
//! - Element ids are non-zero and strictly increasing. `NodeId::DOCUMENT`
//!   identifies the document root and only ever appears as a parent.
//! - Creates precede any operation referencing the created id.
//! - The protocol is still evolving, so the enum is `#[non_exhaustive]`.

use std::sync::Arc;

/// Stable identity of a surrogate node across the context boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

impl NodeId {
    /// The document root. Never minted for an element.
    pub const DOCUMENT: NodeId = NodeId(0);
}

/// One tree-mutation record.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TreeOp {
    /// Create an element node.
    CreateElement { id: NodeId, tag: Arc<str> },
    /// Append a child to the end of a parent's children list.
    AppendChild { parent: NodeId, child: NodeId },
    /// Detach a child from its parent.
    RemoveChild { parent: NodeId, child: NodeId },
    /// Set or overwrite one attribute.
    SetAttribute {
        id: NodeId,
        name: Arc<str>,
        value: String,
    },
    /// Remove one attribute if present.
    RemoveAttribute { id: NodeId, name: Arc<str> },
    /// Set or overwrite one inline style property.
    SetStyleProperty {
        id: NodeId,
        name: Arc<str>,
        value: String,
    },
    /// Ask the real tree to start forwarding this event type for this node.
    EnableEvent { id: NodeId, event: Arc<str> },
}

//! Surrogate document and node store.
//!
//! Nodes live behind `Rc<RefCell<..>>` handles. The document's id table
//! keeps only weak entries, but the document is also the root of the tree:
//! it holds its top-level children strongly, and every attached node is
//! kept alive through its parent's child list. A node that is detached and
//! has no outside handle is collected and later lookups miss. Every
//! mutation appends one record to the pending operation log.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::events::EventHandler;
use crate::ops::{NodeId, TreeOp};

/// Shared handle to one surrogate node.
#[derive(Clone)]
pub struct OffNode {
    pub(crate) inner: Rc<RefCell<NodeData>>,
}

pub(crate) struct NodeData {
    pub(crate) id: NodeId,
    pub(crate) tag: Arc<str>,
    pub(crate) parent: Weak<RefCell<NodeData>>,
    pub(crate) children: Vec<OffNode>,
    pub(crate) attributes: Vec<(Arc<str>, String)>,
    pub(crate) styles: Vec<(Arc<str>, String)>,
    pub(crate) listeners: HashMap<Arc<str>, Vec<EventHandler>>,
}

impl OffNode {
    pub fn id(&self) -> NodeId {
        self.inner.borrow().id
    }

    pub fn tag(&self) -> Arc<str> {
        self.inner.borrow().tag.clone()
    }

    pub fn parent(&self) -> Option<OffNode> {
        self.inner
            .borrow()
            .parent
            .upgrade()
            .map(|inner| OffNode { inner })
    }

    pub fn children(&self) -> Vec<OffNode> {
        self.inner.borrow().children.clone()
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner
            .borrow()
            .attributes
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v.clone())
    }

    pub fn style_property(&self, name: &str) -> Option<String> {
        self.inner
            .borrow()
            .styles
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v.clone())
    }
}

impl std::fmt::Debug for OffNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.inner.borrow();
        f.debug_struct("OffNode")
            .field("id", &data.id)
            .field("tag", &data.tag)
            .field("children", &data.children.len())
            .finish_non_exhaustive()
    }
}

/// Off-tree document: tree root, id allocator, weak node table, pending
/// operation log.
pub struct Document {
    next_id: u32,
    nodes: HashMap<NodeId, Weak<RefCell<NodeData>>>,
    root: Vec<OffNode>,
    ops: Vec<TreeOp>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            nodes: HashMap::new(),
            root: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Creates a detached element. Ids start at 1 and are never reused, even
    /// after the node is collected.
    pub fn create_element(&mut self, tag: &str) -> OffNode {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        let tag: Arc<str> = Arc::from(tag);
        let node = OffNode {
            inner: Rc::new(RefCell::new(NodeData {
                id,
                tag: tag.clone(),
                parent: Weak::new(),
                children: Vec::new(),
                attributes: Vec::new(),
                styles: Vec::new(),
                listeners: HashMap::new(),
            })),
        };
        self.nodes.insert(id, Rc::downgrade(&node.inner));
        self.ops.push(TreeOp::CreateElement { id, tag });
        node
    }

    /// Looks an id up in the weak table. A miss means the node was collected
    /// after its last strong handle dropped; callers treat that as absent.
    pub fn get(&self, id: NodeId) -> Option<OffNode> {
        self.nodes
            .get(&id)
            .and_then(Weak::upgrade)
            .map(|inner| OffNode { inner })
    }

    /// Moves `child` to the end of the document's top-level children. The
    /// root holds its children strongly, so an attached tree outlives the
    /// handles that built it.
    pub fn append_to_root(&mut self, child: &OffNode) {
        self.detach(child);
        self.root.push(child.clone());
        self.ops.push(TreeOp::AppendChild {
            parent: NodeId::DOCUMENT,
            child: child.id(),
        });
    }

    /// Moves `child` to the end of `parent`'s children, detaching it from
    /// any previous parent first. An append that would make a node its own
    /// ancestor is rejected.
    pub fn append_child(&mut self, parent: &OffNode, child: &OffNode) {
        if would_cycle(parent, child) {
            log::warn!(
                target: "offtree",
                "rejected append of {:?} under {:?}: node would become its own ancestor",
                child.id(),
                parent.id()
            );
            return;
        }
        self.detach(child);
        child.inner.borrow_mut().parent = Rc::downgrade(&parent.inner);
        parent.inner.borrow_mut().children.push(child.clone());
        self.ops.push(TreeOp::AppendChild {
            parent: parent.id(),
            child: child.id(),
        });
    }

    /// Detaches `child` from its parent or from the document root.
    /// Detaching an already-detached node is a no-op and emits nothing.
    pub fn remove_child(&mut self, child: &OffNode) {
        let parent = if let Some(parent) = child.parent() {
            parent.id()
        } else if self.is_root_child(child) {
            NodeId::DOCUMENT
        } else {
            return;
        };
        self.detach(child);
        self.ops.push(TreeOp::RemoveChild {
            parent,
            child: child.id(),
        });
    }

    pub fn set_attribute(&mut self, node: &OffNode, name: &str, value: &str) {
        let name: Arc<str> = Arc::from(name);
        upsert(&mut node.inner.borrow_mut().attributes, &name, value);
        self.ops.push(TreeOp::SetAttribute {
            id: node.id(),
            name,
            value: value.to_string(),
        });
    }

    pub fn remove_attribute(&mut self, node: &OffNode, name: &str) {
        node.inner
            .borrow_mut()
            .attributes
            .retain(|(n, _)| n.as_ref() != name);
        self.ops.push(TreeOp::RemoveAttribute {
            id: node.id(),
            name: Arc::from(name),
        });
    }

    pub fn set_style_property(&mut self, node: &OffNode, name: &str, value: &str) {
        let name: Arc<str> = Arc::from(name);
        upsert(&mut node.inner.borrow_mut().styles, &name, value);
        self.ops.push(TreeOp::SetStyleProperty {
            id: node.id(),
            name,
            value: value.to_string(),
        });
    }

    /// Registers a handler. The first handler for a given event type on a
    /// node asks the real tree to start forwarding that event; later
    /// handlers piggyback on the existing subscription.
    pub fn add_listener(&mut self, node: &OffNode, event: &str, handler: EventHandler) {
        let event: Arc<str> = Arc::from(event);
        let first = {
            let mut data = node.inner.borrow_mut();
            let handlers = data.listeners.entry(event.clone()).or_default();
            handlers.push(handler);
            handlers.len() == 1
        };
        if first {
            self.ops.push(TreeOp::EnableEvent {
                id: node.id(),
                event,
            });
        }
    }

    /// Takes the pending operation log, leaving it empty. Mutations recorded
    /// after this call land in the next batch.
    pub fn commit(&mut self) -> Vec<TreeOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn pending_ops(&self) -> usize {
        self.ops.len()
    }

    /// Drops id-table entries whose nodes have been collected.
    pub fn purge(&mut self) {
        self.nodes.retain(|_, weak| weak.strong_count() > 0);
    }

    fn is_root_child(&self, child: &OffNode) -> bool {
        self.root
            .iter()
            .any(|n| Rc::ptr_eq(&n.inner, &child.inner))
    }

    fn detach(&mut self, child: &OffNode) {
        let parent = child.inner.borrow().parent.upgrade();
        match parent {
            Some(parent) => {
                parent
                    .borrow_mut()
                    .children
                    .retain(|n| !Rc::ptr_eq(&n.inner, &child.inner));
            }
            None => {
                self.root.retain(|n| !Rc::ptr_eq(&n.inner, &child.inner));
            }
        }
        child.inner.borrow_mut().parent = Weak::new();
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn upsert(entries: &mut Vec<(Arc<str>, String)>, name: &Arc<str>, value: &str) {
    match entries.iter_mut().find(|(n, _)| *n == *name) {
        Some((_, v)) => *v = value.to_string(),
        None => entries.push((name.clone(), value.to_string())),
    }
}

fn would_cycle(parent: &OffNode, child: &OffNode) -> bool {
    let mut cursor = Some(parent.clone());
    while let Some(node) = cursor {
        if Rc::ptr_eq(&node.inner, &child.inner) {
            return true;
        }
        cursor = node.parent();
    }
    false
}

//! Weak reference table.
//!
//! Maps small integer handles to ref cells owned elsewhere. The table never
//! keeps a cell alive: lookups race with collection by design and a dead
//! slot is an expected `None`, not an error.

use core_types::RefId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::value::Value;

pub type RefCellHandle = Rc<RefCell<Value>>;

#[derive(Default)]
pub struct RefTable {
    next_id: u32,
    slots: HashMap<RefId, Weak<RefCell<Value>>>,
}

impl RefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cell and returns its handle. Handles are never reused.
    pub fn put(&mut self, cell: &RefCellHandle) -> RefId {
        self.next_id += 1;
        let id = RefId(self.next_id);
        self.slots.insert(id, Rc::downgrade(cell));
        id
    }

    pub fn get(&self, id: RefId) -> Option<RefCellHandle> {
        self.slots.get(&id).and_then(Weak::upgrade)
    }

    pub fn remove(&mut self, id: RefId) {
        self.slots.remove(&id);
    }

    /// Drops slots whose cell has been collected.
    pub fn purge(&mut self) {
        self.slots.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

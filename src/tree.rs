//! In-memory object tree.
//!
//! One node per filesystem entry, held in a central map keyed by handle.
//! Parent/child structure uses first-child/next-sibling links expressed as
//! handles, so the graph has no owning cycles. Sibling order is an
//! implementation detail and not observable by the initiator.
//!
//! The tree also owns the secondary indices (path, PUOID, watch
//! descriptor); every mutation that links or unlinks a node goes through
//! methods here so no index can dangle.

use crate::object_info::ObjectInfo;
use crate::types::{ObjectHandle, Puoid};
use std::collections::HashMap;

/// One filesystem entry known to the store.
#[derive(Debug)]
pub struct StorageItem {
    pub handle: ObjectHandle,
    pub puoid: Puoid,
    /// Absolute filesystem path, UTF-8.
    pub path: String,
    pub parent: Option<ObjectHandle>,
    pub first_child: Option<ObjectHandle>,
    pub next_sibling: Option<ObjectHandle>,
    /// Notifier subscription id; −1 when the node is not watched.
    pub watch: i32,
    /// Composed MTP metadata, allocated lazily.
    pub object_info: Option<ObjectInfo>,
}

impl StorageItem {
    pub fn new(handle: ObjectHandle, path: impl Into<String>) -> Self {
        Self {
            handle,
            puoid: Puoid::ZERO,
            path: path.into(),
            parent: None,
            first_child: None,
            next_sibling: None,
            watch: -1,
            object_info: None,
        }
    }
}

#[derive(Default)]
pub struct ObjectTree {
    nodes: HashMap<ObjectHandle, StorageItem>,
    path_index: HashMap<String, ObjectHandle>,
    puoid_index: HashMap<Puoid, ObjectHandle>,
    watch_index: HashMap<i32, ObjectHandle>,
}

impl ObjectTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Lookup ───────────────────────────────────────────────────────

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.nodes.contains_key(&handle)
    }

    pub fn node(&self, handle: ObjectHandle) -> Option<&StorageItem> {
        self.nodes.get(&handle)
    }

    pub fn node_mut(&mut self, handle: ObjectHandle) -> Option<&mut StorageItem> {
        self.nodes.get_mut(&handle)
    }

    pub fn handle_at(&self, path: &str) -> Option<ObjectHandle> {
        self.path_index.get(path).copied()
    }

    pub fn handle_for_puoid(&self, puoid: &Puoid) -> Option<ObjectHandle> {
        self.puoid_index.get(puoid).copied()
    }

    pub fn watch_owner(&self, watch: i32) -> Option<ObjectHandle> {
        self.watch_index.get(&watch).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Snapshot of all handles, for iteration that mutates the tree.
    pub fn handles(&self) -> Vec<ObjectHandle> {
        self.nodes.keys().copied().collect()
    }

    /// Children of `handle` in sibling order.
    pub fn children(&self, handle: ObjectHandle) -> Vec<ObjectHandle> {
        let mut out = Vec::new();
        let mut cursor = self.nodes.get(&handle).and_then(|n| n.first_child);
        while let Some(child) = cursor {
            out.push(child);
            cursor = self.nodes.get(&child).and_then(|n| n.next_sibling);
        }
        out
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Inserts a node and registers it in the path and PUOID indices.
    /// The caller links it to a parent separately.
    pub fn insert(&mut self, item: StorageItem) {
        self.path_index.insert(item.path.clone(), item.handle);
        if !item.puoid.is_zero() {
            self.puoid_index.insert(item.puoid, item.handle);
        }
        self.nodes.insert(item.handle, item);
    }

    /// Registers a late-assigned PUOID for an existing node.
    pub fn index_puoid(&mut self, handle: ObjectHandle, puoid: Puoid) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.puoid = puoid;
            self.puoid_index.insert(puoid, handle);
        }
    }

    /// Removes a node and every index entry pointing at it. The node must
    /// already be unlinked from its parent.
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<StorageItem> {
        let item = self.nodes.remove(&handle)?;
        self.path_index.remove(&item.path);
        self.puoid_index.remove(&item.puoid);
        if item.watch != -1 {
            self.watch_index.remove(&item.watch);
        }
        Some(item)
    }

    /// Makes `child` the first child of `parent`.
    pub fn link_child(&mut self, child: ObjectHandle, parent: ObjectHandle) {
        let old_first = match self.nodes.get_mut(&parent) {
            Some(node) => {
                let old = node.first_child;
                node.first_child = Some(child);
                old
            }
            None => return,
        };
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
            node.next_sibling = old_first;
        }
    }

    /// Unlinks `child` from its parent's sibling list. Clears the sibling
    /// link but keeps `parent` set, for callers that still need it.
    pub fn unlink_child(&mut self, child: ObjectHandle) {
        let (parent, next) = match self.nodes.get(&child) {
            Some(node) => (node.parent, node.next_sibling),
            None => return,
        };
        let Some(parent) = parent else { return };

        let first = self.nodes.get(&parent).and_then(|n| n.first_child);
        if first == Some(child) {
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.first_child = next;
            }
        } else {
            // Walk the sibling chain to the predecessor.
            let mut cursor = first;
            while let Some(current) = cursor {
                let sibling = self.nodes.get(&current).and_then(|n| n.next_sibling);
                if sibling == Some(child) {
                    if let Some(node) = self.nodes.get_mut(&current) {
                        node.next_sibling = next;
                    }
                    break;
                }
                cursor = sibling;
            }
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.next_sibling = None;
        }
    }

    /// Moves a node's path index entry after a rename or move. The caller
    /// updates `node.path` itself.
    pub fn reindex_path(&mut self, old_path: &str, new_path: &str, handle: ObjectHandle) {
        self.path_index.remove(old_path);
        self.path_index.insert(new_path.to_string(), handle);
    }

    pub fn set_watch(&mut self, handle: ObjectHandle, watch: i32) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            if node.watch != -1 {
                self.watch_index.remove(&node.watch);
            }
            node.watch = watch;
            if watch != -1 {
                self.watch_index.insert(watch, handle);
            }
        }
    }

    pub fn clear_watch(&mut self, handle: ObjectHandle) -> i32 {
        match self.nodes.get_mut(&handle) {
            Some(node) if node.watch != -1 => {
                let watch = node.watch;
                node.watch = -1;
                self.watch_index.remove(&watch);
                watch
            }
            _ => -1,
        }
    }
}

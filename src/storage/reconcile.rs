//! Reconciliation of external filesystem changes.
//!
//! The change notifier reports what other processes do to the backing
//! directory; this module repairs the in-memory tree to match and emits
//! the corresponding MTP events. Rename pairs arrive as separate
//! MOVED_FROM/MOVED_TO notifications glued together by a cookie, so the
//! most recent unpaired MOVED_FROM is cached in a single slot until its
//! partner, a conflicting event, or an idle flush resolves it.
//!
//! Reconciliation never fails: problems are logged and skipped, because an
//! event stream that is momentarily ahead of (or behind) the tree is
//! normal.

use super::{FsStorage, PendingMove};
use crate::types::{StorageEvent, ROOT_HANDLE};
use crate::watcher::{FsChangeEvent, FsEventKind};

impl FsStorage {
    /// Feeds one notifier event through the reconciliation table.
    pub fn handle_fs_event(&mut self, event: FsChangeEvent) {
        match event.kind {
            FsEventKind::MovedFrom => {
                // A second MOVED_FROM means the first one's partner never
                // came: that entry left the storage.
                if let Some(pending) = self.pending_move.take() {
                    self.reconcile_delete(pending.watch, &pending.name);
                }
                self.pending_move = Some(PendingMove {
                    watch: event.watch,
                    cookie: event.cookie,
                    name: event.name,
                });
            }
            FsEventKind::MovedTo => match self.pending_move.take() {
                Some(pending) if pending.cookie == event.cookie => {
                    self.reconcile_move(pending.watch, &pending.name, event.watch, &event.name);
                }
                pending => {
                    if let Some(pending) = pending {
                        self.reconcile_delete(pending.watch, &pending.name);
                    }
                    // Moved in from outside the storage: a new object.
                    self.reconcile_create(event.watch, &event.name);
                }
            },
            FsEventKind::Create => self.reconcile_create(event.watch, &event.name),
            FsEventKind::Delete => {
                if let Some(pending) = self.pending_move.take() {
                    self.reconcile_delete(pending.watch, &pending.name);
                }
                self.reconcile_delete(event.watch, &event.name);
            }
            FsEventKind::CloseWrite => self.reconcile_modify(event.watch, &event.name),
        }
    }

    /// Flushes a cached MOVED_FROM whose partner never arrived. Hosts call
    /// this when the event queue drains.
    pub fn flush_pending_move(&mut self) {
        if let Some(pending) = self.pending_move.take() {
            self.reconcile_delete(pending.watch, &pending.name);
        }
    }

    // ── Event handlers ───────────────────────────────────────────────

    fn reconcile_create(&mut self, watch: i32, name: &str) {
        let Some(parent) = self.tree.watch_owner(watch) else { return };
        let Some(parent_node) = self.tree.node(parent) else { return };
        if parent_node.watch != watch {
            return;
        }
        let path = format!("{}/{name}", parent_node.path);
        if self.tree.handle_at(&path).is_none() {
            log::info!("Reconciler: adding {name}");
            let _ = self.add_to_storage(&path, None, false, true, None, None);
            self.emit(StorageEvent::StorageInfoChanged {
                storage_id: self.storage_id,
            });
        }
    }

    fn reconcile_delete(&mut self, watch: i32, name: &str) {
        let Some(parent) = self.tree.watch_owner(watch) else { return };
        let Some(parent_node) = self.tree.node(parent) else { return };
        let path = format!("{}/{name}", parent_node.path);
        if let Some(handle) = self.tree.handle_at(&path) {
            log::info!("Reconciler: deleting {name}");
            let _ = self.delete_item_helper(handle, false, true);
        }
        self.emit(StorageEvent::StorageInfoChanged {
            storage_id: self.storage_id,
        });
    }

    fn reconcile_move(&mut self, from_watch: i32, from_name: &str, to_watch: i32, to_name: &str) {
        if from_watch == to_watch && from_name == to_name {
            return;
        }
        let Some(from_parent) = self.tree.watch_owner(from_watch) else { return };
        let Some(to_parent) = self.tree.watch_owner(to_watch) else { return };

        // Stale watch ids mean the tree moved on; drop the event.
        let from_ok = self.tree.node(from_parent).map(|n| n.watch == from_watch).unwrap_or(false);
        let to_ok = self.tree.node(to_parent).map(|n| n.watch == to_watch).unwrap_or(false);
        if !from_ok || !to_ok {
            return;
        }

        let old_path = format!("{}/{from_name}", self.tree.node(from_parent).expect("checked").path);
        let Some(moved) = self.tree.handle_at(&old_path) else {
            // Already handled.
            return;
        };
        let new_path = format!("{}/{to_name}", self.tree.node(to_parent).expect("checked").path);
        if self.tree.handle_at(&new_path).is_some() {
            // The destination is already in the tree, so only the source
            // entry needs to go.
            log::info!("Reconciler: move target {to_name} already known, dropping source");
            let _ = self.delete_item_helper(moved, false, true);
            return;
        }

        if from_watch == to_watch {
            // Rename within one directory.
            log::info!("Reconciler: renaming {from_name} -> {to_name}");
            self.tree.reindex_path(&old_path, &new_path, moved);
            self.puoids.rename(&old_path, &new_path);
            if let Some(node) = self.tree.node_mut(moved) {
                node.path = new_path.clone();
                if let Some(info) = node.object_info.as_mut() {
                    info.file_name = to_name.to_string();
                }
            }
            for child in self.tree.children(moved) {
                self.adjust_moved_paths(child, &new_path, false);
            }
            self.remove_watch_recursively(moved);
            self.add_watch_recursively(moved);
        } else {
            log::info!("Reconciler: moving {from_name} -> {to_name}");
            let _ = self.move_object_within(moved, to_parent, false);
        }

        self.refresh_object_info(moved);
        self.emit(StorageEvent::ObjectInfoChanged { handle: moved });
    }

    fn reconcile_modify(&mut self, watch: i32, name: &str) {
        let Some(parent) = self.tree.watch_owner(watch) else { return };
        let Some(parent_node) = self.tree.node(parent) else { return };
        if parent_node.watch != watch {
            return;
        }
        let path = format!("{}/{name}", parent_node.path);
        let Some(handle) = self.tree.handle_at(&path) else { return };
        if handle == ROOT_HANDLE {
            return;
        }

        // An in-flight initiator write owns this file; the close events it
        // produces are echoes, not news.
        if self.write_slot.as_ref().map(|slot| slot.handle) == Some(handle) {
            return;
        }

        log::info!("Reconciler: modified {name}");
        self.refresh_object_info(handle);
        self.emit(StorageEvent::ObjectInfoChanged { handle });

        // Free space may have drifted; report it once it moves ≥ 1%.
        self.storage_info.refresh(std::path::Path::new(&self.root_path));
        let free = self.storage_info.free_space;
        let drift = self.last_free_space.abs_diff(free);
        if self.last_free_space > 0 && drift * 100 / self.last_free_space >= 1 {
            self.last_free_space = free;
            self.emit(StorageEvent::StorageInfoChanged {
                storage_id: self.storage_id,
            });
        }
    }
}

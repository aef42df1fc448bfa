//! Object operations: add, delete, copy, move, data transfer, references.

use super::{parent_path_of, FsStorage, WriteSlot};
use crate::error::{ResponseCode, Result};
use crate::formats;
use crate::object_info::ObjectInfo;
use crate::tree::StorageItem;
use crate::types::{ObjectFormat, ObjectHandle, StorageEvent, HANDLE_ALL, ROOT_HANDLE};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

impl FsStorage {
    // ── Adding objects ───────────────────────────────────────────────

    /// Registers a filesystem entry (and, for directories, its contents)
    /// in the store. Idempotent: a path that already has a node returns
    /// its existing handle.
    ///
    /// `info` carries an initiator-supplied dataset to adopt instead of
    /// composing one; `fixed_handle` lets cross-store operations preserve
    /// the source handle; `yielder` is invoked every 16 directory entries
    /// during recursive walks.
    pub fn add_to_storage(
        &mut self,
        path: &str,
        info: Option<&ObjectInfo>,
        create_if_not_exist: bool,
        send_event: bool,
        fixed_handle: Option<ObjectHandle>,
        mut yielder: Option<&mut dyn FnMut()>,
    ) -> Result<ObjectHandle> {
        if self.exclude_paths.contains(path) {
            return Err(ResponseCode::AccessDenied);
        }
        if let Some(existing) = self.tree.handle_at(path) {
            return Ok(existing);
        }

        let is_root = path == self.root_path;
        let parent = if is_root {
            None
        } else {
            Some(self.tree.handle_at(&parent_path_of(path)).unwrap_or(ROOT_HANDLE))
        };

        // The storage root is pinned to handle 0.
        let handle = if is_root {
            ROOT_HANDLE
        } else {
            fixed_handle.unwrap_or_else(|| self.handles.allocate_handle())
        };

        let mut object_info = match info {
            Some(supplied) => {
                let mut adopted = supplied.clone();
                adopted.storage_id = self.storage_id;
                adopted.parent_object = parent.unwrap_or(ROOT_HANDLE);
                adopted
            }
            None => crate::object_info::compose_object_info(
                path,
                self.storage_id,
                parent.unwrap_or(ROOT_HANDLE),
                self.thumbnailer.as_ref(),
            ),
        };
        let is_association = object_info.object_format.is_association();

        if create_if_not_exist {
            if is_association {
                create_directory(path)?;
            } else {
                create_file(path)?;
            }
        }

        // Dates always come from our filesystem, even for adopted infos.
        object_info.capture_date = formats::created_date(Path::new(path));
        object_info.modification_date = formats::modified_date(Path::new(path));

        let mut item = StorageItem::new(handle, path);
        item.puoid = self.assign_puoid(path);
        item.object_info = Some(object_info);
        self.tree.insert(item);
        if let Some(parent) = parent {
            self.tree.link_child(handle, parent);
        }

        if is_association {
            self.add_watch_descriptor(handle);

            // Recursively add the directory contents, hidden entries
            // included. Child failures are tolerated; the walk continues.
            let mut children: Vec<String> = Vec::new();
            if let Ok(entries) = std::fs::read_dir(path) {
                for entry in entries.flatten() {
                    if let Some(child_path) = entry.path().to_str() {
                        children.push(child_path.to_string());
                    }
                }
            }
            for (index, child_path) in children.iter().enumerate() {
                if index % 16 == 0 {
                    if let Some(y) = &mut yielder {
                        y();
                    }
                }
                let child_yielder: Option<&mut dyn FnMut()> = match &mut yielder {
                    Some(y) => Some(&mut **y),
                    None => None,
                };
                let _ = self.add_to_storage(
                    child_path,
                    None,
                    create_if_not_exist,
                    send_event,
                    None,
                    child_yielder,
                );
            }
        }

        if send_event {
            self.emit(StorageEvent::ObjectAdded { handle });
        }

        Ok(handle)
    }

    /// SendObjectInfo: creates a new (empty) object under `parent_handle`.
    /// 0xFFFFFFFF leaves the parent choice to us: the root.
    pub fn add_item(&mut self, parent_handle: ObjectHandle, info: &ObjectInfo) -> Result<ObjectHandle> {
        if info.file_name.is_empty() {
            return Err(ResponseCode::InvalidDataset);
        }
        let parent = if parent_handle == HANDLE_ALL { ROOT_HANDLE } else { parent_handle };
        if !self.tree.contains(parent) {
            return Err(ResponseCode::InvalidParentObject);
        }
        let path = format!("{}/{}", self.tree.node(parent).expect("checked").path, info.file_name);
        self.add_to_storage(&path, Some(info), true, false, None, None)
    }

    fn assign_puoid(&mut self, path: &str) -> crate::types::Puoid {
        if let Some(existing) = self.puoids.get(path) {
            return existing;
        }
        match self.puoid_allocator.as_mut() {
            Some(allocator) => {
                let puoid = allocator.allocate_puoid();
                self.puoids.record_external(path, puoid);
                puoid
            }
            None => self.puoids.lookup_or_allocate(path),
        }
    }

    // ── Deleting objects ─────────────────────────────────────────────

    /// DeleteObject. `HANDLE_ALL` deletes every deletable object,
    /// optionally narrowed to one format; partial success maps to
    /// PartialDeletion as MTP 1.1 D.2.11 requires.
    pub fn delete_item(&mut self, handle: ObjectHandle, format_filter: Option<ObjectFormat>) -> Result<()> {
        if handle != HANDLE_ALL {
            return self.delete_item_helper(handle, true, false);
        }

        let filter = format_filter.filter(|format| *format != ObjectFormat::Undefined);
        let mut deleted_some = false;
        let mut failed_some = false;
        let mut last_error = ResponseCode::GeneralError;

        // Deletion mutates the tree, so iterate a snapshot. The root is
        // not an initiator-visible object and is skipped outright.
        for candidate in self.tree.handles() {
            if candidate == ROOT_HANDLE {
                continue;
            }
            if !self.tree.contains(candidate) {
                continue;
            }
            if let Some(wanted) = filter {
                if self.node_format(candidate) != wanted {
                    continue;
                }
            }
            match self.delete_item_helper(candidate, true, false) {
                Ok(()) => deleted_some = true,
                // A handle that vanished mid-loop was removed by an
                // earlier recursive directory delete; not a failure.
                Err(ResponseCode::InvalidObjectHandle) => {}
                Err(error) => {
                    failed_some = true;
                    last_error = error;
                }
            }
        }

        if deleted_some && failed_some {
            Err(ResponseCode::PartialDeletion)
        } else if failed_some {
            Err(last_error)
        } else {
            Ok(())
        }
    }

    /// Post-order single-object delete. `remove_physically` is false when
    /// the filesystem entry is already gone (reconciler deletes).
    pub(crate) fn delete_item_helper(
        &mut self,
        handle: ObjectHandle,
        remove_physically: bool,
        send_event: bool,
    ) -> Result<()> {
        if !self.tree.contains(handle) {
            return Err(ResponseCode::InvalidObjectHandle);
        }
        // Deleting the whole backing directory is too dangerous.
        if handle == ROOT_HANDLE {
            return Err(ResponseCode::ObjectWriteProtected);
        }

        let has_children = self.tree.node(handle).and_then(|node| node.first_child).is_some();
        if !has_children {
            let path = self.tree.node(handle).expect("checked").path.clone();
            let format = self.node_format(handle);
            if remove_physically {
                let removed = if format.is_association() {
                    std::fs::remove_dir(&path)
                } else {
                    std::fs::remove_file(&path)
                };
                if let Err(e) = removed {
                    log::warn!("Cannot remove {path}: {e}");
                    return Err(ResponseCode::GeneralError);
                }
            }
            if format.is_abstract_playlist() {
                self.metadata.delete_playlist(&path);
            }
            self.remove_from_storage(handle, send_event);
            return Ok(());
        }

        // Non-empty directory: children first. Always restart from the
        // current first child, because each delete rewrites the sibling
        // list.
        loop {
            let Some(child) = self.tree.node(handle).and_then(|node| node.first_child) else {
                break;
            };
            if self.delete_item_helper(child, remove_physically, send_event).is_err() {
                return Err(ResponseCode::PartialDeletion);
            }
        }
        self.delete_item_helper(handle, remove_physically, send_event)
    }

    fn remove_from_storage(&mut self, handle: ObjectHandle, send_event: bool) {
        self.remove_watch_descriptor(handle);
        self.tree.unlink_child(handle);
        self.tree.remove(handle);
        if send_event {
            self.emit(StorageEvent::ObjectRemoved { handle });
        }
    }

    // ── Copying objects ──────────────────────────────────────────────

    /// CopyObject into another store. The destination reconstructs the
    /// subtree under the source's handles (handle spaces are independent
    /// per store) and streams file content across.
    pub fn copy_object_to(
        &self,
        handle: ObjectHandle,
        destination: &mut FsStorage,
        destination_parent: ObjectHandle,
    ) -> Result<ObjectHandle> {
        if !self.tree.contains(handle) {
            return Err(ResponseCode::InvalidObjectHandle);
        }
        if !destination.tree.contains(destination_parent) {
            return Err(ResponseCode::InvalidParentObject);
        }

        let info = self.object_info_snapshot(handle)?;
        if destination.storage_info().free_space < info.compressed_size {
            return Err(ResponseCode::StoreFull);
        }

        let destination_path = format!(
            "{}/{}",
            destination.tree.node(destination_parent).expect("checked").path,
            info.file_name
        );
        if info.object_format.is_association() && destination.tree.handle_at(&destination_path).is_some() {
            return Err(ResponseCode::InvalidParentObject);
        }

        destination.copy_handle_from(self, handle, destination_parent)?;
        Ok(handle)
    }

    /// Rebuilds `source_handle` (and its subtree) from `source` inside
    /// this store, keeping the same handle values.
    pub fn copy_handle_from(
        &mut self,
        source: &FsStorage,
        source_handle: ObjectHandle,
        parent: ObjectHandle,
    ) -> Result<()> {
        if self.tree.contains(source_handle) {
            return Err(ResponseCode::InvalidDataset);
        }
        let parent = if parent == HANDLE_ALL { ROOT_HANDLE } else { parent };
        if !self.tree.contains(parent) {
            return Err(ResponseCode::InvalidParentObject);
        }

        let mut info = source.object_info_snapshot(source_handle)?;
        info.parent_object = parent;

        let path = format!("{}/{}", self.tree.node(parent).expect("checked").path, info.file_name);

        // Keep the reconciler away from the files we are about to create.
        let parent_watch_suspended = self.tree.node(parent).map(|node| node.watch != -1).unwrap_or(false);
        if parent_watch_suspended {
            self.remove_watch_descriptor(parent);
        }

        let result = self.copy_handle_inner(source, source_handle, &info, &path);

        if parent_watch_suspended {
            self.add_watch_descriptor(parent);
        }
        result
    }

    fn copy_handle_inner(
        &mut self,
        source: &FsStorage,
        source_handle: ObjectHandle,
        info: &ObjectInfo,
        path: &str,
    ) -> Result<()> {
        self.add_to_storage(path, Some(info), true, false, Some(source_handle), None)?;

        if info.object_format.is_association() {
            for child in source.tree.children(source_handle) {
                self.copy_handle_from(source, child, source_handle)?;
            }
            return Ok(());
        }

        let source_path = source.tree.node(source_handle).expect("validated").path.clone();
        let copied = copy_file_bytes(&source_path, path)?;
        if let Some(node_info) = self
            .tree
            .node_mut(source_handle)
            .and_then(|node| node.object_info.as_mut())
        {
            node_info.compressed_size = copied;
        }
        Ok(())
    }

    /// CopyObject within this store. Fresh handles are allocated for the
    /// copies.
    pub fn copy_object_within(&mut self, handle: ObjectHandle, destination_parent: ObjectHandle) -> Result<ObjectHandle> {
        self.copy_within_at_depth(handle, destination_parent, 0)
    }

    fn copy_within_at_depth(
        &mut self,
        handle: ObjectHandle,
        destination_parent: ObjectHandle,
        depth: u32,
    ) -> Result<ObjectHandle> {
        if !self.tree.contains(handle) {
            return Err(ResponseCode::InvalidObjectHandle);
        }
        if !self.tree.contains(destination_parent) {
            return Err(ResponseCode::InvalidParentObject);
        }

        let mut info = self.object_info_snapshot(handle)?;
        if self.storage_info().free_space < info.compressed_size {
            return Err(ResponseCode::StoreFull);
        }

        let source_path = self.tree.node(handle).expect("checked").path.clone();
        let destination_path = format!(
            "{}/{}",
            self.tree.node(destination_parent).expect("checked").path,
            info.file_name
        );

        // Refuse copying a directory onto itself, but only at the top of
        // the recursion; descendants overwrite freely.
        if depth == 0
            && info.object_format.is_association()
            && self.tree.handle_at(&destination_path).is_some()
        {
            return Err(ResponseCode::InvalidParentObject);
        }

        info.parent_object = destination_parent;
        self.metadata.copy_path(&source_path, &destination_path);

        let parent_watch_suspended = self
            .tree
            .node(destination_parent)
            .map(|node| node.watch != -1)
            .unwrap_or(false);
        if parent_watch_suspended {
            self.remove_watch_descriptor(destination_parent);
        }

        let result = (|| {
            let copied = self.add_to_storage(&destination_path, Some(&info), true, false, None, None)?;
            if info.object_format.is_association() {
                for child in self.tree.children(handle) {
                    self.copy_within_at_depth(child, copied, depth + 1)?;
                }
            } else {
                let written = copy_file_bytes(&source_path, &destination_path)?;
                if let Some(node_info) = self.tree.node_mut(copied).and_then(|node| node.object_info.as_mut()) {
                    node_info.compressed_size = written;
                }
            }
            Ok(copied)
        })();

        if parent_watch_suspended {
            self.add_watch_descriptor(destination_parent);
        }
        result
    }

    // ── Moving objects ───────────────────────────────────────────────

    /// MoveObject into another store: rebuild there, delete here.
    pub fn move_object_to(
        &mut self,
        handle: ObjectHandle,
        destination: &mut FsStorage,
        destination_parent: ObjectHandle,
    ) -> Result<()> {
        if !self.tree.contains(handle) {
            return Err(ResponseCode::InvalidObjectHandle);
        }
        destination.copy_handle_from(self, handle, destination_parent)?;
        self.delete_item(handle, None)
    }

    /// MoveObject within this store. `move_physically` is false when the
    /// filesystem already reflects the move (reconciler-driven moves).
    pub fn move_object_within(
        &mut self,
        handle: ObjectHandle,
        destination_parent: ObjectHandle,
        move_physically: bool,
    ) -> Result<()> {
        if !self.tree.contains(handle) {
            return Err(ResponseCode::InvalidObjectHandle);
        }
        if !self.tree.contains(destination_parent) {
            return Err(ResponseCode::InvalidParentObject);
        }

        let source_path = self.tree.node(handle).expect("checked").path.clone();
        if source_path == self.playlist_path {
            log::warn!("Refusing to move the Playlists directory");
            return Err(ResponseCode::AccessDenied);
        }

        self.ensure_object_info(handle);
        let info = self.object_info_snapshot(handle)?;
        let destination_path = format!(
            "{}/{}",
            self.tree.node(destination_parent).expect("checked").path,
            info.file_name
        );

        // Never overwrite an existing directory.
        if info.object_format.is_association() && self.tree.handle_at(&destination_path).is_some() {
            return Err(ResponseCode::InvalidParentObject);
        }

        // Paths of the whole subtree are about to change; stale watches
        // would resolve events against the old tree.
        self.remove_watch_recursively(handle);

        if move_physically {
            if let Err(e) = std::fs::rename(&source_path, &destination_path) {
                log::warn!("Rename {source_path} -> {destination_path} failed: {e}");
                self.add_watch_recursively(handle);
                return Err(ResponseCode::InvalidParentObject);
            }
        }

        self.tree.reindex_path(&source_path, &destination_path, handle);
        self.puoids.rename(&source_path, &destination_path);
        self.tree.unlink_child(handle);

        for child in self.tree.children(handle) {
            self.adjust_moved_paths(child, &destination_path, true);
        }

        self.tree.link_child(handle, destination_parent);
        self.metadata.move_path(&source_path, &destination_path);
        if info.object_format.is_abstract_playlist() {
            self.metadata.move_playlist(&source_path, &destination_path);
        }

        if let Some(node) = self.tree.node_mut(handle) {
            node.path = destination_path;
            if let Some(node_info) = node.object_info.as_mut() {
                node_info.parent_object = destination_parent;
            }
        }
        self.add_watch_recursively(handle);
        Ok(())
    }

    /// Re-keys a moved subtree under its new ancestor path, fixing the
    /// path index and PUOID registry and, when asked, the metadata store.
    pub(crate) fn adjust_moved_paths(&mut self, handle: ObjectHandle, new_ancestor: &str, update_metadata: bool) {
        let Some(node) = self.tree.node(handle) else { return };
        let old_path = node.path.clone();
        let name = node
            .object_info
            .as_ref()
            .map(|info| info.file_name.clone())
            .unwrap_or_else(|| old_path.rsplit('/').next().unwrap_or_default().to_string());
        let is_playlist = self.node_format(handle).is_abstract_playlist();

        let new_path = format!("{new_ancestor}/{name}");
        self.tree.reindex_path(&old_path, &new_path, handle);
        self.puoids.rename(&old_path, &new_path);
        if update_metadata {
            self.metadata.move_path(&old_path, &new_path);
            if is_playlist {
                self.metadata.move_playlist(&old_path, &new_path);
            }
        }
        if let Some(node) = self.tree.node_mut(handle) {
            node.path = new_path.clone();
        }
        for child in self.tree.children(handle) {
            self.adjust_moved_paths(child, &new_path, update_metadata);
        }
    }

    // ── Data transfer ────────────────────────────────────────────────

    /// Reads exactly `buf.len()` bytes at `offset`. Short files are an
    /// error, not a short read.
    pub fn read_data(&self, handle: ObjectHandle, offset: u64, buf: &mut [u8]) -> Result<()> {
        if !self.tree.contains(handle) {
            return Err(ResponseCode::InvalidObjectHandle);
        }
        let path = self.tree.node(handle).expect("checked").path.clone();

        let mut file = File::open(&path).map_err(|_| ResponseCode::GeneralError)?;
        let size = file.metadata().map_err(|_| ResponseCode::GeneralError)?.len();
        if size < offset + buf.len() as u64 {
            return Err(ResponseCode::GeneralError);
        }
        file.seek(SeekFrom::Start(offset)).map_err(|_| ResponseCode::GeneralError)?;
        file.read_exact(buf).map_err(|_| ResponseCode::GeneralError)?;
        Ok(())
    }

    /// Segmented SendObject writes. The first segment truncates the
    /// backing file; the file stays open in the single write slot across
    /// segments; a final call with no data releases the slot. Info-changed
    /// events for the handle are suppressed while the slot is held.
    pub fn write_data(
        &mut self,
        handle: ObjectHandle,
        data: Option<&[u8]>,
        first_segment: bool,
        last_segment: bool,
    ) -> Result<()> {
        if !self.tree.contains(handle) {
            return Err(ResponseCode::InvalidObjectHandle);
        }

        if last_segment && data.is_none() {
            self.write_slot = None;
            // The transfer is complete; sizes and dates come from disk now.
            self.refresh_object_info(handle);
            return Ok(());
        }

        if first_segment {
            let path = self.tree.node(handle).expect("checked").path.clone();
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .map_err(|_| ResponseCode::GeneralError)?;
            file.set_len(0).map_err(|_| ResponseCode::GeneralError)?;
            self.write_slot = Some(WriteSlot { handle, file });
        }

        let Some(slot) = self.write_slot.as_mut() else {
            return Err(ResponseCode::GeneralError);
        };
        if let Some(data) = data {
            if let Err(e) = slot.file.write_all(data) {
                log::warn!("Writing object data failed: {e}");
                return Err(ResponseCode::GeneralError);
            }
        }
        Ok(())
    }

    /// Resizes an object's backing file. Associations cannot be truncated.
    pub fn truncate(&mut self, handle: ObjectHandle, size: u64) -> Result<()> {
        if !self.tree.contains(handle) {
            return Err(ResponseCode::InvalidObjectHandle);
        }
        if self.node_format(handle).is_association() {
            return Err(ResponseCode::GeneralError);
        }
        let path = self.tree.node(handle).expect("checked").path.clone();
        let file = OpenOptions::new().write(true).open(&path).map_err(|_| ResponseCode::GeneralError)?;
        file.set_len(size).map_err(|_| ResponseCode::GeneralError)?;

        self.ensure_object_info(handle);
        if let Some(info) = self.tree.node_mut(handle).and_then(|node| node.object_info.as_mut()) {
            info.compressed_size = size;
        }
        Ok(())
    }

    // ── Object references ────────────────────────────────────────────

    /// GetObjectReferences, with dangling targets elided permanently.
    pub fn get_references(&mut self, handle: ObjectHandle) -> Result<Vec<ObjectHandle>> {
        if !self.tree.contains(handle) {
            self.references.remove_invalid(handle);
            return Err(ResponseCode::InvalidObjectHandle);
        }
        let tree = &self.tree;
        Ok(self.references.get_pruned(handle, |target| tree.contains(target)))
    }

    /// SetObjectReferences: replaces the list wholesale. Abstract
    /// playlists additionally push their member paths to the metadata
    /// store.
    pub fn set_references(&mut self, handle: ObjectHandle, references: Vec<ObjectHandle>) -> Result<()> {
        if !self.tree.contains(handle) {
            return Err(ResponseCode::InvalidObjectHandle);
        }
        let is_playlist = self.node_format(handle).is_abstract_playlist();
        let mut entries = Vec::new();
        for &target in &references {
            match self.tree.node(target) {
                Some(node) => {
                    if is_playlist {
                        entries.push(node.path.clone());
                    }
                }
                None => return Err(ResponseCode::InvalidObjectReference),
            }
        }
        self.references.set(handle, references);
        if is_playlist {
            let path = self.tree.node(handle).expect("checked").path.clone();
            self.metadata.save_playlist(&path, &entries);
        }
        Ok(())
    }
}

// ── Filesystem helpers ───────────────────────────────────────────────

fn create_file(path: &str) -> Result<()> {
    match OpenOptions::new().read(true).write(true).create(true).open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(ResponseCode::AccessDenied),
        Err(_) => Err(ResponseCode::GeneralError),
    }
}

fn create_directory(path: &str) -> Result<()> {
    if Path::new(path).is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|_| ResponseCode::GeneralError)
}

/// Opaque byte copy preserving length. Returns the number of bytes
/// written.
fn copy_file_bytes(source: &str, destination: &str) -> Result<u64> {
    let mut from = File::open(source).map_err(|_| ResponseCode::GeneralError)?;
    let mut to = File::create(destination).map_err(|_| ResponseCode::GeneralError)?;
    std::io::copy(&mut from, &mut to).map_err(|_| ResponseCode::GeneralError)
}

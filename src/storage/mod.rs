//! The filesystem-backed storage aggregate.
//!
//! One [`FsStorage`] exports one native directory as an MTP object store.
//! It owns the in-memory object tree and its indices, the persistent PUOID
//! registry, the reference graph, and the reconciliation of external
//! filesystem changes. All methods run on one event loop; mutation is
//! exclusive by construction and long work yields cooperatively.
//!
//! Lifecycle: construct, then call [`FsStorage::enumerate`] (the tree is
//! not populated before the `Ready` event), operate, then
//! [`FsStorage::shutdown`] to flush persistent state.

mod ops;
mod playlists;
mod properties;
mod reconcile;

use crate::collaborators::{ChangeNotifier, Collaborators, EventSink, HandleAllocator, MetadataStore, PuoidAllocator, Thumbnailer};
use crate::config::StorageConfig;
use crate::error::{ResponseCode, Result};
use crate::object_info::{compose_object_info, ObjectInfo, StorageInfo};
use crate::puoid::PuoidRegistry;
use crate::references::ReferenceGraph;
use crate::tree::ObjectTree;
use crate::types::{ObjectFormat, ObjectHandle, Puoid, StorageEvent, HANDLE_ALL, ROOT_HANDLE};
use crate::formats;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

/// The single in-flight segmented write.
struct WriteSlot {
    handle: ObjectHandle,
    file: File,
}

/// The most recent unpaired MOVED_FROM notification.
#[derive(Debug, Clone)]
struct PendingMove {
    watch: i32,
    cookie: u32,
    name: String,
}

pub struct FsStorage {
    storage_id: u32,
    root_path: String,
    playlist_path: String,
    exclude_paths: HashSet<String>,
    refs_db_path: PathBuf,
    storage_info: StorageInfo,
    tree: ObjectTree,
    puoids: PuoidRegistry,
    references: ReferenceGraph,
    handles: Box<dyn HandleAllocator>,
    puoid_allocator: Option<Box<dyn PuoidAllocator>>,
    metadata: Box<dyn MetadataStore>,
    thumbnailer: Box<dyn Thumbnailer>,
    notifier: Box<dyn ChangeNotifier>,
    events: EventSink,
    write_slot: Option<WriteSlot>,
    pending_move: Option<PendingMove>,
    /// Free space at the last StorageInfoChanged emission, for the ≥1%
    /// drift check.
    last_free_space: u64,
}

impl FsStorage {
    /// Builds the storage and loads its persistent id registry. The object
    /// tree stays empty until [`enumerate`](Self::enumerate) runs.
    pub fn new(config: StorageConfig, collaborators: Collaborators) -> Self {
        let root_path = normalize_root(&config.root_path);
        let playlist_path = format!("{root_path}/Playlists");

        if let Err(e) = std::fs::create_dir_all(&config.persist_dir) {
            log::warn!("Cannot create {}: {e}", config.persist_dir.display());
        }
        let puoids = PuoidRegistry::open(config.persist_dir.join("mtppuoids"));
        let refs_db_path = config.persist_dir.join("mtpreferences");

        let storage_info = StorageInfo::from_config(&config);
        let last_free_space = storage_info.free_space;
        let exclude_paths = config
            .exclude_paths
            .iter()
            .map(|relative| format!("{root_path}/{relative}"))
            .collect();

        log::info!(
            "{root_path} exported as FS storage {} ({})",
            config.volume_label,
            config.description
        );

        Self {
            storage_id: config.storage_id,
            root_path,
            playlist_path,
            exclude_paths,
            refs_db_path,
            storage_info,
            tree: ObjectTree::new(),
            puoids,
            references: ReferenceGraph::new(),
            handles: collaborators.handles,
            puoid_allocator: collaborators.puoid_allocator,
            metadata: collaborators.metadata,
            thumbnailer: collaborators.thumbnailer,
            notifier: collaborators.notifier,
            events: collaborators.events,
            write_slot: None,
            pending_move: None,
            last_free_space,
        }
    }

    // ── Enumeration and lifecycle ────────────────────────────────────

    /// Walks the backing directory and populates the object tree, then
    /// loads references and synchronizes playlists. Emits `Ready` when the
    /// store is usable.
    pub fn enumerate(&mut self) -> Result<()> {
        self.enumerate_with(&mut || {})
    }

    /// Like [`enumerate`](Self::enumerate), yielding to `yielder` every 16
    /// directory entries so a host event loop can interleave I/O.
    pub fn enumerate_with(&mut self, yielder: &mut dyn FnMut()) -> Result<()> {
        if let Err(e) = std::fs::create_dir_all(&self.root_path) {
            log::warn!("Cannot create storage root {}: {e}", self.root_path);
        }
        if let Err(e) = std::fs::create_dir_all(&self.playlist_path) {
            log::warn!("Cannot create {}: {e}", self.playlist_path);
        }

        let root_path = self.root_path.clone();
        self.add_to_storage(&root_path, None, false, false, None, Some(yielder))?;

        // Reclaim ids of entries deleted while we were not running.
        let tree = &self.tree;
        self.puoids.sweep(|path| tree.handle_at(path).is_some());

        self.references = ReferenceGraph::load(&self.refs_db_path, |puoid| tree.handle_for_puoid(puoid));

        self.sync_playlists();

        self.emit(StorageEvent::Ready {
            storage_id: self.storage_id,
        });
        Ok(())
    }

    /// Clean teardown: aborts any in-flight write (the partial file stays
    /// on disk) and flushes the id registry and reference graph.
    pub fn shutdown(mut self) {
        self.write_slot = None;

        self.puoids.store();
        let tree = &self.tree;
        self.references.store(
            &self.refs_db_path,
            |handle| tree.node(handle).map(|node| node.puoid),
            |handle| {
                tree.node(handle)
                    .map(|node| {
                        node.object_info
                            .as_ref()
                            .map(|info| info.object_format)
                            .unwrap_or_else(|| formats::format_for_path(&node.path, false))
                            .is_abstract_playlist()
                    })
                    .unwrap_or(false)
            },
        );

        for handle in self.tree.handles() {
            let watch = self.tree.clear_watch(handle);
            if watch != -1 {
                self.notifier.remove_watch(watch);
            }
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn storage_id(&self) -> u32 {
        self.storage_id
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn check_handle(&self, handle: ObjectHandle) -> bool {
        self.tree.contains(handle)
    }

    pub fn object_count(&self) -> usize {
        self.tree.len()
    }

    pub fn get_path(&self, handle: ObjectHandle) -> Result<String> {
        self.tree
            .node(handle)
            .map(|node| node.path.clone())
            .ok_or(ResponseCode::GeneralError)
    }

    pub fn handle_at_path(&self, path: &str) -> Option<ObjectHandle> {
        self.tree.handle_at(path)
    }

    pub fn object_puoid(&self, handle: ObjectHandle) -> Result<Puoid> {
        self.tree
            .node(handle)
            .map(|node| node.puoid)
            .ok_or(ResponseCode::InvalidObjectHandle)
    }

    pub fn largest_puoid(&self) -> Puoid {
        self.puoids.largest()
    }

    /// The composed object info, populated on first use.
    pub fn get_object_info(&mut self, handle: ObjectHandle) -> Result<&ObjectInfo> {
        if !self.tree.contains(handle) {
            return Err(ResponseCode::InvalidObjectHandle);
        }
        self.ensure_object_info(handle);
        self.tree
            .node(handle)
            .and_then(|node| node.object_info.as_ref())
            .ok_or(ResponseCode::GeneralError)
    }

    /// Current storage description; free space is re-read from the
    /// filesystem on every call.
    pub fn storage_info(&mut self) -> StorageInfo {
        self.storage_info.refresh(Path::new(&self.root_path));
        self.storage_info.clone()
    }

    /// Object enumeration, the three MTP addressing modes:
    /// association 0 lists every object in the store, 0xFFFFFFFF lists the
    /// root's immediate children, anything else lists the children of that
    /// association. The root itself is never enumerated.
    pub fn get_object_handles(
        &self,
        format: Option<ObjectFormat>,
        association: ObjectHandle,
    ) -> Result<Vec<ObjectHandle>> {
        match association {
            0 => {
                let mut handles: Vec<ObjectHandle> = self
                    .tree
                    .handles()
                    .into_iter()
                    .filter(|&handle| handle != ROOT_HANDLE)
                    .collect();
                if let Some(wanted) = format {
                    handles.retain(|&handle| self.node_format(handle) == wanted);
                }
                Ok(handles)
            }
            HANDLE_ALL => {
                if !self.tree.contains(ROOT_HANDLE) {
                    return Err(ResponseCode::InvalidParentObject);
                }
                Ok(self.filtered_children(ROOT_HANDLE, format))
            }
            parent => {
                if !self.tree.contains(parent) {
                    return Err(ResponseCode::InvalidParentObject);
                }
                if !self.node_format(parent).is_association() {
                    return Err(ResponseCode::InvalidParentObject);
                }
                Ok(self.filtered_children(parent, format))
            }
        }
    }

    /// Thumbnailer callback: a thumbnail for `path` landed in the cache.
    pub fn thumbnail_ready(&mut self, path: &str) {
        let Some(handle) = self.tree.handle_at(path) else {
            return;
        };
        if handle == ROOT_HANDLE {
            return;
        }
        self.ensure_object_info(handle);
        let thumb_size = self.thumb_size_for(handle);
        if let Some(info) = self.tree.node_mut(handle).and_then(|node| node.object_info.as_mut()) {
            info.thumb_compressed_size = thumb_size;
        }
        self.emit(StorageEvent::ObjectInfoChanged { handle });
        self.emit(StorageEvent::ObjectPropChanged {
            handle,
            prop: crate::types::ObjectPropCode::RepSampleData,
        });
    }

    // ── Internal helpers shared by the operation modules ─────────────

    fn emit(&self, event: StorageEvent) {
        (self.events)(event);
    }

    fn filtered_children(&self, parent: ObjectHandle, format: Option<ObjectFormat>) -> Vec<ObjectHandle> {
        self.tree
            .children(parent)
            .into_iter()
            .filter(|&child| match format {
                None => true,
                Some(ObjectFormat::Undefined) => false,
                Some(wanted) => self.node_format(child) == wanted,
            })
            .collect()
    }

    /// Object format without forcing metadata composition.
    fn node_format(&self, handle: ObjectHandle) -> ObjectFormat {
        match self.tree.node(handle) {
            Some(node) => match &node.object_info {
                Some(info) => info.object_format,
                None => {
                    let is_dir = std::fs::metadata(&node.path).map(|m| m.is_dir()).unwrap_or(false);
                    formats::format_for_path(&node.path, is_dir)
                }
            },
            None => ObjectFormat::Undefined,
        }
    }

    fn ensure_object_info(&mut self, handle: ObjectHandle) {
        let missing = matches!(self.tree.node(handle), Some(node) if node.object_info.is_none());
        if !missing {
            return;
        }
        let (path, parent) = {
            let node = self.tree.node(handle).expect("checked above");
            (node.path.clone(), node.parent.unwrap_or(ROOT_HANDLE))
        };
        let info = compose_object_info(&path, self.storage_id, parent, self.thumbnailer.as_ref());
        if let Some(node) = self.tree.node_mut(handle) {
            node.object_info = Some(info);
        }
    }

    /// Drops and recomposes the cached object info after the entry changed
    /// on disk.
    fn refresh_object_info(&mut self, handle: ObjectHandle) {
        if let Some(node) = self.tree.node_mut(handle) {
            node.object_info = None;
        }
        self.ensure_object_info(handle);
    }

    /// Object info snapshot without mutation, composing on the fly when
    /// the cache is empty. Used when the storage is on the read side of a
    /// cross-store operation.
    fn object_info_snapshot(&self, handle: ObjectHandle) -> Result<ObjectInfo> {
        let node = self.tree.node(handle).ok_or(ResponseCode::InvalidObjectHandle)?;
        match &node.object_info {
            Some(info) => Ok(info.clone()),
            None => Ok(compose_object_info(
                &node.path,
                self.storage_id,
                node.parent.unwrap_or(ROOT_HANDLE),
                self.thumbnailer.as_ref(),
            )),
        }
    }

    fn thumb_size_for(&self, handle: ObjectHandle) -> u32 {
        let Some(node) = self.tree.node(handle) else {
            return 0;
        };
        let format = node
            .object_info
            .as_ref()
            .map(|info| info.object_format)
            .unwrap_or_else(|| formats::format_for_path(&node.path, false));
        let Some(mime) = formats::mime_for_image(format) else {
            return 0;
        };
        self.thumbnailer
            .request_thumbnail(Path::new(&node.path), mime)
            .and_then(|thumb| std::fs::metadata(thumb).ok())
            .map(|meta| meta.len() as u32)
            .unwrap_or(0)
    }

    /// Installs a notifier watch when the node is an association.
    fn add_watch_descriptor(&mut self, handle: ObjectHandle) {
        if !self.node_format(handle).is_association() {
            return;
        }
        let Some(node) = self.tree.node(handle) else { return };
        let path = node.path.clone();
        let watch = self.notifier.add_watch(Path::new(&path));
        if watch != -1 {
            self.tree.set_watch(handle, watch);
        }
    }

    fn remove_watch_descriptor(&mut self, handle: ObjectHandle) {
        let watch = self.tree.clear_watch(handle);
        if watch != -1 {
            self.notifier.remove_watch(watch);
        }
    }

    fn add_watch_recursively(&mut self, handle: ObjectHandle) {
        if !self.node_format(handle).is_association() {
            return;
        }
        self.add_watch_descriptor(handle);
        for child in self.tree.children(handle) {
            self.add_watch_recursively(child);
        }
    }

    fn remove_watch_recursively(&mut self, handle: ObjectHandle) {
        if !self.node_format(handle).is_association() {
            return;
        }
        self.remove_watch_descriptor(handle);
        for child in self.tree.children(handle) {
            self.remove_watch_recursively(child);
        }
    }
}

/// Strips a trailing slash so path concatenation stays canonical. The
/// filesystem root itself keeps its slash.
fn normalize_root(root: &str) -> String {
    if root.len() > 1 {
        root.trim_end_matches('/').to_string()
    } else {
        root.to_string()
    }
}

/// Everything up to the final path segment.
pub(crate) fn parent_path_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(pos) => path[..pos].to_string(),
        None => String::new(),
    }
}

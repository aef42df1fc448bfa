//! Contracts for the services the store depends on.
//!
//! The responder wires concrete implementations in at construction: the
//! device-global handle allocator, the thumbnail cache, the metadata store
//! holding semantic properties and playlist records, and the
//! filesystem-change notifier. Every contract ships a no-op default so a
//! storage can run (and be tested) without the full device stack.

use crate::types::{ObjectHandle, ObjectPropCode, PropValue, Puoid, StorageEvent};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A property slot: code plus a value that starts out empty and is filled
/// by whichever side (storage or metadata store) can answer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropSlot {
    pub code: ObjectPropCode,
    pub value: PropValue,
}

impl PropSlot {
    pub fn new(code: ObjectPropCode) -> Self {
        Self {
            code,
            value: PropValue::Empty,
        }
    }
}

/// Receives every event the store produces, in production order.
pub type EventSink = Box<dyn Fn(StorageEvent)>;

// ── Handle and PUOID allocation ──────────────────────────────────────

/// Issues object handles unique across the whole device.
pub trait HandleAllocator {
    fn allocate_handle(&mut self) -> ObjectHandle;
}

/// A plain counter. The device framework normally provides the allocator;
/// this one serves single-storage setups and tests.
pub struct SequentialHandles {
    next: ObjectHandle,
}

impl SequentialHandles {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: ObjectHandle) -> Self {
        Self { next: first }
    }
}

impl Default for SequentialHandles {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleAllocator for SequentialHandles {
    fn allocate_handle(&mut self) -> ObjectHandle {
        let handle = self.next;
        self.next += 1;
        handle
    }
}

/// Optional device-wide PUOID allocator. When absent the registry's local
/// monotonic counter is used.
pub trait PuoidAllocator {
    fn allocate_puoid(&mut self) -> Puoid;
}

// ── Thumbnailer ──────────────────────────────────────────────────────

/// Produces thumbnails for image files. `request_thumbnail` returns the
/// cached thumbnail path if one exists; otherwise generation is kicked off
/// asynchronously and the host later calls
/// [`crate::FsStorage::thumbnail_ready`] with the source path.
pub trait Thumbnailer {
    fn request_thumbnail(&self, path: &Path, mime: &str) -> Option<PathBuf>;
}

/// Thumbnailer that never produces anything.
pub struct NoThumbnailer;

impl Thumbnailer for NoThumbnailer {
    fn request_thumbnail(&self, _path: &Path, _mime: &str) -> Option<PathBuf> {
        None
    }
}

// ── Metadata store ───────────────────────────────────────────────────

/// The semantic metadata sidecar (the device's tracker role). Keyed by
/// path throughout; the store notifies it whenever paths change so the two
/// stay aligned. Implementations use interior mutability; the storage
/// only ever holds `&self` references.
pub trait MetadataStore {
    fn supports_property(&self, prop: ObjectPropCode) -> bool;

    fn get_property(&self, path: &str, prop: ObjectPropCode) -> Option<PropValue>;

    fn set_property(&self, path: &str, prop: ObjectPropCode, value: &PropValue) -> bool;

    /// Fills every empty slot this store supports.
    fn get_prop_vals(&self, path: &str, slots: &mut [PropSlot]);

    fn set_prop_vals(&self, path: &str, slots: &[PropSlot]);

    /// Batch query for every child of `parent_path`: child path → one value
    /// per supported property, in the order of `props`.
    fn get_child_prop_vals(
        &self,
        parent_path: &str,
        props: &[ObjectPropCode],
    ) -> HashMap<String, Vec<PropValue>>;

    /// A path changed; move the metadata record along.
    fn move_path(&self, old_path: &str, new_path: &str);

    /// A file was copied; clone the metadata record.
    fn copy_path(&self, old_path: &str, new_path: &str);

    fn save_playlist(&self, path: &str, entries: &[String]);

    /// Binds a playlist record known only by name to its freshly created
    /// `.pla` file.
    fn set_playlist_path(&self, name: &str, path: &str);

    fn move_playlist(&self, old_path: &str, new_path: &str);

    fn delete_playlist(&self, path: &str);

    /// Playlists this store knows about. With `existing` the result keys
    /// are `.pla` paths already on disk; without, they are bare names of
    /// playlists that have no file yet. Entries are member paths.
    fn get_playlists(&self, existing: bool) -> (Vec<String>, Vec<Vec<String>>);

    fn generate_iri(&self, path: &str) -> String {
        format!("file://{path}")
    }
}

/// Metadata store that knows nothing.
pub struct NoopMetadataStore;

impl MetadataStore for NoopMetadataStore {
    fn supports_property(&self, _prop: ObjectPropCode) -> bool {
        false
    }

    fn get_property(&self, _path: &str, _prop: ObjectPropCode) -> Option<PropValue> {
        None
    }

    fn set_property(&self, _path: &str, _prop: ObjectPropCode, _value: &PropValue) -> bool {
        false
    }

    fn get_prop_vals(&self, _path: &str, _slots: &mut [PropSlot]) {}

    fn set_prop_vals(&self, _path: &str, _slots: &[PropSlot]) {}

    fn get_child_prop_vals(
        &self,
        _parent_path: &str,
        _props: &[ObjectPropCode],
    ) -> HashMap<String, Vec<PropValue>> {
        HashMap::new()
    }

    fn move_path(&self, _old_path: &str, _new_path: &str) {}

    fn copy_path(&self, _old_path: &str, _new_path: &str) {}

    fn save_playlist(&self, _path: &str, _entries: &[String]) {}

    fn set_playlist_path(&self, _name: &str, _path: &str) {}

    fn move_playlist(&self, _old_path: &str, _new_path: &str) {}

    fn delete_playlist(&self, _path: &str) {}

    fn get_playlists(&self, _existing: bool) -> (Vec<String>, Vec<Vec<String>>) {
        (Vec::new(), Vec::new())
    }
}

// ── Change notifier ──────────────────────────────────────────────────

/// Per-directory filesystem watch registration. The notifier delivers
/// [`crate::watcher::FsChangeEvent`]s out of band (typically over a
/// channel); the host forwards them into
/// [`crate::FsStorage::handle_fs_event`].
pub trait ChangeNotifier {
    /// Starts watching a directory. Returns a watch id, or −1 on failure.
    fn add_watch(&mut self, path: &Path) -> i32;

    fn remove_watch(&mut self, watch: i32);
}

/// Notifier that watches nothing.
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn add_watch(&mut self, _path: &Path) -> i32 {
        -1
    }

    fn remove_watch(&mut self, _watch: i32) {}
}

// ── Bundle ───────────────────────────────────────────────────────────

/// Everything a storage needs from its environment, supplied at
/// construction.
pub struct Collaborators {
    pub handles: Box<dyn HandleAllocator>,
    pub puoid_allocator: Option<Box<dyn PuoidAllocator>>,
    pub metadata: Box<dyn MetadataStore>,
    pub thumbnailer: Box<dyn Thumbnailer>,
    pub notifier: Box<dyn ChangeNotifier>,
    pub events: EventSink,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            handles: Box::new(SequentialHandles::new()),
            puoid_allocator: None,
            metadata: Box::new(NoopMetadataStore),
            thumbnailer: Box::new(NoThumbnailer),
            notifier: Box::new(NullNotifier),
            events: Box::new(|_| {}),
        }
    }
}

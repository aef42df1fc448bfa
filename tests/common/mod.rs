//! Shared fixtures for the integration tests: an event collector, a fake
//! change notifier whose watch table the test can inspect, and a recording
//! metadata store with scriptable playlist answers.

#![allow(dead_code)]

use mtp_fs_store::{
    ChangeNotifier, Collaborators, FsStorage, MetadataStore, ObjectHandle, ObjectPropCode, PropSlot, PropValue,
    SequentialHandles, StorageConfig, StorageEvent,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

// ── Fake notifier ────────────────────────────────────────────────────

#[derive(Default)]
pub struct WatchTable {
    next: i32,
    pub wd_by_path: HashMap<String, i32>,
}

impl WatchTable {
    pub fn wd_of(&self, path: &Path) -> i32 {
        *self
            .wd_by_path
            .get(path.to_str().expect("utf-8 path"))
            .expect("path is watched")
    }
}

pub struct FakeNotifier {
    table: Rc<RefCell<WatchTable>>,
}

impl ChangeNotifier for FakeNotifier {
    fn add_watch(&mut self, path: &Path) -> i32 {
        let mut table = self.table.borrow_mut();
        table.next += 1;
        let wd = table.next;
        table.wd_by_path.insert(path.to_string_lossy().into_owned(), wd);
        wd
    }

    fn remove_watch(&mut self, watch: i32) {
        let mut table = self.table.borrow_mut();
        table.wd_by_path.retain(|_, wd| *wd != watch);
    }
}

// ── Recording metadata store ─────────────────────────────────────────

#[derive(Default)]
pub struct MsState {
    /// Scripted answer for get_playlists(existing = true).
    pub existing_playlists: (Vec<String>, Vec<Vec<String>>),
    /// Scripted answer for get_playlists(existing = false).
    pub new_playlists: (Vec<String>, Vec<Vec<String>>),
    pub playlist_paths_set: Vec<(String, String)>,
    pub saved_playlists: Vec<(String, Vec<String>)>,
    pub deleted_playlists: Vec<String>,
    pub moved_paths: Vec<(String, String)>,
    pub copied_paths: Vec<(String, String)>,
}

pub struct RecordingMetadataStore {
    state: Rc<RefCell<MsState>>,
}

impl MetadataStore for RecordingMetadataStore {
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

    fn get_child_prop_vals(&self, _parent_path: &str, _props: &[ObjectPropCode]) -> HashMap<String, Vec<PropValue>> {
        HashMap::new()
    }

    fn move_path(&self, old_path: &str, new_path: &str) {
        self.state
            .borrow_mut()
            .moved_paths
            .push((old_path.to_string(), new_path.to_string()));
    }

    fn copy_path(&self, old_path: &str, new_path: &str) {
        self.state
            .borrow_mut()
            .copied_paths
            .push((old_path.to_string(), new_path.to_string()));
    }

    fn save_playlist(&self, path: &str, entries: &[String]) {
        self.state
            .borrow_mut()
            .saved_playlists
            .push((path.to_string(), entries.to_vec()));
    }

    fn set_playlist_path(&self, name: &str, path: &str) {
        self.state
            .borrow_mut()
            .playlist_paths_set
            .push((name.to_string(), path.to_string()));
    }

    fn move_playlist(&self, _old_path: &str, _new_path: &str) {}

    fn delete_playlist(&self, path: &str) {
        self.state.borrow_mut().deleted_playlists.push(path.to_string());
    }

    fn get_playlists(&self, existing: bool) -> (Vec<String>, Vec<Vec<String>>) {
        let state = self.state.borrow();
        if existing {
            state.existing_playlists.clone()
        } else {
            state.new_playlists.clone()
        }
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub struct Harness {
    pub events: Rc<RefCell<Vec<StorageEvent>>>,
    pub watches: Rc<RefCell<WatchTable>>,
    pub ms: Rc<RefCell<MsState>>,
}

impl Harness {
    pub fn events_snapshot(&self) -> Vec<StorageEvent> {
        self.events.borrow().clone()
    }

    pub fn count_info_changed(&self, handle: ObjectHandle) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, StorageEvent::ObjectInfoChanged { handle: h } if *h == handle))
            .count()
    }
}

/// Builds a storage over `root` with persistent state under `persist`,
/// handles starting at `first_handle`, and the given scripted metadata
/// state.
pub fn build_storage(root: &Path, persist: &Path, first_handle: ObjectHandle, ms_state: MsState) -> (FsStorage, Harness) {
    let events = Rc::new(RefCell::new(Vec::new()));
    let watches = Rc::new(RefCell::new(WatchTable::default()));
    let ms = Rc::new(RefCell::new(ms_state));

    let events_sink = Rc::clone(&events);
    let collaborators = Collaborators {
        handles: Box::new(SequentialHandles::starting_at(first_handle)),
        puoid_allocator: None,
        metadata: Box::new(RecordingMetadataStore { state: Rc::clone(&ms) }),
        thumbnailer: Box::new(mtp_fs_store::NoThumbnailer),
        notifier: Box::new(FakeNotifier {
            table: Rc::clone(&watches),
        }),
        events: Box::new(move |event| events_sink.borrow_mut().push(event)),
    };

    let mut config = StorageConfig::new(0x0001_0001, root.to_str().expect("utf-8 root"), "Test", "Test storage");
    config.persist_dir = persist.to_path_buf();

    let storage = FsStorage::new(config, collaborators);
    (storage, Harness { events, watches, ms })
}

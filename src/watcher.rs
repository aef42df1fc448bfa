//! Filesystem-change events and the notify-crate backend.
//!
//! The store consumes per-directory change events shaped like the kernel's
//! inotify records: a watch id naming the directory, a cookie pairing the
//! two halves of a rename, an event kind, and the entry name. Any source
//! can produce them; [`NotifyWatcher`] adapts the `notify` crate, sending
//! events into a channel the host drains and forwards to
//! [`crate::FsStorage::handle_fs_event`].

use crate::collaborators::ChangeNotifier;
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// What happened to a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Create,
    Delete,
    MovedFrom,
    MovedTo,
    /// A file opened for writing was closed.
    CloseWrite,
}

/// One change inside a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsChangeEvent {
    /// Watch id of the directory the change happened in.
    pub watch: i32,
    /// Rename cookie; nonzero only on MovedFrom/MovedTo pairs.
    pub cookie: u32,
    pub kind: FsEventKind,
    /// Entry name relative to the watched directory.
    pub name: String,
}

// ── notify backend ───────────────────────────────────────────────────

struct WatchState {
    wd_by_dir: HashMap<PathBuf, i32>,
}

/// [`ChangeNotifier`] backed by the `notify` crate.
///
/// Watches are non-recursive, one per directory, matching the store's
/// per-node watch model. Raw notify rename trackers become cookies.
pub struct NotifyWatcher {
    watcher: RecommendedWatcher,
    state: Arc<Mutex<WatchState>>,
    next_wd: i32,
}

impl NotifyWatcher {
    /// Creates a watcher that sends translated events into `tx`.
    pub fn spawn(tx: Sender<FsChangeEvent>) -> notify::Result<Self> {
        let state = Arc::new(Mutex::new(WatchState {
            wd_by_dir: HashMap::new(),
        }));
        let callback_state = Arc::clone(&state);
        let watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| match result {
            Ok(event) => {
                for translated in translate(&event, &callback_state) {
                    let _ = tx.send(translated);
                }
            }
            Err(e) => log::warn!("Watcher error: {e}"),
        })?;
        Ok(Self {
            watcher,
            state,
            next_wd: 1,
        })
    }
}

impl ChangeNotifier for NotifyWatcher {
    fn add_watch(&mut self, path: &Path) -> i32 {
        if let Err(e) = self.watcher.watch(path, RecursiveMode::NonRecursive) {
            log::warn!("Cannot watch {}: {e}", path.display());
            return -1;
        }
        let wd = self.next_wd;
        self.next_wd += 1;
        if let Ok(mut state) = self.state.lock() {
            state.wd_by_dir.insert(path.to_path_buf(), wd);
        }
        wd
    }

    fn remove_watch(&mut self, watch: i32) {
        let dir = match self.state.lock() {
            Ok(mut state) => {
                let dir = state
                    .wd_by_dir
                    .iter()
                    .find_map(|(path, wd)| (*wd == watch).then(|| path.clone()));
                if let Some(dir) = &dir {
                    state.wd_by_dir.remove(dir);
                }
                dir
            }
            Err(_) => None,
        };
        if let Some(dir) = dir {
            let _ = self.watcher.unwatch(&dir);
        }
    }
}

/// Maps a raw notify event onto zero or more store events. Events in
/// directories we do not watch (or kinds we do not care about) are
/// dropped.
fn translate(event: &notify::Event, state: &Arc<Mutex<WatchState>>) -> Vec<FsChangeEvent> {
    let cookie = event.attrs.tracker().unwrap_or(0) as u32;

    // A merged rename carries both paths; split it back into the From/To
    // pair the reconciler expects.
    if matches!(event.kind, EventKind::Modify(ModifyKind::Name(RenameMode::Both))) {
        let mut out = Vec::new();
        if let Some(from) = event.paths.first().and_then(|p| locate(p, state, cookie, FsEventKind::MovedFrom)) {
            out.push(from);
        }
        if let Some(to) = event.paths.get(1).and_then(|p| locate(p, state, cookie, FsEventKind::MovedTo)) {
            out.push(to);
        }
        return out;
    }

    let kind = match event.kind {
        EventKind::Create(_) => FsEventKind::Create,
        EventKind::Remove(_) => FsEventKind::Delete,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => FsEventKind::MovedFrom,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FsEventKind::MovedTo,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => FsEventKind::CloseWrite,
        _ => return Vec::new(),
    };

    event
        .paths
        .first()
        .and_then(|path| locate(path, state, cookie, kind))
        .into_iter()
        .collect()
}

fn locate(path: &Path, state: &Arc<Mutex<WatchState>>, cookie: u32, kind: FsEventKind) -> Option<FsChangeEvent> {
    let parent = path.parent()?;
    let watch = *state.lock().ok()?.wd_by_dir.get(parent)?;
    let name = path.file_name()?.to_string_lossy().into_owned();
    Some(FsChangeEvent {
        watch,
        cookie,
        kind,
        name,
    })
}

//! Reconciliation of changes made behind the store's back.

mod common;

use common::{build_storage, MsState};
use mtp_fs_store::{FsChangeEvent, FsEventKind, StorageEvent};

fn event(watch: i32, cookie: u32, kind: FsEventKind, name: &str) -> FsChangeEvent {
    FsChangeEvent {
        watch,
        cookie,
        kind,
        name: name.to_string(),
    }
}

#[test]
fn external_rename_keeps_the_handle() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("old.txt"), b"content").unwrap();

    let (mut storage, harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();
    let handle = storage.handle_at_path(root.path().join("old.txt").to_str().unwrap()).unwrap();
    let root_wd = harness.watches.borrow().wd_of(root.path());

    // Another process renames the file; the kernel reports a cookie-paired
    // MOVED_FROM / MOVED_TO.
    std::fs::rename(root.path().join("old.txt"), root.path().join("new.txt")).unwrap();
    storage.handle_fs_event(event(root_wd, 41, FsEventKind::MovedFrom, "old.txt"));
    storage.handle_fs_event(event(root_wd, 41, FsEventKind::MovedTo, "new.txt"));

    assert_eq!(
        storage.handle_at_path(root.path().join("new.txt").to_str().unwrap()),
        Some(handle)
    );
    assert!(storage.handle_at_path(root.path().join("old.txt").to_str().unwrap()).is_none());
    assert_eq!(harness.count_info_changed(handle), 1);
}

#[test]
fn external_create_and_delete_are_reconciled() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();

    let (mut storage, harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();
    let root_wd = harness.watches.borrow().wd_of(root.path());

    std::fs::write(root.path().join("dropped.txt"), b"x").unwrap();
    storage.handle_fs_event(event(root_wd, 0, FsEventKind::Create, "dropped.txt"));

    let handle = storage
        .handle_at_path(root.path().join("dropped.txt").to_str().unwrap())
        .expect("created entry reconciled");
    assert!(harness
        .events_snapshot()
        .contains(&StorageEvent::ObjectAdded { handle }));

    std::fs::remove_file(root.path().join("dropped.txt")).unwrap();
    storage.handle_fs_event(event(root_wd, 0, FsEventKind::Delete, "dropped.txt"));

    assert!(storage.handle_at_path(root.path().join("dropped.txt").to_str().unwrap()).is_none());
    assert!(harness
        .events_snapshot()
        .contains(&StorageEvent::ObjectRemoved { handle }));
}

#[test]
fn unpaired_moved_from_flushes_as_delete() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("gone.txt"), b"x").unwrap();

    let (mut storage, harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();
    let handle = storage.handle_at_path(root.path().join("gone.txt").to_str().unwrap()).unwrap();
    let root_wd = harness.watches.borrow().wd_of(root.path());

    // Moved out of the storage entirely: only the FROM half ever arrives.
    std::fs::remove_file(root.path().join("gone.txt")).unwrap();
    storage.handle_fs_event(event(root_wd, 99, FsEventKind::MovedFrom, "gone.txt"));

    // Nothing happens until the idle flush.
    assert!(storage.check_handle(handle));
    storage.flush_pending_move();
    assert!(!storage.check_handle(handle));
}

#[test]
fn cookie_mismatch_splits_into_delete_and_create() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("leaving.txt"), b"x").unwrap();

    let (mut storage, harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();
    let leaving = storage
        .handle_at_path(root.path().join("leaving.txt").to_str().unwrap())
        .unwrap();
    let root_wd = harness.watches.borrow().wd_of(root.path());

    std::fs::remove_file(root.path().join("leaving.txt")).unwrap();
    std::fs::write(root.path().join("arriving.txt"), b"y").unwrap();

    storage.handle_fs_event(event(root_wd, 7, FsEventKind::MovedFrom, "leaving.txt"));
    storage.handle_fs_event(event(root_wd, 8, FsEventKind::MovedTo, "arriving.txt"));

    assert!(!storage.check_handle(leaving));
    assert!(storage
        .handle_at_path(root.path().join("arriving.txt").to_str().unwrap())
        .is_some());
}

#[test]
fn rename_of_directory_reindexes_descendants() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("olddir")).unwrap();
    std::fs::write(root.path().join("olddir/inner.txt"), b"x").unwrap();

    let (mut storage, harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();
    let dir_handle = storage.handle_at_path(root.path().join("olddir").to_str().unwrap()).unwrap();
    let inner_handle = storage
        .handle_at_path(root.path().join("olddir/inner.txt").to_str().unwrap())
        .unwrap();
    let root_wd = harness.watches.borrow().wd_of(root.path());

    std::fs::rename(root.path().join("olddir"), root.path().join("newdir")).unwrap();
    storage.handle_fs_event(event(root_wd, 5, FsEventKind::MovedFrom, "olddir"));
    storage.handle_fs_event(event(root_wd, 5, FsEventKind::MovedTo, "newdir"));

    assert_eq!(
        storage.handle_at_path(root.path().join("newdir").to_str().unwrap()),
        Some(dir_handle)
    );
    assert_eq!(
        storage.handle_at_path(root.path().join("newdir/inner.txt").to_str().unwrap()),
        Some(inner_handle)
    );
    assert!(storage
        .handle_at_path(root.path().join("olddir/inner.txt").to_str().unwrap())
        .is_none());
}

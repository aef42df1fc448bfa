//! Copy and move between two stores with independent handle spaces.

mod common;

use common::{build_storage, MsState};
use mtp_fs_store::{ResponseCode, ROOT_HANDLE};

#[test]
fn cross_store_copy_preserves_the_handle() {
    let root_a = tempfile::tempdir().unwrap();
    let persist_a = tempfile::tempdir().unwrap();
    let root_b = tempfile::tempdir().unwrap();
    let persist_b = tempfile::tempdir().unwrap();
    std::fs::write(root_a.path().join("song.mp3"), b"0123456789").unwrap();

    let (mut store_a, _ha) = build_storage(root_a.path(), persist_a.path(), 100, MsState::default());
    let (mut store_b, _hb) = build_storage(root_b.path(), persist_b.path(), 1, MsState::default());
    store_a.enumerate().unwrap();
    store_b.enumerate().unwrap();

    let handle = store_a
        .handle_at_path(root_a.path().join("song.mp3").to_str().unwrap())
        .unwrap();
    assert!(!store_b.check_handle(handle));

    let copied = store_a.copy_object_to(handle, &mut store_b, ROOT_HANDLE).unwrap();
    assert_eq!(copied, handle);

    // Same handle on both sides, same bytes, source untouched.
    assert!(store_a.check_handle(handle));
    assert!(store_b.check_handle(handle));
    let copied_path = root_b.path().join("song.mp3");
    assert_eq!(std::fs::read(&copied_path).unwrap(), b"0123456789");
    assert_eq!(store_b.handle_at_path(copied_path.to_str().unwrap()), Some(handle));
}

#[test]
fn cross_store_copy_of_directory_rebuilds_subtree() {
    let root_a = tempfile::tempdir().unwrap();
    let persist_a = tempfile::tempdir().unwrap();
    let root_b = tempfile::tempdir().unwrap();
    let persist_b = tempfile::tempdir().unwrap();
    std::fs::create_dir(root_a.path().join("album")).unwrap();
    std::fs::write(root_a.path().join("album/one.mp3"), b"one").unwrap();
    std::fs::write(root_a.path().join("album/two.mp3"), b"two").unwrap();

    let (mut store_a, _ha) = build_storage(root_a.path(), persist_a.path(), 200, MsState::default());
    let (mut store_b, _hb) = build_storage(root_b.path(), persist_b.path(), 1, MsState::default());
    store_a.enumerate().unwrap();
    store_b.enumerate().unwrap();

    let album = store_a.handle_at_path(root_a.path().join("album").to_str().unwrap()).unwrap();
    let one = store_a
        .handle_at_path(root_a.path().join("album/one.mp3").to_str().unwrap())
        .unwrap();

    store_a.copy_object_to(album, &mut store_b, ROOT_HANDLE).unwrap();

    assert!(store_b.check_handle(album));
    assert!(store_b.check_handle(one));
    assert_eq!(std::fs::read(root_b.path().join("album/one.mp3")).unwrap(), b"one");
    assert_eq!(std::fs::read(root_b.path().join("album/two.mp3")).unwrap(), b"two");

    // Copying the directory again collides with the existing destination.
    assert_eq!(
        store_a.copy_object_to(album, &mut store_b, ROOT_HANDLE),
        Err(ResponseCode::InvalidParentObject)
    );
}

#[test]
fn cross_store_move_deletes_the_source() {
    let root_a = tempfile::tempdir().unwrap();
    let persist_a = tempfile::tempdir().unwrap();
    let root_b = tempfile::tempdir().unwrap();
    let persist_b = tempfile::tempdir().unwrap();
    std::fs::write(root_a.path().join("clip.avi"), b"frames").unwrap();

    let (mut store_a, _ha) = build_storage(root_a.path(), persist_a.path(), 300, MsState::default());
    let (mut store_b, _hb) = build_storage(root_b.path(), persist_b.path(), 1, MsState::default());
    store_a.enumerate().unwrap();
    store_b.enumerate().unwrap();

    let handle = store_a
        .handle_at_path(root_a.path().join("clip.avi").to_str().unwrap())
        .unwrap();

    store_a.move_object_to(handle, &mut store_b, ROOT_HANDLE).unwrap();

    assert!(!store_a.check_handle(handle));
    assert!(!root_a.path().join("clip.avi").exists());
    assert!(store_b.check_handle(handle));
    assert_eq!(std::fs::read(root_b.path().join("clip.avi")).unwrap(), b"frames");
}

#[test]
fn same_store_move_reindexes_and_renames() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("inbox")).unwrap();
    std::fs::create_dir(root.path().join("archive")).unwrap();
    std::fs::write(root.path().join("inbox/doc.txt"), b"doc").unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();

    let doc = storage.handle_at_path(root.path().join("inbox/doc.txt").to_str().unwrap()).unwrap();
    let archive = storage.handle_at_path(root.path().join("archive").to_str().unwrap()).unwrap();

    storage.move_object_within(doc, archive, true).unwrap();

    assert!(root.path().join("archive/doc.txt").exists());
    assert!(!root.path().join("inbox/doc.txt").exists());
    assert_eq!(
        storage.handle_at_path(root.path().join("archive/doc.txt").to_str().unwrap()),
        Some(doc)
    );
}

#[test]
fn moving_the_playlists_directory_is_refused() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("elsewhere")).unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();

    let playlists = storage.handle_at_path(root.path().join("Playlists").to_str().unwrap()).unwrap();
    let elsewhere = storage.handle_at_path(root.path().join("elsewhere").to_str().unwrap()).unwrap();

    assert_eq!(
        storage.move_object_within(playlists, elsewhere, true),
        Err(ResponseCode::AccessDenied)
    );
    assert!(root.path().join("Playlists").exists());
}

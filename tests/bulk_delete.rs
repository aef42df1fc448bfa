//! DeleteObject semantics: bulk deletion with format filtering, partial
//! results, and root protection.

mod common;

use common::{build_storage, MsState};
use mtp_fs_store::{ObjectFormat, ResponseCode, HANDLE_ALL, ROOT_HANDLE};

#[test]
fn mixed_success_returns_partial_deletion() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("a.mp3"), b"aaa").unwrap();
    std::fs::write(root.path().join("b.mp3"), b"bbb").unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();
    let b_handle = storage.handle_at_path(root.path().join("b.mp3").to_str().unwrap()).unwrap();

    // Pull b.mp3 out from under the store so its physical removal fails.
    std::fs::remove_file(root.path().join("b.mp3")).unwrap();

    let result = storage.delete_item(HANDLE_ALL, Some(ObjectFormat::Mp3));
    assert_eq!(result, Err(ResponseCode::PartialDeletion));

    assert!(!root.path().join("a.mp3").exists());
    assert!(storage.handle_at_path(root.path().join("a.mp3").to_str().unwrap()).is_none());
    // The failed object keeps its node.
    assert!(storage.check_handle(b_handle));
}

#[test]
fn all_success_returns_ok_and_respects_filter() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("one.mp3"), b"1").unwrap();
    std::fs::write(root.path().join("two.mp3"), b"2").unwrap();
    std::fs::write(root.path().join("notes.txt"), b"keep me").unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();

    assert_eq!(storage.delete_item(HANDLE_ALL, Some(ObjectFormat::Mp3)), Ok(()));

    assert!(!root.path().join("one.mp3").exists());
    assert!(!root.path().join("two.mp3").exists());
    assert!(root.path().join("notes.txt").exists());
    assert!(storage
        .handle_at_path(root.path().join("notes.txt").to_str().unwrap())
        .is_some());
}

#[test]
fn unfiltered_bulk_delete_clears_subtrees() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("album")).unwrap();
    std::fs::write(root.path().join("album/track.mp3"), b"t").unwrap();
    std::fs::write(root.path().join("cover.jpg"), b"c").unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();

    assert_eq!(storage.delete_item(HANDLE_ALL, None), Ok(()));

    assert!(!root.path().join("album").exists());
    assert!(!root.path().join("cover.jpg").exists());
    // The root node itself survives.
    assert!(storage.check_handle(ROOT_HANDLE));
    assert!(root.path().exists());
}

#[test]
fn deleting_the_root_is_write_protected() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();

    assert_eq!(storage.delete_item(ROOT_HANDLE, None), Err(ResponseCode::ObjectWriteProtected));
}

#[test]
fn unknown_handle_is_reported_without_side_effects() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("only.txt"), b"x").unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();
    let before = storage.object_count();

    assert_eq!(storage.delete_item(0xDEAD_BEEF, None), Err(ResponseCode::InvalidObjectHandle));
    assert_eq!(storage.object_count(), before);
    assert!(root.path().join("only.txt").exists());
}

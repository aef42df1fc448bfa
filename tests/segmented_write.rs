//! Segmented object writes, reads, truncation, and add_item boundaries.

mod common;

use common::{build_storage, MsState};
use mtp_fs_store::{ObjectFormat, ObjectInfo, ResponseCode, StorageEvent, HANDLE_ALL, ROOT_HANDLE};

#[test]
fn segmented_write_tracks_size_without_spurious_events() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();

    let (mut storage, harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();

    let info = ObjectInfo::for_new_object("data.bin", ObjectFormat::Undefined);
    let handle = storage.add_item(ROOT_HANDLE, &info).unwrap();

    let first = vec![0xAA_u8; 1000];
    let second = vec![0xBB_u8; 500];
    storage.write_data(handle, Some(&first), true, false).unwrap();
    storage.write_data(handle, Some(&second), false, false).unwrap();
    storage.write_data(handle, None, false, true).unwrap();

    let on_disk = std::fs::read(root.path().join("data.bin")).unwrap();
    assert_eq!(on_disk.len(), 1500);
    assert_eq!(&on_disk[..1000], first.as_slice());
    assert_eq!(&on_disk[1000..], second.as_slice());

    assert_eq!(storage.get_object_info(handle).unwrap().compressed_size, 1500);

    // No ObjectInfoChanged fired during the transfer.
    assert!(harness
        .events_snapshot()
        .iter()
        .all(|event| !matches!(event, StorageEvent::ObjectInfoChanged { .. })));
}

#[test]
fn first_segment_truncates_existing_content() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("note.txt"), b"previous content").unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();
    let handle = storage.handle_at_path(root.path().join("note.txt").to_str().unwrap()).unwrap();

    storage.write_data(handle, Some(b"xy"), true, false).unwrap();
    storage.write_data(handle, None, false, true).unwrap();

    assert_eq!(std::fs::read(root.path().join("note.txt")).unwrap(), b"xy");
}

#[test]
fn read_data_is_exact_and_bounded() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("blob.bin"), b"0123456789").unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();
    let handle = storage.handle_at_path(root.path().join("blob.bin").to_str().unwrap()).unwrap();

    let mut buf = [0u8; 4];
    storage.read_data(handle, 3, &mut buf).unwrap();
    assert_eq!(&buf, b"3456");

    // Reading past the end is an error, not a short read.
    let mut over = [0u8; 8];
    assert_eq!(storage.read_data(handle, 5, &mut over), Err(ResponseCode::GeneralError));
}

#[test]
fn truncate_resizes_and_updates_info() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("long.txt"), b"abcdefgh").unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();
    let handle = storage.handle_at_path(root.path().join("long.txt").to_str().unwrap()).unwrap();

    storage.truncate(handle, 3).unwrap();
    assert_eq!(std::fs::metadata(root.path().join("long.txt")).unwrap().len(), 3);
    assert_eq!(storage.get_object_info(handle).unwrap().compressed_size, 3);

    // Associations cannot be truncated.
    let playlists = storage.handle_at_path(root.path().join("Playlists").to_str().unwrap()).unwrap();
    assert_eq!(storage.truncate(playlists, 0), Err(ResponseCode::GeneralError));
}

#[test]
fn add_item_wildcard_parent_means_root() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();

    let info = ObjectInfo::for_new_object("picked.txt", ObjectFormat::Text);
    let handle = storage.add_item(HANDLE_ALL, &info).unwrap();

    assert!(root.path().join("picked.txt").exists());
    assert_eq!(storage.get_object_info(handle).unwrap().parent_object, ROOT_HANDLE);
    assert_eq!(
        storage.handle_at_path(root.path().join("picked.txt").to_str().unwrap()),
        Some(handle)
    );
}

#[test]
fn add_item_creates_directories_and_rejects_bad_datasets() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();

    let dir_info = ObjectInfo::for_new_object("Photos", ObjectFormat::Association);
    let dir_handle = storage.add_item(ROOT_HANDLE, &dir_info).unwrap();
    assert!(root.path().join("Photos").is_dir());

    // Nested creation under the new association.
    let nested = ObjectInfo::for_new_object("pic.jpg", ObjectFormat::ExifJpeg);
    let nested_handle = storage.add_item(dir_handle, &nested).unwrap();
    assert!(root.path().join("Photos/pic.jpg").is_file());
    assert_eq!(storage.get_object_info(nested_handle).unwrap().parent_object, dir_handle);

    // Empty dataset and unknown parent are rejected.
    let empty = ObjectInfo::for_new_object("", ObjectFormat::Text);
    assert_eq!(storage.add_item(ROOT_HANDLE, &empty), Err(ResponseCode::InvalidDataset));
    let orphan = ObjectInfo::for_new_object("o.txt", ObjectFormat::Text);
    assert_eq!(storage.add_item(0x7777, &orphan), Err(ResponseCode::InvalidParentObject));
}

#[test]
fn add_to_storage_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("once.txt"), b"1").unwrap();

    let (mut storage, _harness) = build_storage(root.path(), persist.path(), 1, MsState::default());
    storage.enumerate().unwrap();

    let path = root.path().join("once.txt");
    let path = path.to_str().unwrap();
    let first = storage.handle_at_path(path).unwrap();
    let count = storage.object_count();

    let again = storage.add_to_storage(path, None, false, false, None, None).unwrap();
    assert_eq!(again, first);
    assert_eq!(storage.object_count(), count);
}

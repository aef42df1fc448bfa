//! Abstract playlist synchronization.
//!
//! A playlist is a zero-byte `.pla` file under `<root>/Playlists/` whose
//! content lives in the reference graph; the metadata store keeps the
//! durable record. After enumeration the two are reconciled: playlists
//! already backed by a file get their references rebuilt, playlists known
//! only to the metadata store get a fresh file created and bound.

use super::FsStorage;
use crate::object_info::ObjectInfo;
use crate::types::{ObjectFormat, ObjectHandle};

impl FsStorage {
    pub(crate) fn sync_playlists(&mut self) {
        let Some(playlist_dir) = self.tree.handle_at(&self.playlist_path) else {
            log::error!("No handle for the Playlists directory, playlists will be unavailable");
            return;
        };

        self.assign_existing_playlists();
        self.create_new_playlists(playlist_dir);
    }

    /// Playlists that already have a `.pla` file on disk: translate their
    /// stored entry paths to handles and install them as references.
    fn assign_existing_playlists(&mut self) {
        let (paths, entry_lists) = self.metadata.get_playlists(true);
        for (path, entries) in paths.iter().zip(entry_lists.iter()) {
            let Some(handle) = self.tree.handle_at(path) else {
                continue;
            };
            let references = self.resolve_entries(entries);
            self.references.set(handle, references);
        }
    }

    /// Playlists the metadata store reports with no file yet: create a
    /// zero-byte `.pla` under the Playlists directory, install references,
    /// and bind the record to its new path.
    fn create_new_playlists(&mut self, playlist_dir: ObjectHandle) {
        let (names, entry_lists) = self.metadata.get_playlists(false);
        for (name, entries) in names.iter().zip(entry_lists.iter()) {
            let path = format!("{}/{name}.pla", self.playlist_path);
            let info = ObjectInfo {
                storage_id: self.storage_id,
                object_format: ObjectFormat::AbstractAudioVideoPlaylist,
                parent_object: playlist_dir,
                file_name: format!("{name}.pla"),
                ..Default::default()
            };
            match self.add_item(playlist_dir, &info) {
                Ok(handle) => {
                    let references = self.resolve_entries(entries);
                    self.references.set(handle, references);
                    self.metadata.set_playlist_path(name, &path);
                }
                Err(code) => {
                    log::warn!("Cannot create playlist {name}: {code}");
                }
            }
        }
    }

    /// Entry paths → handles, dropping entries not in this store.
    fn resolve_entries(&self, entries: &[String]) -> Vec<ObjectHandle> {
        entries.iter().filter_map(|entry| self.tree.handle_at(entry)).collect()
    }
}

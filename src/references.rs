//! Object reference graph.
//!
//! Adjacency lists of handle→handles, used for abstract playlists and any
//! other association an initiator builds with SetObjectReferences. Handles
//! are session-local, so the on-disk form is keyed by PUOID:
//!
//! ```text
//! object_count       u32
//! object_count times:
//!     puoid          16 bytes
//!     ref_count      u32
//!     ref_count times:
//!         puoid      16 bytes
//! ```
//!
//! Counts are written as placeholders first and corrected by seeking back
//! once the writer knows how many entries actually resolved; handles that
//! no longer map to a PUOID at flush time are silently skipped. Any write
//! failure truncates the file to zero.

use crate::types::{ObjectHandle, Puoid};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Default)]
pub struct ReferenceGraph {
    map: HashMap<ObjectHandle, Vec<ObjectHandle>>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.map.contains_key(&handle)
    }

    /// Replaces the reference list for `handle` wholesale.
    pub fn set(&mut self, handle: ObjectHandle, references: Vec<ObjectHandle>) {
        self.map.insert(handle, references);
    }

    /// Returns the stored list with dangling targets elided. The pruned
    /// list is written back, so the elision is permanent.
    pub fn get_pruned<F>(&mut self, handle: ObjectHandle, is_live: F) -> Vec<ObjectHandle>
    where
        F: Fn(ObjectHandle) -> bool,
    {
        let Some(references) = self.map.get_mut(&handle) else {
            return Vec::new();
        };
        references.retain(|target| is_live(*target));
        references.clone()
    }

    /// Purges every occurrence of `handle`, both as a source and as a
    /// target. Called when an object becomes invalid.
    pub fn remove_invalid(&mut self, handle: ObjectHandle) {
        self.map.remove(&handle);
        for references in self.map.values_mut() {
            references.retain(|target| *target != handle);
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Writes the graph keyed by PUOID. `puoid_of` resolves a handle to
    /// its persistent id, returning `None` for handles that are gone;
    /// `skip_object` excludes sources persisted elsewhere (abstract
    /// playlists live in the metadata store).
    pub fn store<P, S>(&self, db_path: &Path, puoid_of: P, skip_object: S)
    where
        P: Fn(ObjectHandle) -> Option<Puoid>,
        S: Fn(ObjectHandle) -> bool,
    {
        let mut file = match File::create(db_path) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Cannot write reference db {}: {e}", db_path.display());
                return;
            }
        };
        if self.write_entries(&mut file, &puoid_of, &skip_object).is_err() {
            log::warn!("Writing reference db {} failed, truncating", db_path.display());
            let _ = file.set_len(0);
        }
    }

    fn write_entries<P, S>(&self, file: &mut File, puoid_of: &P, skip_object: &S) -> std::io::Result<()>
    where
        P: Fn(ObjectHandle) -> Option<Puoid>,
        S: Fn(ObjectHandle) -> bool,
    {
        let mut object_count = self.map.len() as u32;
        let count_pos = file.stream_position()?;
        file.write_all(&object_count.to_le_bytes())?;

        for (&handle, references) in &self.map {
            let puoid = match puoid_of(handle) {
                Some(puoid) if !skip_object(handle) => puoid,
                // The source lingers from a deleted object (pruned lazily
                // on read), or is persisted elsewhere. Drop it here.
                _ => {
                    object_count -= 1;
                    continue;
                }
            };
            file.write_all(&puoid.to_le_bytes())?;

            let mut ref_count = references.len() as u32;
            let ref_count_pos = file.stream_position()?;
            file.write_all(&ref_count.to_le_bytes())?;
            for &target in references {
                match puoid_of(target) {
                    Some(target_puoid) => file.write_all(&target_puoid.to_le_bytes())?,
                    None => ref_count -= 1,
                }
            }
            if ref_count != references.len() as u32 {
                let end = file.stream_position()?;
                file.seek(SeekFrom::Start(ref_count_pos))?;
                file.write_all(&ref_count.to_le_bytes())?;
                file.seek(SeekFrom::Start(end))?;
            }
        }

        if object_count != self.map.len() as u32 {
            file.seek(SeekFrom::Start(count_pos))?;
            file.write_all(&object_count.to_le_bytes())?;
        }
        Ok(())
    }

    /// Loads the graph, resolving each PUOID through `handle_for`.
    /// Unresolved ids are dropped silently; a short read stops the load
    /// keeping whatever parsed.
    pub fn load<F>(db_path: &Path, handle_for: F) -> Self
    where
        F: Fn(&Puoid) -> Option<ObjectHandle>,
    {
        let mut graph = Self::new();
        let mut file = match File::open(db_path) {
            Ok(file) => file,
            Err(_) => return graph,
        };

        let Some(object_count) = read_u32(&mut file) else {
            return graph;
        };
        for _ in 0..object_count {
            let Some(source_puoid) = read_puoid(&mut file) else {
                return graph;
            };
            let Some(ref_count) = read_u32(&mut file) else {
                return graph;
            };
            let mut references = Vec::new();
            for _ in 0..ref_count {
                let Some(target_puoid) = read_puoid(&mut file) else {
                    return graph;
                };
                if let Some(target) = handle_for(&target_puoid) {
                    references.push(target);
                }
            }
            if let Some(source) = handle_for(&source_puoid) {
                graph.map.insert(source, references);
            }
        }
        graph
    }
}

fn read_u32(file: &mut File) -> Option<u32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf).ok()?;
    Some(u32::from_le_bytes(buf))
}

fn read_puoid(file: &mut File) -> Option<Puoid> {
    let mut buf = [0u8; 16];
    file.read_exact(&mut buf).ok()?;
    Some(Puoid::from_le_bytes(buf))
}

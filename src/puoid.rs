//! Persistent unique object id registry.
//!
//! Keeps the path→PUOID map that gives objects an identity surviving
//! process restarts, plus the largest id ever issued. Persisted to a flat
//! little-endian file:
//!
//! ```text
//! largest_puoid      16 bytes
//! count              u32
//! count times:
//!     path_len       u32 (UTF-8 bytes, no terminator)
//!     path           path_len bytes
//!     puoid          16 bytes
//! ```
//!
//! Loading is best-effort: a short read stops the load but keeps whatever
//! parsed before it. A failed store truncates the file to zero rather than
//! leaving a partial database behind.

use crate::types::Puoid;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

pub struct PuoidRegistry {
    db_path: PathBuf,
    map: HashMap<String, Puoid>,
    largest: Puoid,
}

impl PuoidRegistry {
    /// Opens the registry, loading whatever the database file holds.
    pub fn open(db_path: impl Into<PathBuf>) -> Self {
        let mut registry = Self {
            db_path: db_path.into(),
            map: HashMap::new(),
            largest: Puoid::ZERO,
        };
        registry.load();
        registry
    }

    /// The PUOID registered for `path`, if any.
    pub fn get(&self, path: &str) -> Option<Puoid> {
        self.map.get(path).copied()
    }

    /// Returns the PUOID for `path`, reusing a persisted one when present
    /// and allocating a fresh monotonic id otherwise. This is the sole
    /// mechanism that preserves object identity across restarts.
    pub fn lookup_or_allocate(&mut self, path: &str) -> Puoid {
        if let Some(puoid) = self.map.get(path) {
            return *puoid;
        }
        let puoid = self.allocate();
        self.map.insert(path.to_string(), puoid);
        puoid
    }

    /// Issues a fresh PUOID, strictly greater than every id this registry
    /// has handed out before.
    pub fn allocate(&mut self) -> Puoid {
        self.largest = self.largest.successor();
        self.largest
    }

    /// Records an externally allocated PUOID so the monotonic bound stays
    /// correct when a device-wide allocator is in use.
    pub fn record_external(&mut self, path: &str, puoid: Puoid) {
        if puoid > self.largest {
            self.largest = puoid;
        }
        self.map.insert(path.to_string(), puoid);
    }

    pub fn largest(&self) -> Puoid {
        self.largest
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Re-keys an entry after a rename, keeping the PUOID.
    pub fn rename(&mut self, old_path: &str, new_path: &str) {
        if let Some(puoid) = self.map.remove(old_path) {
            self.map.insert(new_path.to_string(), puoid);
        }
    }

    /// Drops entries whose path no longer exists in the live tree. Run
    /// after enumeration to reclaim ids of files deleted while the process
    /// was not running.
    pub fn sweep<F>(&mut self, is_live: F)
    where
        F: Fn(&str) -> bool,
    {
        self.map.retain(|path, _| is_live(path.as_str()));
    }

    // ── Persistence ──────────────────────────────────────────────────

    fn load(&mut self) {
        let mut file = match File::open(&self.db_path) {
            Ok(file) => file,
            Err(_) => return,
        };

        let mut buf16 = [0u8; 16];
        if file.read_exact(&mut buf16).is_err() {
            return;
        }
        self.largest = Puoid::from_le_bytes(buf16);

        let count = match read_u32(&mut file) {
            Some(count) => count,
            None => return,
        };

        for _ in 0..count {
            let path_len = match read_u32(&mut file) {
                Some(len) => len as usize,
                None => return,
            };
            let mut path_buf = vec![0u8; path_len];
            if file.read_exact(&mut path_buf).is_err() {
                return;
            }
            let path = match String::from_utf8(path_buf) {
                Ok(path) => path,
                Err(_) => return,
            };
            if file.read_exact(&mut buf16).is_err() {
                return;
            }
            self.map.insert(path, Puoid::from_le_bytes(buf16));
        }
    }

    /// Writes the registry back to disk. A failure mid-write truncates the
    /// file to zero so the next load starts from an empty registry instead
    /// of garbage.
    pub fn store(&self) {
        let mut file = match File::create(&self.db_path) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Cannot write puoid db {}: {e}", self.db_path.display());
                return;
            }
        };

        if self.write_all_entries(&mut file).is_err() {
            log::warn!("Writing puoid db {} failed, truncating", self.db_path.display());
            let _ = file.set_len(0);
        }
    }

    fn write_all_entries(&self, file: &mut File) -> std::io::Result<()> {
        file.write_all(&self.largest.to_le_bytes())?;
        file.write_all(&(self.map.len() as u32).to_le_bytes())?;
        for (path, puoid) in &self.map {
            file.write_all(&(path.len() as u32).to_le_bytes())?;
            file.write_all(path.as_bytes())?;
            file.write_all(&puoid.to_le_bytes())?;
        }
        Ok(())
    }
}

fn read_u32(file: &mut File) -> Option<u32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf).ok()?;
    Some(u32::from_le_bytes(buf))
}

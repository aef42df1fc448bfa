//! Storage construction inputs.

use crate::types::StorageType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for one filesystem-backed storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Device-global storage id, assigned by the storage registry.
    pub storage_id: u32,
    pub storage_type: StorageType,
    /// Absolute path of the backing directory. Created if missing.
    pub root_path: String,
    pub volume_label: String,
    pub description: String,
    /// Paths excluded from export, relative to the root.
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    /// Directory holding the persistent id and reference databases.
    #[serde(default = "default_persist_dir")]
    pub persist_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(
        storage_id: u32,
        root_path: impl Into<String>,
        volume_label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            storage_id,
            storage_type: StorageType::FixedRam,
            root_path: root_path.into(),
            volume_label: volume_label.into(),
            description: description.into(),
            exclude_paths: Vec::new(),
            persist_dir: default_persist_dir(),
        }
    }
}

/// `<home>/.local/mtp`, falling back to a relative directory when HOME is
/// unset (e.g. under a bare service manager).
fn default_persist_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".local/mtp"),
        None => PathBuf::from(".local/mtp"),
    }
}

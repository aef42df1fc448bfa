//! Composed MTP object metadata and storage capacity info.

use crate::collaborators::Thumbnailer;
use crate::config::StorageConfig;
use crate::formats;
use crate::types::{
    ObjectFormat, ObjectHandle, ACCESS_READ_WRITE, ASSOCIATION_TYPE_GEN_FOLDER, FS_TYPE_GENERIC_HIERARCHICAL,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound for thumbnail sizes advertised to initiators.
pub const THUMB_MAX_SIZE: u32 = 1024 * 48;
/// Default thumbnail dimensions.
pub const THUMB_WIDTH: u32 = 100;
pub const THUMB_HEIGHT: u32 = 100;

/// The MTP ObjectInfo dataset, composed from the filesystem and extension
/// table. Fields the store cannot know (pixel sizes, bit depth, sequence
/// numbers) stay zero unless the metadata store fills them in elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectInfo {
    pub storage_id: u32,
    pub object_format: ObjectFormat,
    pub protection_status: u16,
    pub compressed_size: u64,
    pub thumb_format: ObjectFormat,
    pub thumb_compressed_size: u32,
    pub thumb_pix_width: u32,
    pub thumb_pix_height: u32,
    pub image_pix_width: u32,
    pub image_pix_height: u32,
    pub image_bit_depth: u32,
    pub parent_object: ObjectHandle,
    pub association_type: u16,
    pub association_desc: u32,
    pub sequence_number: u32,
    pub file_name: String,
    /// `YYYYMMDDTHHMMSSZ`, UTC.
    pub capture_date: String,
    pub modification_date: String,
    pub keywords: String,
}

impl ObjectInfo {
    /// Minimal dataset an initiator would supply with SendObjectInfo.
    pub fn for_new_object(file_name: impl Into<String>, format: ObjectFormat) -> Self {
        Self {
            object_format: format,
            file_name: file_name.into(),
            ..Default::default()
        }
    }
}

/// Composes the full dataset for a filesystem entry.
///
/// Thumbnail fields are populated only for image formats and only when the
/// thumbnailer has (or can produce) a cached thumbnail; everything else the
/// filesystem cannot answer stays zero.
pub fn compose_object_info(
    path: &str,
    storage_id: u32,
    parent: ObjectHandle,
    thumbnailer: &dyn Thumbnailer,
) -> ObjectInfo {
    let fs_path = Path::new(path);
    let meta = std::fs::metadata(fs_path).ok();
    let is_dir = meta.as_ref().map(|m| m.is_dir()).unwrap_or(false);
    let format = formats::format_for_path(path, is_dir);
    let file_name = path.rsplit('/').next().unwrap_or(path).to_string();

    let mut info = ObjectInfo {
        storage_id,
        object_format: format,
        protection_status: 0,
        compressed_size: match &meta {
            Some(m) if m.is_file() => m.len(),
            _ => 0,
        },
        parent_object: parent,
        association_type: if is_dir { ASSOCIATION_TYPE_GEN_FOLDER } else { 0 },
        association_desc: 0,
        sequence_number: 0,
        file_name,
        capture_date: formats::created_date(fs_path),
        modification_date: formats::modified_date(fs_path),
        keywords: String::new(),
        ..Default::default()
    };

    if let Some(mime) = formats::mime_for_image(format) {
        info.thumb_format = ObjectFormat::Jfif;
        info.thumb_pix_width = THUMB_WIDTH;
        info.thumb_pix_height = THUMB_HEIGHT;
        info.thumb_compressed_size = thumbnailer
            .request_thumbnail(fs_path, mime)
            .and_then(|thumb| std::fs::metadata(thumb).ok())
            .map(|m| m.len() as u32)
            .unwrap_or(0);
    }

    info
}

// ── Storage info ─────────────────────────────────────────────────────

/// The MTP StorageInfo dataset. Capacity fields come from statvfs; free
/// space is refreshed on every query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub storage_type: u16,
    pub filesystem_type: u16,
    pub access_capability: u16,
    pub max_capacity: u64,
    pub free_space: u64,
    pub free_space_in_objects: u32,
    pub storage_description: String,
    pub volume_label: String,
}

impl StorageInfo {
    pub fn from_config(config: &StorageConfig) -> Self {
        let (max_capacity, free_space) = query_capacity(Path::new(&config.root_path)).unwrap_or((0, 0));
        Self {
            storage_type: config.storage_type.code(),
            filesystem_type: FS_TYPE_GENERIC_HIERARCHICAL,
            access_capability: ACCESS_READ_WRITE,
            max_capacity,
            free_space,
            free_space_in_objects: 0xFFFF_FFFF,
            storage_description: config.description.clone(),
            volume_label: config.volume_label.clone(),
        }
    }

    /// Re-reads capacity and free space from the filesystem.
    pub fn refresh(&mut self, root: &Path) {
        if let Some((max_capacity, free_space)) = query_capacity(root) {
            self.max_capacity = max_capacity;
            self.free_space = free_space;
        }
    }
}

/// Total and available bytes of the filesystem holding `path`.
pub fn query_capacity(path: &Path) -> Option<(u64, u64)> {
    use std::os::unix::ffi::OsStrExt;

    let path_c = std::ffi::CString::new(path.as_os_str().as_bytes()).ok()?;
    unsafe {
        let mut stat: libc::statvfs = std::mem::zeroed();
        if libc::statvfs(path_c.as_ptr(), &mut stat) == 0 {
            #[allow(clippy::unnecessary_cast, reason = "statvfs field types vary across platforms")]
            let total = stat.f_blocks as u64 * stat.f_frsize as u64;
            #[allow(clippy::unnecessary_cast, reason = "statvfs field types vary across platforms")]
            let avail = stat.f_bavail as u64 * stat.f_frsize as u64;
            Some((total, avail))
        } else {
            None
        }
    }
}

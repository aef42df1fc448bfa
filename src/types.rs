//! Core identifier and code types shared across the store.
//!
//! These mirror the MTP 1.1 wire-level codes where one exists; the store
//! itself only ever compares them, it never encodes packets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session-local 32-bit object identifier.
///
/// Unique across the whole device (the handle allocator is device-global),
/// except for the storage root which is always 0.
pub type ObjectHandle = u32;

/// Handle of the storage root. Never advertised in enumerations.
pub const ROOT_HANDLE: ObjectHandle = 0;

/// Wildcard handle: "all objects" in DeleteObject, "pick a parent for me"
/// in SendObjectInfo.
pub const HANDLE_ALL: ObjectHandle = 0xFFFF_FFFF;

// ── Persistent unique object id ──────────────────────────────────────

/// 128-bit persistent unique object identifier.
///
/// Stable across restarts for a given path, never reused. Ordered so that
/// the registry can track the largest value it has ever issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Puoid(u128);

impl Puoid {
    pub const ZERO: Puoid = Puoid(0);

    pub fn from_le_bytes(bytes: [u8; 16]) -> Self {
        Puoid(u128::from_le_bytes(bytes))
    }

    pub fn to_le_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    /// The next PUOID in allocation order.
    pub fn successor(self) -> Puoid {
        Puoid(self.0.wrapping_add(1))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Puoid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

// ── Object formats ───────────────────────────────────────────────────

/// MTP object format codes understood by this store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectFormat {
    #[default]
    Undefined,
    /// A directory.
    Association,
    Text,
    Html,
    Wav,
    Mp3,
    Avi,
    Mpeg,
    ExifJpeg,
    Bmp,
    Gif,
    Jfif,
    Png,
    Tiff,
    Wma,
    Ogg,
    Aac,
    Wmv,
    Mp4Container,
    ThreeGpContainer,
    AbstractAudioAlbum,
    AbstractAudioVideoPlaylist,
    PlsPlaylist,
}

impl ObjectFormat {
    /// The MTP format code for this format.
    pub fn code(self) -> u16 {
        match self {
            ObjectFormat::Undefined => 0x3000,
            ObjectFormat::Association => 0x3001,
            ObjectFormat::Text => 0x3004,
            ObjectFormat::Html => 0x3005,
            ObjectFormat::Wav => 0x3008,
            ObjectFormat::Mp3 => 0x3009,
            ObjectFormat::Avi => 0x300A,
            ObjectFormat::Mpeg => 0x300B,
            ObjectFormat::ExifJpeg => 0x3801,
            ObjectFormat::Bmp => 0x3804,
            ObjectFormat::Gif => 0x3807,
            ObjectFormat::Jfif => 0x3808,
            ObjectFormat::Png => 0x380B,
            ObjectFormat::Tiff => 0x380D,
            ObjectFormat::Wma => 0xB901,
            ObjectFormat::Ogg => 0xB902,
            ObjectFormat::Aac => 0xB903,
            ObjectFormat::Wmv => 0xB981,
            ObjectFormat::Mp4Container => 0xB982,
            ObjectFormat::ThreeGpContainer => 0xB984,
            ObjectFormat::AbstractAudioAlbum => 0xBA03,
            ObjectFormat::AbstractAudioVideoPlaylist => 0xBA05,
            ObjectFormat::PlsPlaylist => 0xBA1D,
        }
    }

    pub fn is_association(self) -> bool {
        self == ObjectFormat::Association
    }

    pub fn is_abstract_playlist(self) -> bool {
        self == ObjectFormat::AbstractAudioVideoPlaylist
    }
}

// ── Storage description codes ────────────────────────────────────────

/// MTP storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    FixedRom,
    RemovableRom,
    FixedRam,
    RemovableRam,
}

impl StorageType {
    pub fn code(self) -> u16 {
        match self {
            StorageType::FixedRom => 0x0001,
            StorageType::RemovableRom => 0x0002,
            StorageType::FixedRam => 0x0003,
            StorageType::RemovableRam => 0x0004,
        }
    }
}

/// Filesystem type reported in StorageInfo: generic hierarchical.
pub const FS_TYPE_GENERIC_HIERARCHICAL: u16 = 0x0002;

/// Access capability: read-write.
pub const ACCESS_READ_WRITE: u16 = 0x0000;

/// Association type for directories. GenFolder is the only type MTP uses;
/// the others exist for PTP compatibility only.
pub const ASSOCIATION_TYPE_GEN_FOLDER: u16 = 0x0001;

// ── Object properties ────────────────────────────────────────────────

/// Object property codes the store can resolve or forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectPropCode {
    StorageId,
    ObjectFormat,
    ProtectionStatus,
    ObjectSize,
    AssociationType,
    AssociationDesc,
    ObjectFileName,
    DateCreated,
    DateModified,
    Keywords,
    ParentObject,
    AllowedFolderContents,
    Hidden,
    NonConsumable,
    PersistentUniqueObjectId,
    DateAdded,
    CorruptUnplayable,
    RepSampleFormat,
    RepSampleSize,
    RepSampleHeight,
    RepSampleWidth,
    RepSampleData,
    VideoFourCcCodec,
    /// Anything else; only the metadata store may know it.
    Other(u16),
}

impl ObjectPropCode {
    pub fn code(self) -> u16 {
        match self {
            ObjectPropCode::StorageId => 0xDC01,
            ObjectPropCode::ObjectFormat => 0xDC02,
            ObjectPropCode::ProtectionStatus => 0xDC03,
            ObjectPropCode::ObjectSize => 0xDC04,
            ObjectPropCode::AssociationType => 0xDC05,
            ObjectPropCode::AssociationDesc => 0xDC06,
            ObjectPropCode::ObjectFileName => 0xDC07,
            ObjectPropCode::DateCreated => 0xDC08,
            ObjectPropCode::DateModified => 0xDC09,
            ObjectPropCode::Keywords => 0xDC0A,
            ObjectPropCode::ParentObject => 0xDC0B,
            ObjectPropCode::AllowedFolderContents => 0xDC0C,
            ObjectPropCode::Hidden => 0xDC54,
            ObjectPropCode::NonConsumable => 0xDC4F,
            ObjectPropCode::PersistentUniqueObjectId => 0xDC41,
            ObjectPropCode::DateAdded => 0xDC4E,
            ObjectPropCode::CorruptUnplayable => 0xDC51,
            ObjectPropCode::RepSampleFormat => 0xDC81,
            ObjectPropCode::RepSampleSize => 0xDC82,
            ObjectPropCode::RepSampleHeight => 0xDC83,
            ObjectPropCode::RepSampleWidth => 0xDC84,
            ObjectPropCode::RepSampleData => 0xDC86,
            ObjectPropCode::VideoFourCcCodec => 0xDE32,
            ObjectPropCode::Other(code) => code,
        }
    }
}

/// A dynamically typed property value, the store's equivalent of the MTP
/// variant payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PropValue {
    /// Not filled in yet, or genuinely absent.
    #[default]
    Empty,
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Str(String),
    Bytes(Vec<u8>),
    U16Array(Vec<u16>),
    Puoid(Puoid),
}

impl PropValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, PropValue::Empty)
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// Events the store produces, delivered in production order to the sink
/// supplied at construction. The responder maps them onto MTP event
/// packets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum StorageEvent {
    ObjectAdded { handle: ObjectHandle },
    ObjectRemoved { handle: ObjectHandle },
    ObjectInfoChanged { handle: ObjectHandle },
    ObjectPropChanged { handle: ObjectHandle, prop: ObjectPropCode },
    StorageInfoChanged { storage_id: u32 },
    StoreFull { storage_id: u32 },
    /// Initial enumeration finished; the tree is now populated.
    Ready { storage_id: u32 },
}

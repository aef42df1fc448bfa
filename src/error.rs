//! Response codes returned by store operations.
//!
//! Every operation resolves to exactly one code; the responder maps them to
//! MTP response packets at the transport boundary. The store itself never
//! panics on I/O problems.

use std::fmt;

/// Error half of every store operation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// Unknown object handle.
    InvalidObjectHandle,
    /// Parent unknown, or a directory already exists at the destination of
    /// a copy or move.
    InvalidParentObject,
    /// Excluded path, permission failure, or an attempt to move the
    /// reserved Playlists directory.
    AccessDenied,
    /// Attempt to delete the storage root.
    ObjectWriteProtected,
    /// Destination free space is smaller than the object.
    StoreFull,
    /// Malformed object info supplied to add_item.
    InvalidDataset,
    /// set_references named a handle that does not exist.
    InvalidObjectReference,
    /// Rename to an invalid or duplicate file name.
    InvalidObjectPropValue,
    /// Property unknown to the store and not served by the metadata store.
    ObjectPropNotSupported,
    /// Some but not all items of a bulk delete succeeded.
    PartialDeletion,
    /// Unclassified I/O failure.
    GeneralError,
}

pub type Result<T> = std::result::Result<T, ResponseCode>;

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResponseCode::InvalidObjectHandle => "invalid object handle",
            ResponseCode::InvalidParentObject => "invalid parent object",
            ResponseCode::AccessDenied => "access denied",
            ResponseCode::ObjectWriteProtected => "object write protected",
            ResponseCode::StoreFull => "store full",
            ResponseCode::InvalidDataset => "invalid dataset",
            ResponseCode::InvalidObjectReference => "invalid object reference",
            ResponseCode::InvalidObjectPropValue => "invalid object property value",
            ResponseCode::ObjectPropNotSupported => "object property not supported",
            ResponseCode::PartialDeletion => "partial deletion",
            ResponseCode::GeneralError => "general error",
        };
        f.write_str(text)
    }
}

impl std::error::Error for ResponseCode {}

impl From<std::io::Error> for ResponseCode {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => ResponseCode::AccessDenied,
            _ => ResponseCode::GeneralError,
        }
    }
}

impl ResponseCode {
    /// The MTP 1.1 response code on the wire.
    pub fn code(&self) -> u16 {
        match self {
            ResponseCode::GeneralError => 0x2002,
            ResponseCode::InvalidObjectHandle => 0x2009,
            ResponseCode::StoreFull => 0x200C,
            ResponseCode::ObjectWriteProtected => 0x200D,
            ResponseCode::AccessDenied => 0x200F,
            ResponseCode::PartialDeletion => 0x2012,
            ResponseCode::InvalidParentObject => 0x201A,
            ResponseCode::InvalidDataset => 0x2023,
            ResponseCode::ObjectPropNotSupported => 0xA80A,
            ResponseCode::InvalidObjectPropValue => 0xA808,
            ResponseCode::InvalidObjectReference => 0xA009,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_permission_maps_to_access_denied() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(ResponseCode::from(err), ResponseCode::AccessDenied);
    }

    #[test]
    fn io_other_maps_to_general_error() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(ResponseCode::from(err), ResponseCode::GeneralError);
    }
}

//! File-extension to object-format mapping and MTP date strings.

use crate::types::ObjectFormat;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::SystemTime;

/// Resolves the object format for a path. Directories are always
/// associations regardless of extension; unknown extensions are Undefined.
pub fn format_for_path(path: &str, is_dir: bool) -> ObjectFormat {
    if is_dir {
        return ObjectFormat::Association;
    }
    match extension_of(path) {
        Some(ext) => format_for_extension(&ext),
        None => ObjectFormat::Undefined,
    }
}

/// The lowercased substring after the last `.` of the final path segment.
fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        // Dotfiles like ".hidden" have no extension.
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn format_for_extension(ext: &str) -> ObjectFormat {
    match ext {
        "pla" => ObjectFormat::AbstractAudioVideoPlaylist,
        "wav" => ObjectFormat::Wav,
        "mp3" => ObjectFormat::Mp3,
        "ogg" => ObjectFormat::Ogg,
        "txt" => ObjectFormat::Text,
        "htm" | "html" => ObjectFormat::Html,
        "wmv" => ObjectFormat::Wmv,
        "avi" => ObjectFormat::Avi,
        "mpg" | "mpeg" => ObjectFormat::Mpeg,
        "bmp" => ObjectFormat::Bmp,
        "gif" => ObjectFormat::Gif,
        "jpg" | "jpeg" => ObjectFormat::ExifJpeg,
        "png" => ObjectFormat::Png,
        "tif" | "tiff" => ObjectFormat::Tiff,
        "wma" => ObjectFormat::Wma,
        "aac" => ObjectFormat::Aac,
        "mp4" => ObjectFormat::Mp4Container,
        "3gp" => ObjectFormat::ThreeGpContainer,
        "pls" => ObjectFormat::PlsPlaylist,
        "alb" => ObjectFormat::AbstractAudioAlbum,
        _ => ObjectFormat::Undefined,
    }
}

/// Whether the format is an image we can offer thumbnails for.
pub fn is_image_format(format: ObjectFormat) -> bool {
    mime_for_image(format).is_some()
}

/// MIME type handed to the thumbnailer for image formats.
pub fn mime_for_image(format: ObjectFormat) -> Option<&'static str> {
    match format {
        ObjectFormat::Bmp => Some("image/bmp"),
        ObjectFormat::Gif => Some("image/gif"),
        ObjectFormat::ExifJpeg => Some("image/jpeg"),
        ObjectFormat::Png => Some("image/png"),
        ObjectFormat::Tiff => Some("image/tiff"),
        _ => None,
    }
}

/// Formats a filesystem timestamp as an MTP date string: UTC,
/// `YYYYMMDDTHHMMSSZ`.
pub fn mtp_datetime(time: SystemTime) -> String {
    let dt: DateTime<Utc> = time.into();
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Creation date of a path as an MTP date string, falling back to the
/// modification date on filesystems that do not record creation times.
pub fn created_date(path: &Path) -> String {
    match std::fs::metadata(path) {
        Ok(meta) => {
            let time = meta.created().or_else(|_| meta.modified()).unwrap_or(SystemTime::UNIX_EPOCH);
            mtp_datetime(time)
        }
        Err(_) => String::new(),
    }
}

/// Modification date of a path as an MTP date string.
pub fn modified_date(path: &Path) -> String {
    match std::fs::metadata(path) {
        Ok(meta) => mtp_datetime(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_are_associations() {
        assert_eq!(format_for_path("/store/Music.mp3", true), ObjectFormat::Association);
    }

    #[test]
    fn known_extensions_map() {
        assert_eq!(format_for_path("/store/song.MP3", false), ObjectFormat::Mp3);
        assert_eq!(format_for_path("/store/page.html", false), ObjectFormat::Html);
        assert_eq!(format_for_path("/store/clip.mpeg", false), ObjectFormat::Mpeg);
        assert_eq!(format_for_path("/store/photo.JPEG", false), ObjectFormat::ExifJpeg);
        assert_eq!(
            format_for_path("/store/list.pla", false),
            ObjectFormat::AbstractAudioVideoPlaylist
        );
    }

    #[test]
    fn unknown_extension_is_undefined() {
        assert_eq!(format_for_path("/store/blob.xyz", false), ObjectFormat::Undefined);
        assert_eq!(format_for_path("/store/noext", false), ObjectFormat::Undefined);
        assert_eq!(format_for_path("/store/.hidden", false), ObjectFormat::Undefined);
    }

    #[test]
    fn image_mime_table() {
        assert_eq!(mime_for_image(ObjectFormat::Png), Some("image/png"));
        assert_eq!(mime_for_image(ObjectFormat::Mp3), None);
        assert!(is_image_format(ObjectFormat::Gif));
        assert!(!is_image_format(ObjectFormat::Association));
    }

    #[test]
    fn datetime_format_shape() {
        let s = mtp_datetime(SystemTime::UNIX_EPOCH);
        assert_eq!(s, "19700101T000000Z");
    }
}

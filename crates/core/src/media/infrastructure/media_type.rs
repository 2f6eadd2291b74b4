use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::shared::constants::IMAGE_EXTENSIONS;

/// Broad media class of a file on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "mkv", "webm", "avi", "wmv", "flv", "mpg", "mpeg"];

pub fn has_image_extension(path: &Path) -> bool {
    extension_in(path, IMAGE_EXTENSIONS)
}

pub fn is_image(path: &Path) -> bool {
    media_kind(path) == MediaKind::Image
}

pub fn is_video(path: &Path) -> bool {
    media_kind(path) == MediaKind::Video
}

/// Classifies a file by its magic bytes, falling back to the extension when
/// the header is not recognised. Missing files are `Other`.
pub fn media_kind(path: &Path) -> MediaKind {
    if !path.is_file() {
        return MediaKind::Other;
    }
    if let Some(kind) = sniff(path) {
        return kind;
    }
    if has_image_extension(path) {
        MediaKind::Image
    } else if extension_in(path, VIDEO_EXTENSIONS) {
        MediaKind::Video
    } else {
        MediaKind::Other
    }
}

fn sniff(path: &Path) -> Option<MediaKind> {
    let mut file = File::open(path).ok()?;
    let mut buffer = [0u8; 8192];
    let bytes_read = file.read(&mut buffer).ok()?;
    let file_type = infer::get(&buffer[..bytes_read])?;
    let mime = file_type.mime_type();
    match mime {
        _ if mime.starts_with("image/") => Some(MediaKind::Image),
        _ if mime.starts_with("video/") => Some(MediaKind::Video),
        _ => Some(MediaKind::Other),
    }
}

fn extension_in(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

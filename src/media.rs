use std::path::Path;

use image::ImageFormat;

/// Sniffs the MIME type of an image from its leading bytes.
pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Bytes win over the file extension; PNG is the last resort.
pub fn resolve_mime_type(path: &Path, bytes: &[u8]) -> &'static str {
    detect_mime_type(bytes)
        .or_else(|| mime_for_path(path))
        .unwrap_or("image/png")
}

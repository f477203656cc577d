use infer;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Image types accepted for artwork images and avatars.
pub const ACCEPTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Sniffs the MIME type from the leading bytes. The declared type is only
/// used when the content is not recognised.
pub fn detect_mimetype(bytes: &[u8], declared: Option<&str>) -> String {
    match infer::get(bytes) {
        Some(kind) => kind.mime_type().to_string(),
        None => declared
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| OCTET_STREAM.to_string()),
    }
}

pub fn is_accepted_image(mime: &str) -> bool {
    ACCEPTED_IMAGE_TYPES.contains(&mime)
}

pub fn extension_for(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

//! MIME type detection based on file extensions.

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const MIME_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("txt", "text/plain"),
    ("xml", "application/xml"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("webp", "image/webp"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("mp3", "audio/mpeg"),
    ("mp4", "video/mp4"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
];

/// Extensions that name plain static resources. A POST to an existing file
/// with one of these extensions has no handler.
const STATIC_EXTENSIONS: &[&str] = &[
    "html", "htm", "css", "js", "jpg", "jpeg", "png", "gif", "txt", "pdf", "ico",
];

/// Looks up the built-in MIME type for an extension (without the dot).
pub fn lookup(extension: &str) -> Option<&'static str> {
    let extension = extension.trim_start_matches('.');
    MIME_TYPES
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
}

pub fn is_static_extension(extension: &str) -> bool {
    STATIC_EXTENSIONS.contains(&extension)
}

//! Image MIME lookup for photo file extensions.

use thiserror::Error;

/// Extension has no known image MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no MIME type for extension '{0}'")]
pub struct NotFound(pub String);

/// Map a file extension (without the dot) to its MIME type.
pub fn resolve(extension: &str) -> Result<&'static str, NotFound> {
    match extension.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        _ => Err(NotFound(extension.to_string())),
    }
}

/// Extension of the last path segment, if it has one.
pub fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Resolve the MIME type of a remote file path by its extension.
pub fn resolve_path(path: &str) -> Result<&'static str, NotFound> {
    extension(path)
        .ok_or_else(|| NotFound(String::new()))
        .and_then(resolve)
}

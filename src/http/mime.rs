//! MIME type detection based on file extensions.

use std::path::Path;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type used for the canned error pages.
pub const HTML: &str = "text/html";

/// Guesses the `Content-Type` of a file from its extension.
///
/// # Example
///
/// ```
/// # use lantern::http::mime::content_type;
/// # use std::path::Path;
/// assert_eq!(content_type(Path::new("index.HTML")), "text/html");
/// assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
/// ```
pub fn content_type(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return DEFAULT_CONTENT_TYPE;
    };

    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => HTML,
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        _ => DEFAULT_CONTENT_TYPE,
    }
}
